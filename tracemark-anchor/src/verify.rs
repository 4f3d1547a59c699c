//! Verification of current metadata against anchor history.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use tracemark_core::{digest_value, AnchorEvent, Digest, TxRef};

/// Result of comparing current metadata with its latest anchor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Verification {
    /// The latest anchored digest equals the current digest.
    Matched {
        /// Digest of the current metadata.
        current_hash: Digest,
        /// Transaction that carried the anchor.
        tx_ref: Option<TxRef>,
        /// When the anchor was recorded.
        anchored_at: DateTime<Utc>,
    },
    /// The metadata changed since it was last anchored.
    Mismatched {
        /// Digest of the current metadata.
        current_hash: Digest,
        /// Digest recorded by the latest anchor.
        anchored_hash: String,
        /// Transaction that carried the anchor.
        tx_ref: Option<TxRef>,
        /// When the anchor was recorded.
        anchored_at: DateTime<Utc>,
    },
    /// No anchor with a metadata digest exists.
    Unknown {
        /// Digest of the current metadata.
        current_hash: Digest,
    },
}

impl Verification {
    /// Check for a match.
    pub fn is_matched(&self) -> bool {
        matches!(self, Verification::Matched { .. })
    }

    /// Check for a mismatch.
    pub fn is_mismatched(&self) -> bool {
        matches!(self, Verification::Mismatched { .. })
    }

    /// Check for an unknown result.
    pub fn is_unknown(&self) -> bool {
        matches!(self, Verification::Unknown { .. })
    }

    /// Digest of the metadata that was verified.
    pub fn current_hash(&self) -> &Digest {
        match self {
            Verification::Matched { current_hash, .. }
            | Verification::Mismatched { current_hash, .. }
            | Verification::Unknown { current_hash } => current_hash,
        }
    }
}

/// Compare `current` against the newest event in `history` that carries a
/// metadata digest.
///
/// `history` must be ordered newest first. Events for other subjects are
/// skipped. Older digest-bearing events are never consulted once a newer one
/// is found.
pub fn verify(subject_id: &str, current: &Value, history: &[AnchorEvent]) -> Verification {
    let current_hash = digest_value(current);

    let latest = history
        .iter()
        .filter(|e| e.subject_id == subject_id)
        .find_map(|e| e.metadata_hash().map(|h| (e, h)));

    match latest {
        None => Verification::Unknown { current_hash },
        Some((event, anchored)) if anchored.eq_ignore_ascii_case(&current_hash.to_hex()) => {
            Verification::Matched {
                current_hash,
                tx_ref: event.ledger_tx_ref.clone(),
                anchored_at: event.created_at,
            }
        }
        Some((event, anchored)) => Verification::Mismatched {
            current_hash,
            anchored_hash: anchored.to_string(),
            tx_ref: event.ledger_tx_ref.clone(),
            anchored_at: event.created_at,
        },
    }
}
