//! Pending anchors: recovery hints for submissions with no confirmed outcome.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::digest_value;
use crate::digest::Digest;
use crate::event::{EventType, TxRef};

/// Snapshot of an anchor attempt that has not reached a confirmed state.
///
/// Holds everything needed to retry the attempt later with the same payload,
/// plus the last submitted transaction so a retry can poll before it
/// resubmits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAnchor {
    /// Subject being anchored.
    pub subject_id: String,
    /// Event type of the attempt.
    pub event_type: EventType,
    /// The payload snapshot to anchor.
    pub payload: Value,
    /// Where the underlying metadata was published, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    /// Digest of `payload`.
    pub payload_hash: Digest,
    /// Last transaction submitted for this attempt.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_ref: Option<TxRef>,
    /// Ledger height after which `tx_ref` can no longer validate.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_until: Option<u64>,
    /// Submission attempts made so far.
    #[serde(default)]
    pub attempts: u32,
    /// When the hint was recorded.
    pub created_at: DateTime<Utc>,
}

impl PendingAnchor {
    /// Create a hint for `payload` with no submission recorded yet.
    pub fn new(subject_id: impl Into<String>, event_type: EventType, payload: Value) -> Self {
        Self {
            subject_id: subject_id.into(),
            event_type,
            payload_hash: digest_value(&payload),
            payload,
            source_url: None,
            tx_ref: None,
            valid_until: None,
            attempts: 0,
            created_at: Utc::now(),
        }
    }

    /// Set the source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Record the last submitted transaction and its validity bound.
    pub fn with_submission(mut self, tx_ref: TxRef, valid_until: u64) -> Self {
        self.tx_ref = Some(tx_ref);
        self.valid_until = Some(valid_until);
        self
    }

    /// Set the attempt count.
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Check whether a confirmed anchor of `(subject_id, event_type,
    /// payload_hash)` resolves this hint.
    ///
    /// The transaction reference is not compared since it changes on every
    /// retry.
    pub fn matches(&self, subject_id: &str, event_type: &EventType, payload_hash: &Digest) -> bool {
        self.subject_id == subject_id
            && &self.event_type == event_type
            && &self.payload_hash == payload_hash
    }

    /// Check whether the recorded transaction may still validate at `height`.
    pub fn is_within_window(&self, height: u64) -> bool {
        matches!(self.valid_until, Some(bound) if height <= bound)
    }
}
