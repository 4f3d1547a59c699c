//! Ledger gateway trait and types.
//!
//! This module defines the narrow contract the anchoring state machine needs
//! from an external ledger. Transport and protocol details live in the
//! gateway implementation.

use std::fmt;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use tracemark_core::{canonicalize_value, Digest, EventType, TxRef};

/// Memo type carried by anchor transactions.
pub const MEMO_TYPE: &str = "trace_event";

/// Memo format carried by anchor transactions.
pub const MEMO_FORMAT: &str = "application/json";

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;

/// Failure kinds a gateway reports to the state machine.
///
/// The state machine branches on the variant only; the message is for
/// humans.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum GatewayError {
    /// Fee, sequence or expiry race. Retry with a freshly bound draft.
    #[error("transient ledger error: {0}")]
    Transient(String),

    /// The ledger refused the transaction. Fatal for this attempt.
    #[error("rejected by ledger: {0}")]
    Rejected(String),

    /// No answer in time. The outcome is unknown.
    #[error("ledger timeout: {0}")]
    Timeout(String),
}

impl GatewayError {
    /// Human-readable reason.
    pub fn reason(&self) -> &str {
        match self {
            GatewayError::Transient(r) | GatewayError::Rejected(r) | GatewayError::Timeout(r) => r,
        }
    }

    /// Check if a fresh attempt may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, GatewayError::Transient(_))
    }

    /// Check if the outcome of the operation is unknown.
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, GatewayError::Timeout(_))
    }
}

/// Application data to embed in a ledger transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDraft {
    /// Subject being anchored.
    pub subject_id: String,
    /// Event type being anchored.
    pub event_type: EventType,
    /// Digest of the anchored payload.
    pub payload_hash: Digest,
}

impl LedgerDraft {
    /// Create a draft.
    pub fn new(subject_id: impl Into<String>, event_type: EventType, payload_hash: Digest) -> Self {
        Self {
            subject_id: subject_id.into(),
            event_type,
            payload_hash,
        }
    }

    /// Canonical JSON memo body: `{"event_type","item_id","payload_hash"}`.
    pub fn memo_data(&self) -> String {
        canonicalize_value(&json!({
            "item_id": self.subject_id,
            "event_type": self.event_type.as_str(),
            "payload_hash": self.payload_hash.to_hex(),
        }))
    }
}

/// A draft with protocol fields filled in, ready to sign.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreparedTx {
    /// The application data.
    pub draft: LedgerDraft,
    /// Last ledger height at which the transaction may be included.
    pub valid_until: u64,
    /// Gateway-specific transaction body.
    pub body: Value,
}

/// Status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxStatus {
    /// Whether the transaction is in a validated ledger.
    pub validated: bool,
    /// Ledger result code, if the ledger reported one.
    pub result: Option<String>,
}

impl TxStatus {
    /// A validated status.
    pub fn validated() -> Self {
        Self {
            validated: true,
            result: None,
        }
    }

    /// A not-yet-validated status.
    pub fn not_validated() -> Self {
        Self {
            validated: false,
            result: None,
        }
    }

    /// Attach a ledger result code.
    pub fn with_result(mut self, result: impl Into<String>) -> Self {
        self.result = Some(result.into());
        self
    }
}

/// A transaction handed to the ledger.
///
/// `outcome` resolves once the transaction validates and fails when the
/// ledger rejects it. Dropping it stops waiting but does not withdraw the
/// transaction.
pub struct Submission {
    /// Reference for later polling.
    pub tx_ref: TxRef,
    /// Completion of the transaction.
    pub outcome: BoxFuture<'static, GatewayResult<()>>,
}

impl fmt::Debug for Submission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submission")
            .field("tx_ref", &self.tx_ref)
            .finish_non_exhaustive()
    }
}

/// An external ledger that can carry anchor transactions.
///
/// Implement this trait to add support for a new ledger.
#[async_trait]
pub trait LedgerGateway: Send + Sync {
    /// Gateway identifier, used in logs.
    fn id(&self) -> &str;

    /// Current (open) ledger height.
    async fn ledger_height(&self) -> GatewayResult<u64>;

    /// Fill protocol fields and bind the transaction to `valid_until`.
    async fn prepare(&self, draft: &LedgerDraft, valid_until: u64) -> GatewayResult<PreparedTx>;

    /// Sign and submit a prepared transaction.
    async fn sign_and_submit(&self, prepared: PreparedTx) -> GatewayResult<Submission>;

    /// Look up a transaction. Idempotent and safe after a timeout.
    async fn poll_status(&self, tx_ref: &TxRef) -> GatewayResult<TxStatus>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracemark_core::digest_value;

    #[test]
    fn test_memo_data_is_canonical() {
        let hash = digest_value(&json!({"a": 1}));
        let draft = LedgerDraft::new("xwing1", EventType::MetadataUpdated, hash);
        assert_eq!(
            draft.memo_data(),
            format!(
                r#"{{"event_type":"METADATA_UPDATED","item_id":"xwing1","payload_hash":"{}"}}"#,
                hash.to_hex()
            )
        );
    }

    #[test]
    fn test_gateway_error_kinds() {
        assert!(GatewayError::Transient("tefPAST_SEQ".into()).is_transient());
        assert!(!GatewayError::Rejected("temMALFORMED".into()).is_transient());
        assert!(GatewayError::Timeout("rpc".into()).is_ambiguous());
        assert_eq!(GatewayError::Rejected("x".into()).reason(), "x");
    }

    #[test]
    fn test_gateway_error_serde() {
        let json = serde_json::to_value(GatewayError::Transient("telINSUF_FEE_P".into())).unwrap();
        assert_eq!(json, json!({"kind": "transient", "message": "telINSUF_FEE_P"}));
    }
}
