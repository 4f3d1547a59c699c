//! Error types for XRPL anchoring.

use thiserror::Error;

use tracemark_anchor::GatewayError;

/// Result type for XRPL operations.
pub type Result<T> = std::result::Result<T, XrplError>;

/// Errors that can occur talking to an XRPL node.
#[derive(Debug, Error)]
pub enum XrplError {
    /// The request did not complete within the timeout.
    #[error("RPC request timed out: {0}")]
    RpcTimeout(String),

    /// The node could not be reached.
    #[error("RPC connection failed: {0}")]
    RpcConnection(String),

    /// The node answered with a non-success HTTP status.
    #[error("RPC HTTP status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The node answered with an RPC-level error.
    #[error("RPC error {error}: {message}")]
    Rpc {
        /// Error token, e.g. `actNotFound`.
        error: String,
        /// Human-readable message.
        message: String,
    },

    /// The transaction engine did not accept the transaction.
    #[error("engine result {code}: {message}")]
    Engine {
        /// Engine result code, e.g. `tefPAST_SEQ`.
        code: String,
        /// Human-readable message.
        message: String,
    },

    /// The response did not have the expected shape.
    #[error("invalid RPC response: {0}")]
    InvalidResponse(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// How an engine result code affects the anchor attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineClass {
    /// `tes*`: applied.
    Success,
    /// `ter*`: held by the node and may still be applied.
    Queued,
    /// `tef*`, `tel*`: not applied; may succeed with a fresh transaction.
    Retry,
    /// `tem*`, `tec*` and anything unrecognised.
    Fatal,
}

/// Classify an engine result code by its prefix.
pub fn classify_engine_result(code: &str) -> EngineClass {
    match code.get(..3) {
        Some("tes") => EngineClass::Success,
        Some("ter") => EngineClass::Queued,
        Some("tef") | Some("tel") => EngineClass::Retry,
        _ => EngineClass::Fatal,
    }
}

/// RPC error tokens that indicate a busy or unsynced node.
const TRANSIENT_RPC_ERRORS: &[&str] = &[
    "tooBusy",
    "noNetwork",
    "noCurrent",
    "noClosed",
    "slowDown",
    "amendmentBlocked",
];

impl XrplError {
    pub(crate) fn from_http(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            XrplError::RpcTimeout(e.to_string())
        } else {
            XrplError::RpcConnection(e.to_string())
        }
    }

    /// Check if the transport failed in a way that leaves the outcome of a
    /// submitted request unknown.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            XrplError::RpcTimeout(_) | XrplError::RpcConnection(_)
        ) || matches!(self, XrplError::HttpStatus { status, .. } if *status >= 500)
    }
}

impl From<XrplError> for GatewayError {
    fn from(e: XrplError) -> Self {
        let reason = e.to_string();
        match e {
            XrplError::RpcTimeout(_) => GatewayError::Timeout(reason),
            XrplError::RpcConnection(_) => GatewayError::Transient(reason),
            XrplError::HttpStatus { status, .. } if status >= 500 || status == 429 => {
                GatewayError::Transient(reason)
            }
            XrplError::Rpc { ref error, .. } if TRANSIENT_RPC_ERRORS.contains(&error.as_str()) => {
                GatewayError::Transient(reason)
            }
            XrplError::Engine { ref code, .. } => match classify_engine_result(code) {
                EngineClass::Queued | EngineClass::Retry => GatewayError::Transient(code.clone()),
                EngineClass::Success | EngineClass::Fatal => GatewayError::Rejected(code.clone()),
            },
            XrplError::HttpStatus { .. }
            | XrplError::Rpc { .. }
            | XrplError::InvalidResponse(_)
            | XrplError::Config(_) => GatewayError::Rejected(reason),
        }
    }
}
