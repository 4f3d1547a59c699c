//! Anchoring configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{AnchorError, Result};

/// Default wall-clock wait for a submission to validate.
pub const DEFAULT_SUBMIT_TIMEOUT: Duration = Duration::from_secs(45);

/// Default ledger-height offset for the validity bound.
pub const DEFAULT_VALIDITY_WINDOW: u64 = 300;

/// Default number of submission attempts per operation.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 2;

/// Default number of history events consulted for verification.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

/// Configuration for the [`Anchorer`](crate::Anchorer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorConfig {
    /// How long to wait for a submission before polling once and giving up.
    #[serde(with = "duration_ms", rename = "submit_timeout_ms")]
    pub submit_timeout: Duration,
    /// Ledger heights a transaction stays valid for after preparation.
    pub validity_window: u64,
    /// Submission attempts per operation (transient errors consume one each).
    pub max_attempts: u32,
    /// Events read from the log when verifying.
    pub history_limit: usize,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            submit_timeout: DEFAULT_SUBMIT_TIMEOUT,
            validity_window: DEFAULT_VALIDITY_WINDOW,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            history_limit: DEFAULT_HISTORY_LIMIT,
        }
    }
}

impl AnchorConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the submission timeout.
    pub fn with_submit_timeout(mut self, timeout: Duration) -> Self {
        self.submit_timeout = timeout;
        self
    }

    /// Set the validity window.
    pub fn with_validity_window(mut self, window: u64) -> Self {
        self.validity_window = window;
        self
    }

    /// Set the attempt limit.
    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Set the history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.submit_timeout.is_zero() {
            return Err(AnchorError::InvalidConfig(
                "submit_timeout must be positive".into(),
            ));
        }
        if self.validity_window == 0 {
            return Err(AnchorError::InvalidConfig(
                "validity_window must be positive".into(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(AnchorError::InvalidConfig(
                "max_attempts must be at least 1".into(),
            ));
        }
        if self.history_limit == 0 {
            return Err(AnchorError::InvalidConfig(
                "history_limit must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AnchorConfig::default();
        assert_eq!(cfg.submit_timeout, Duration::from_millis(45_000));
        assert_eq!(cfg.validity_window, 300);
        assert_eq!(cfg.max_attempts, 2);
        assert_eq!(cfg.history_limit, 50);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_validate() {
        assert!(AnchorConfig::new().with_max_attempts(0).validate().is_err());
        assert!(AnchorConfig::new().with_validity_window(0).validate().is_err());
        assert!(AnchorConfig::new()
            .with_submit_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(AnchorConfig::new().with_history_limit(0).validate().is_err());
    }

    #[test]
    fn test_serde_millis_and_partial() {
        let cfg: AnchorConfig =
            serde_json::from_str(r#"{"submit_timeout_ms": 1500, "max_attempts": 3}"#).unwrap();
        assert_eq!(cfg.submit_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.max_attempts, 3);
        assert_eq!(cfg.validity_window, DEFAULT_VALIDITY_WINDOW);

        let json = serde_json::to_value(AnchorConfig::default()).unwrap();
        assert_eq!(json["submit_timeout_ms"], 45_000);
    }
}
