//! XRPL gateway configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, XrplError};

/// Configuration for the XRPL gateway.
#[derive(Clone, Serialize, Deserialize)]
pub struct XrplConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Classic address of the anchoring account.
    pub account: String,

    /// Signing secret (family seed) for `account`.
    pub secret: String,

    /// Payment destination. Without one, anchors ride on `AccountSet`.
    #[serde(default)]
    pub destination: Option<String>,

    /// Per-request HTTP timeout.
    #[serde(
        default = "default_request_timeout",
        with = "duration_ms",
        rename = "request_timeout_ms"
    )]
    pub request_timeout: Duration,

    /// Interval between status polls while awaiting validation.
    #[serde(
        default = "default_poll_interval",
        with = "duration_ms",
        rename = "poll_interval_ms"
    )]
    pub poll_interval: Duration,

    /// Fixed fee in drops. When unset, the open-ledger fee is used.
    #[serde(default)]
    pub fee_drops: Option<u64>,

    /// Provider ID, used in logs.
    #[serde(default = "default_provider_id")]
    pub provider_id: String,
}

fn default_request_timeout() -> Duration {
    super::DEFAULT_REQUEST_TIMEOUT
}

fn default_poll_interval() -> Duration {
    super::DEFAULT_POLL_INTERVAL
}

fn default_provider_id() -> String {
    super::DEFAULT_PROVIDER_ID.to_string()
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

impl std::fmt::Debug for XrplConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XrplConfig")
            .field("rpc_url", &self.rpc_url)
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .field("destination", &self.destination)
            .field("request_timeout", &self.request_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("fee_drops", &self.fee_drops)
            .field("provider_id", &self.provider_id)
            .finish()
    }
}

impl XrplConfig {
    /// Create a new configuration.
    pub fn new(
        rpc_url: impl Into<String>,
        account: impl Into<String>,
        secret: impl Into<String>,
    ) -> Self {
        Self {
            rpc_url: rpc_url.into(),
            account: account.into(),
            secret: secret.into(),
            destination: None,
            request_timeout: default_request_timeout(),
            poll_interval: default_poll_interval(),
            fee_drops: None,
            provider_id: default_provider_id(),
        }
    }

    /// Create configuration for the public testnet.
    pub fn testnet(account: impl Into<String>, secret: impl Into<String>) -> Self {
        Self::new(super::TESTNET_RPC_URL, account, secret).with_id("xrpl-testnet")
    }

    /// Send a 1-drop payment to `destination` instead of an `AccountSet`.
    pub fn with_destination(mut self, destination: impl Into<String>) -> Self {
        self.destination = Some(destination.into());
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set a fixed fee in drops.
    pub fn with_fee_drops(mut self, drops: u64) -> Self {
        self.fee_drops = Some(drops);
        self
    }

    /// Set provider ID.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = id.into();
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.rpc_url)
            .map_err(|e| XrplError::Config(format!("invalid RPC URL: {}", e)))?;

        if !is_classic_address(&self.account) {
            return Err(XrplError::Config(format!(
                "invalid account address: {:?}",
                self.account
            )));
        }

        if self.secret.is_empty() {
            return Err(XrplError::Config("signing secret is required".into()));
        }

        if let Some(dest) = &self.destination {
            if !is_classic_address(dest) {
                return Err(XrplError::Config(format!(
                    "invalid destination address: {:?}",
                    dest
                )));
            }
            if dest == &self.account {
                return Err(XrplError::Config(
                    "destination must differ from the anchoring account".into(),
                ));
            }
        }

        if self.request_timeout.is_zero() || self.poll_interval.is_zero() {
            return Err(XrplError::Config(
                "request timeout and poll interval must be positive".into(),
            ));
        }

        if self.fee_drops == Some(0) {
            return Err(XrplError::Config("fee must be at least 1 drop".into()));
        }

        Ok(())
    }
}

/// Shape check for a classic address: `r` followed by base58 characters.
fn is_classic_address(s: &str) -> bool {
    const ALPHABET: &str = "rpshnaf39wBUDNEGHJKLM4PQRST7VWXYZ2bcdeCg65jkm8oFqi1tuvAxyz";
    (25..=35).contains(&s.len()) && s.starts_with('r') && s.chars().all(|c| ALPHABET.contains(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACCOUNT: &str = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe";
    const DEST: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";

    #[test]
    fn test_config_builder() {
        let config = XrplConfig::testnet(ACCOUNT, "sEdSECRET")
            .with_destination(DEST)
            .with_fee_drops(12)
            .with_poll_interval(Duration::from_millis(250));

        assert_eq!(config.provider_id, "xrpl-testnet");
        assert_eq!(config.destination.as_deref(), Some(DEST));
        assert_eq!(config.fee_drops, Some(12));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_fields() {
        let base = XrplConfig::new("http://localhost:5005", ACCOUNT, "s");
        assert!(base.validate().is_ok());

        assert!(XrplConfig::new("nope", ACCOUNT, "s").validate().is_err());
        assert!(XrplConfig::new("http://x", "0xdeadbeef", "s").validate().is_err());
        assert!(XrplConfig::new("http://x", ACCOUNT, "").validate().is_err());
        assert!(base.clone().with_destination(ACCOUNT).validate().is_err());
        assert!(base.clone().with_fee_drops(0).validate().is_err());
        assert!(base
            .with_request_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }

    #[test]
    fn test_debug_redacts_secret() {
        let config = XrplConfig::new("http://x", ACCOUNT, "sEdTopSecret");
        assert!(!format!("{:?}", config).contains("sEdTopSecret"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let config: XrplConfig = serde_json::from_value(serde_json::json!({
            "rpc_url": "http://localhost:5005",
            "account": ACCOUNT,
            "secret": "s",
            "request_timeout_ms": 5000
        }))
        .unwrap();
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.poll_interval, crate::DEFAULT_POLL_INTERVAL);
        assert_eq!(config.provider_id, crate::DEFAULT_PROVIDER_ID);
        assert!(config.destination.is_none());
    }
}
