//! Anchor events: the append-only history of what was committed to the ledger.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::canonical::digest_value;
use crate::digest::Digest;
use crate::error::{Error, Result};

/// Payload field holding the anchored metadata digest.
pub const METADATA_HASH_FIELD: &str = "metadata_hash";

/// Payload field holding the URL the metadata was published at.
pub const METADATA_URL_FIELD: &str = "metadata_url";

/// Kind of anchor event.
///
/// The set is open: anything other than the two metadata lifecycle events is
/// carried verbatim as [`EventType::Custom`]. Serializes as its string form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// First anchor of a subject's metadata.
    MetadataCreated,
    /// Anchor of a later metadata version.
    MetadataUpdated,
    /// Free-form trace event.
    Custom(String),
}

impl EventType {
    /// Wire form of the event type.
    pub fn as_str(&self) -> &str {
        match self {
            EventType::MetadataCreated => "METADATA_CREATED",
            EventType::MetadataUpdated => "METADATA_UPDATED",
            EventType::Custom(s) => s,
        }
    }

    /// Check if this is one of the metadata lifecycle events.
    pub fn is_metadata(&self) -> bool {
        matches!(self, EventType::MetadataCreated | EventType::MetadataUpdated)
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        match s {
            "METADATA_CREATED" => EventType::MetadataCreated,
            "METADATA_UPDATED" => EventType::MetadataUpdated,
            other => EventType::Custom(other.to_string()),
        }
    }
}

impl From<String> for EventType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "METADATA_CREATED" => EventType::MetadataCreated,
            "METADATA_UPDATED" => EventType::MetadataUpdated,
            _ => EventType::Custom(s),
        }
    }
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(EventType::from(s))
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Ok(EventType::from(String::deserialize(d)?))
    }
}

/// Reference to a ledger transaction (its hash, as the ledger reports it).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TxRef(String);

impl TxRef {
    /// Wrap a transaction reference.
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the reference as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TxRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TxRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TxRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// An immutable record of one completed anchor.
///
/// Only ever appended to the event log; never mutated or deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorEvent {
    /// Subject the event belongs to.
    pub subject_id: String,
    /// What was anchored.
    pub event_type: EventType,
    /// Digest of `payload` as committed to the ledger.
    pub payload_hash: Digest,
    /// The anchored payload.
    pub payload: Value,
    /// Ledger transaction carrying the digest, once known.
    pub ledger_tx_ref: Option<TxRef>,
    /// When the event was recorded.
    pub created_at: DateTime<Utc>,
}

impl AnchorEvent {
    /// Create an event for `payload`, hashing it and stamping the current time.
    pub fn new(
        subject_id: impl Into<String>,
        event_type: EventType,
        payload: Value,
        ledger_tx_ref: Option<TxRef>,
    ) -> Self {
        Self {
            subject_id: subject_id.into(),
            event_type,
            payload_hash: digest_value(&payload),
            payload,
            ledger_tx_ref,
            created_at: Utc::now(),
        }
    }

    /// Override the creation time.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    /// The metadata digest carried in the payload, if any.
    ///
    /// This is the raw string as recorded; callers compare it against a
    /// freshly computed digest.
    pub fn metadata_hash(&self) -> Option<&str> {
        self.payload.get(METADATA_HASH_FIELD).and_then(Value::as_str)
    }

    /// The metadata URL carried in the payload, if any.
    pub fn metadata_url(&self) -> Option<&str> {
        self.payload.get(METADATA_URL_FIELD).and_then(Value::as_str)
    }

    /// Validate structural constraints.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.is_empty() {
            return Err(Error::invalid_event("subject id is empty"));
        }
        if self.event_type.as_str().is_empty() {
            return Err(Error::invalid_event("event type is empty"));
        }
        if digest_value(&self.payload) != self.payload_hash {
            return Err(Error::invalid_event("payload hash does not match payload"));
        }
        Ok(())
    }
}

/// Build the payload of a metadata anchor.
pub fn metadata_payload(metadata_hash: &Digest, metadata_url: Option<&str>) -> Value {
    let mut map = serde_json::Map::new();
    map.insert(
        METADATA_HASH_FIELD.to_string(),
        Value::String(metadata_hash.to_hex()),
    );
    if let Some(url) = metadata_url {
        map.insert(METADATA_URL_FIELD.to_string(), Value::String(url.to_string()));
    }
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_type_string_form() {
        assert_eq!(EventType::MetadataCreated.as_str(), "METADATA_CREATED");
        assert_eq!(EventType::from("METADATA_UPDATED"), EventType::MetadataUpdated);
        assert_eq!(
            EventType::from("SHIPPED"),
            EventType::Custom("SHIPPED".to_string())
        );
        assert!(EventType::MetadataUpdated.is_metadata());
        assert!(!EventType::from("SHIPPED").is_metadata());
    }

    #[test]
    fn test_event_type_serde() {
        let json = serde_json::to_string(&EventType::MetadataCreated).unwrap();
        assert_eq!(json, "\"METADATA_CREATED\"");
        let back: EventType = serde_json::from_str("\"INSPECTED\"").unwrap();
        assert_eq!(back, EventType::Custom("INSPECTED".into()));
    }

    #[test]
    fn test_anchor_event_hashes_payload() {
        let event = AnchorEvent::new("xwing1", EventType::MetadataUpdated, json!({"a": 1}), None);
        assert_eq!(
            event.payload_hash.to_hex(),
            "015abd7f5cc57a2dd94b7590f04ad8084273905ee33ec5cebeae62276a97f862"
        );
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_anchor_event_validation() {
        let mut event = AnchorEvent::new("", EventType::MetadataCreated, json!(null), None);
        assert!(event.validate().is_err());

        event.subject_id = "s".into();
        event.payload = json!({"tampered": true});
        let err = event.validate().unwrap_err();
        assert!(err.to_string().contains("payload hash"));
    }

    #[test]
    fn test_metadata_payload_accessors() {
        let digest = crate::digest::sha256(b"record");
        let payload = metadata_payload(&digest, Some("file:///tmp/xwing1.json"));
        let event = AnchorEvent::new(
            "xwing1",
            EventType::MetadataUpdated,
            payload,
            Some(TxRef::new("ABC")),
        );
        assert_eq!(event.metadata_hash(), Some(digest.to_hex().as_str()));
        assert_eq!(event.metadata_url(), Some("file:///tmp/xwing1.json"));

        let plain = AnchorEvent::new("xwing1", EventType::from("SHIPPED"), json!({"x": 1}), None);
        assert_eq!(plain.metadata_hash(), None);
        assert_eq!(plain.metadata_url(), None);
    }

    #[test]
    fn test_anchor_event_serde_roundtrip() {
        let event = AnchorEvent::new(
            "xwing1",
            EventType::MetadataCreated,
            json!({"metadata_hash": "00"}),
            Some(TxRef::new("DEADBEEF")),
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"METADATA_CREATED\""));
        assert!(json.contains("\"ledger_tx_ref\":\"DEADBEEF\""));
        let back: AnchorEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
