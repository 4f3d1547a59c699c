//! Storage traits.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use tracemark_core::{AnchorEvent, PendingAnchor, Result};

/// Durable single slot holding the last unconfirmed anchor attempt.
///
/// At most one record is live at a time; `save` overwrites whatever is there.
pub trait PendingStore: Send + Sync {
    /// Persist a record, replacing any previous one.
    fn save(&self, record: &PendingAnchor) -> Result<()>;

    /// Load the current record, if any.
    fn load(&self) -> Result<Option<PendingAnchor>>;

    /// Remove the current record. Clearing an empty slot is not an error.
    fn clear(&self) -> Result<()>;
}

/// Append-only history of anchor events.
#[async_trait]
pub trait EventLog: Send + Sync {
    /// Append an event.
    async fn append(&self, event: &AnchorEvent) -> Result<()>;

    /// Events for a subject, newest first, at most `limit` of them.
    ///
    /// Events with equal creation times are returned most recently appended
    /// first.
    async fn query(&self, subject_id: &str, limit: usize) -> Result<Vec<AnchorEvent>>;
}

/// A metadata record as held by a [`MetadataStore`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    /// Subject the metadata describes.
    pub subject_id: String,
    /// The metadata document.
    pub metadata: Value,
    /// Where the document is published.
    pub source_url: Option<String>,
}

/// Store of mutable metadata records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Fetch the current record for a subject.
    async fn get(&self, subject_id: &str) -> Result<Option<MetadataRecord>>;

    /// Store a new version for a subject and return its source URL.
    async fn put(&self, subject_id: &str, metadata: Value) -> Result<String>;
}
