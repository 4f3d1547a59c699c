//! In-memory stores.
//!
//! Useful for tests and for embedding where persistence across restarts is
//! not needed.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use tracemark_core::{AnchorEvent, PendingAnchor, Result};

use crate::traits::{EventLog, MetadataRecord, MetadataStore, PendingStore};

/// In-memory pending slot.
#[derive(Debug, Default)]
pub struct MemoryPendingStore {
    slot: RwLock<Option<PendingAnchor>>,
}

impl MemoryPendingStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl PendingStore for MemoryPendingStore {
    fn save(&self, record: &PendingAnchor) -> Result<()> {
        *self.slot.write() = Some(record.clone());
        Ok(())
    }

    fn load(&self) -> Result<Option<PendingAnchor>> {
        Ok(self.slot.read().clone())
    }

    fn clear(&self) -> Result<()> {
        *self.slot.write() = None;
        Ok(())
    }
}

/// In-memory event log.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    events: RwLock<Vec<AnchorEvent>>,
}

impl MemoryEventLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of events across all subjects.
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Check if the log is empty.
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }
}

#[async_trait]
impl EventLog for MemoryEventLog {
    async fn append(&self, event: &AnchorEvent) -> Result<()> {
        self.events.write().push(event.clone());
        Ok(())
    }

    async fn query(&self, subject_id: &str, limit: usize) -> Result<Vec<AnchorEvent>> {
        // Reverse append order first so the stable sort keeps later appends
        // ahead of earlier ones with the same timestamp.
        let mut matching: Vec<AnchorEvent> = self
            .events
            .read()
            .iter()
            .rev()
            .filter(|e| e.subject_id == subject_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, MetadataRecord>>,
}

impl MemoryMetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn get(&self, subject_id: &str) -> Result<Option<MetadataRecord>> {
        Ok(self.records.read().get(subject_id).cloned())
    }

    async fn put(&self, subject_id: &str, metadata: Value) -> Result<String> {
        let url = format!("memory://{}", subject_id);
        self.records.write().insert(
            subject_id.to_string(),
            MetadataRecord {
                subject_id: subject_id.to_string(),
                metadata,
                source_url: Some(url.clone()),
            },
        );
        Ok(url)
    }
}
