//! RocksDB storage implementation.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, Direction, IteratorMode, Options, WriteBatch, DB,
};
use tracing::{debug, info};

use tracemark_core::{AnchorEvent, Error, PendingAnchor, Result};

use crate::traits::{EventLog, PendingStore};

/// Column family names.
mod cf {
    pub const DEFAULT: &str = "default";
    pub const EVENTS: &str = "events";
    pub const PENDING: &str = "pending";
    pub const META: &str = "meta";
}

/// Metadata keys.
mod meta {
    pub const EVENT_SEQ: &[u8] = b"event_seq";
}

const PENDING_SLOT: &[u8] = b"slot";

/// RocksDB-backed event log and pending slot.
///
/// Event keys are `len(subject) ‖ subject ‖ created_at_millis ‖ seq`, all
/// integers big-endian, so a reverse scan over a subject's prefix yields
/// newest-first order with later appends winning ties.
pub struct RocksStorage {
    db: Arc<DB>,
    seq: Arc<AtomicU64>,
}

impl RocksStorage {
    /// Open or create a storage at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening RocksDB at {:?}", path);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_names = [cf::DEFAULT, cf::EVENTS, cf::PENDING, cf::META];

        let cf_descriptors: Vec<_> = cf_names
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| Error::storage(e.to_string()))?;

        let storage = Self {
            db: Arc::new(db),
            seq: Arc::new(AtomicU64::new(0)),
        };
        let next = storage.get_u64(cf::META, meta::EVENT_SEQ)?.unwrap_or(0);
        storage.seq.store(next, Ordering::SeqCst);
        Ok(storage)
    }

    /// Open with a temporary directory (for testing).
    ///
    /// The directory is removed when the returned guard drops.
    pub fn open_temp() -> Result<(Self, tempfile::TempDir)> {
        let dir = tempfile::tempdir().map_err(|e| Error::storage(e.to_string()))?;
        let storage = Self::open(dir.path())?;
        Ok((storage, dir))
    }

    fn cf(&self, cf_name: &str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(cf_name)
            .ok_or_else(|| Error::storage(format!("missing column family: {}", cf_name)))
    }

    fn get_cf(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| Error::storage(e.to_string()))
    }

    fn put_cf(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key, value)
            .map_err(|e| Error::storage_write(e.to_string()))
    }

    fn get_u64(&self, cf_name: &str, key: &[u8]) -> Result<Option<u64>> {
        match self.get_cf(cf_name, key)? {
            Some(bytes) => {
                let arr: [u8; 8] = bytes
                    .as_slice()
                    .try_into()
                    .map_err(|_| Error::storage_corruption("invalid u64 encoding"))?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn subject_prefix(subject_id: &str) -> Result<Vec<u8>> {
        let len = u16::try_from(subject_id.len())
            .map_err(|_| Error::invalid_event("subject id longer than 65535 bytes"))?;
        let mut prefix = Vec::with_capacity(2 + subject_id.len());
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(subject_id.as_bytes());
        Ok(prefix)
    }

    fn event_key(event: &AnchorEvent, seq: u64) -> Result<Vec<u8>> {
        let mut key = Self::subject_prefix(&event.subject_id)?;
        let millis = u64::try_from(event.created_at.timestamp_millis()).unwrap_or(0);
        key.extend_from_slice(&millis.to_be_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        Ok(key)
    }

    /// Flush memtables to disk.
    pub fn flush(&self) -> Result<()> {
        self.db
            .flush()
            .map_err(|e| Error::storage_write(e.to_string()))
    }
}

impl Clone for RocksStorage {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            seq: Arc::clone(&self.seq),
        }
    }
}

#[async_trait]
impl EventLog for RocksStorage {
    async fn append(&self, event: &AnchorEvent) -> Result<()> {
        let seq = self.seq.fetch_add(1, Ordering::SeqCst);
        let key = Self::event_key(event, seq)?;
        let bytes = serde_json::to_vec(event)?;

        let events_cf = self.cf(cf::EVENTS)?;
        let meta_cf = self.cf(cf::META)?;

        let mut batch = WriteBatch::default();
        batch.put_cf(&events_cf, &key, bytes);
        batch.put_cf(&meta_cf, meta::EVENT_SEQ, (seq + 1).to_be_bytes());

        self.db
            .write(batch)
            .map_err(|e| Error::storage_write(e.to_string()))?;

        debug!(subject = %event.subject_id, seq, "Appended anchor event");
        Ok(())
    }

    async fn query(&self, subject_id: &str, limit: usize) -> Result<Vec<AnchorEvent>> {
        let prefix = Self::subject_prefix(subject_id)?;
        let mut upper = prefix.clone();
        upper.extend_from_slice(&[0xFF; 16]);

        let cf = self.cf(cf::EVENTS)?;
        let iter = self
            .db
            .iterator_cf(&cf, IteratorMode::From(&upper, Direction::Reverse));

        let mut events = Vec::new();
        for item in iter {
            if events.len() >= limit {
                break;
            }
            let (key, value) = item.map_err(|e| Error::storage(e.to_string()))?;
            if !key.starts_with(&prefix) {
                break;
            }
            events.push(serde_json::from_slice(&value)?);
        }
        Ok(events)
    }
}

impl PendingStore for RocksStorage {
    fn save(&self, record: &PendingAnchor) -> Result<()> {
        let bytes = serde_json::to_vec(record)?;
        self.put_cf(cf::PENDING, PENDING_SLOT, &bytes)
    }

    fn load(&self) -> Result<Option<PendingAnchor>> {
        match self.get_cf(cf::PENDING, PENDING_SLOT)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn clear(&self) -> Result<()> {
        let cf = self.cf(cf::PENDING)?;
        self.db
            .delete_cf(&cf, PENDING_SLOT)
            .map_err(|e| Error::storage_write(e.to_string()))
    }
}
