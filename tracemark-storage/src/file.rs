//! File-backed stores.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;
use url::Url;

use tracemark_core::{Error, PendingAnchor, Result};

use crate::traits::{MetadataRecord, MetadataStore, PendingStore};

/// Write `bytes` to `path` atomically: a temp file in the same directory is
/// written, synced and renamed over the target.
fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .map_err(|e| Error::storage_write(format!("create {}: {}", dir.display(), e)))?;

    let mut tmp = NamedTempFile::new_in(&dir)
        .map_err(|e| Error::storage_write(format!("temp file in {}: {}", dir.display(), e)))?;
    tmp.write_all(bytes)
        .and_then(|_| tmp.as_file().sync_all())
        .map_err(|e| Error::storage_write(format!("write {}: {}", path.display(), e)))?;
    tmp.persist(path)
        .map_err(|e| Error::storage_write(format!("rename to {}: {}", path.display(), e.error)))?;
    Ok(())
}

/// Pending slot kept as a single JSON file.
#[derive(Debug, Clone)]
pub struct FilePendingStore {
    path: PathBuf,
}

impl FilePendingStore {
    /// Use the file at `path`. It is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingStore for FilePendingStore {
    fn save(&self, record: &PendingAnchor) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        write_atomic(&self.path, &bytes)?;
        debug!(path = %self.path.display(), subject = %record.subject_id, "Saved pending anchor");
        Ok(())
    }

    fn load(&self) -> Result<Option<PendingAnchor>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::storage_write(format!(
                "remove {}: {}",
                self.path.display(),
                e
            ))),
        }
    }
}

/// Replace every character outside `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_file_stem(input: &str) -> String {
    input
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Metadata store keeping one `<subject>.json` file per subject in a directory.
#[derive(Debug, Clone)]
pub struct FileMetadataStore {
    dir: PathBuf,
}

impl FileMetadataStore {
    /// Use `dir` as the store root. Relative paths are resolved against the
    /// current directory so source URLs are absolute.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let dir = if dir.is_absolute() {
            dir
        } else {
            std::env::current_dir()?.join(dir)
        };
        Ok(Self { dir })
    }

    /// Store root.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, subject_id: &str) -> Result<PathBuf> {
        let stem = sanitize_file_stem(subject_id);
        if stem.is_empty() {
            return Err(Error::invalid_event("subject id is empty"));
        }
        Ok(self.dir.join(format!("{}.json", stem)))
    }

    fn source_url(path: &Path) -> Result<String> {
        Url::from_file_path(path)
            .map(|u| u.to_string())
            .map_err(|_| Error::internal(format!("not an absolute path: {}", path.display())))
    }
}

#[async_trait]
impl MetadataStore for FileMetadataStore {
    async fn get(&self, subject_id: &str) -> Result<Option<MetadataRecord>> {
        let path = self.record_path(subject_id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(MetadataRecord {
            subject_id: subject_id.to_string(),
            metadata: serde_json::from_slice(&bytes)?,
            source_url: Some(Self::source_url(&path)?),
        }))
    }

    async fn put(&self, subject_id: &str, metadata: Value) -> Result<String> {
        let path = self.record_path(subject_id)?;
        let bytes = serde_json::to_vec_pretty(&metadata)?;
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| Error::internal(format!("metadata write task failed: {}", e)))??;
        debug!(path = %path.display(), subject = subject_id, "Stored metadata");
        Self::source_url(&path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tracemark_core::EventType;

    #[test]
    fn test_pending_file_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePendingStore::new(dir.path().join("pending.json"));

        assert!(store.load().unwrap().is_none());
        store.clear().unwrap();

        let a = PendingAnchor::new("xwing1", EventType::MetadataCreated, json!({"a": 1}))
            .with_source_url("https://example.test/xwing1.json");
        store.save(&a).unwrap();
        assert_eq!(store.load().unwrap(), Some(a));

        let b = PendingAnchor::new("xwing1", EventType::MetadataUpdated, json!({"a": 2}));
        store.save(&b).unwrap();
        assert_eq!(store.load().unwrap(), Some(b));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_pending_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pending.json");
        let record = PendingAnchor::new("s", EventType::from("SHIPPED"), json!([1, 2, 3]));

        FilePendingStore::new(&path).save(&record).unwrap();
        let reopened = FilePendingStore::new(&path);
        assert_eq!(reopened.load().unwrap(), Some(record));
    }

    #[test]
    fn test_pending_file_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pending.json");
        std::fs::write(&path, b"{not json").unwrap();

        let err = FilePendingStore::new(&path).load().unwrap_err();
        assert_eq!(err.code(), tracemark_core::ErrorCode::Deserialization);
    }

    #[test]
    fn test_sanitize_file_stem() {
        assert_eq!(sanitize_file_stem("xwing1"), "xwing1");
        assert_eq!(sanitize_file_stem(" a/b\\c d "), "a_b_c_d");
        assert_eq!(sanitize_file_stem("v1.2-rc_3"), "v1.2-rc_3");
        assert_eq!(sanitize_file_stem("   "), "");
    }

    #[tokio::test]
    async fn test_metadata_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMetadataStore::new(dir.path()).unwrap();

        assert!(store.get("xwing1").await.unwrap().is_none());

        let url = store
            .put("xwing1", json!({"name": "xwing1", "trace": {"sequence": 1}}))
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.ends_with("/xwing1.json"));

        let record = store.get("xwing1").await.unwrap().unwrap();
        assert_eq!(record.metadata["trace"]["sequence"], json!(1));
        assert_eq!(record.source_url, Some(url));

        assert!(store.put("  ", json!({})).await.is_err());
    }
}
