//! CLI configuration file.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use tracemark_anchor::AnchorConfig;
use tracemark_storage::{
    EventLog, FileMetadataStore, FilePendingStore, PendingStore, PostgrestConfig,
    PostgrestEventLog, RocksStorage,
};
use tracemark_xrpl::XrplConfig;

/// Top-level configuration, read from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// State machine tuning.
    #[serde(default)]
    pub anchor: AnchorConfig,

    /// Ledger connection. Required only by commands that submit.
    #[serde(default)]
    pub ledger: Option<XrplConfig>,

    /// Where state lives.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend for the pending slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PendingBackend {
    /// A JSON file under the data directory.
    #[default]
    File,
    /// The RocksDB database under the data directory.
    Rocksdb,
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Root directory for local state.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Pending slot backend.
    #[serde(default)]
    pub pending: PendingBackend,

    /// Hosted event table. When unset, events go to the local RocksDB.
    #[serde(default)]
    pub postgrest: Option<PostgrestConfig>,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(".tracemark")
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            pending: PendingBackend::default(),
            postgrest: None,
        }
    }
}

impl Config {
    /// Load from `path`, falling back to defaults when the file is absent.
    pub fn load(path: &Path) -> Result<Self> {
        let config: Config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("reading config {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("parsing config {}", path.display()))?
        } else {
            info!("Config file {} not found, using defaults", path.display());
            Config::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Override the ledger secret, e.g. from the environment.
    pub fn with_ledger_secret(mut self, secret: Option<String>) -> Self {
        if let (Some(ledger), Some(secret)) = (self.ledger.as_mut(), secret) {
            ledger.secret = secret;
        }
        self
    }

    /// Validate every section that is present.
    pub fn validate(&self) -> Result<()> {
        self.anchor.validate().context("invalid [anchor] section")?;
        if let Some(postgrest) = &self.storage.postgrest {
            postgrest
                .validate()
                .context("invalid [storage.postgrest] section")?;
        }
        Ok(())
    }

    /// The ledger section, validated.
    pub fn ledger(&self) -> Result<&XrplConfig> {
        let ledger = self
            .ledger
            .as_ref()
            .context("no [ledger] section in config")?;
        ledger.validate().context("invalid [ledger] section")?;
        Ok(ledger)
    }
}

/// Opened storage backends.
pub struct Stores {
    /// Pending slot.
    pub pending: Arc<dyn PendingStore>,
    /// Event log.
    pub events: Arc<dyn EventLog>,
    /// Metadata records.
    pub metadata: FileMetadataStore,
}

impl Stores {
    /// Open the configured backends, creating the data directory.
    pub fn open(config: &StorageConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.data_dir)
            .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;

        let needs_rocks =
            config.pending == PendingBackend::Rocksdb || config.postgrest.is_none();
        let rocks = if needs_rocks {
            let path = config.data_dir.join("db");
            Some(Arc::new(RocksStorage::open(&path).with_context(|| {
                format!("opening RocksDB at {}", path.display())
            })?))
        } else {
            None
        };

        let pending: Arc<dyn PendingStore> = match (config.pending, &rocks) {
            (PendingBackend::Rocksdb, Some(db)) => db.clone() as Arc<dyn PendingStore>,
            _ => Arc::new(FilePendingStore::new(config.data_dir.join("pending.json"))),
        };

        let events: Arc<dyn EventLog> = match (&config.postgrest, &rocks) {
            (Some(pg), _) => Arc::new(PostgrestEventLog::new(pg.clone())?),
            (None, Some(db)) => db.clone() as Arc<dyn EventLog>,
            (None, None) => anyhow::bail!("no event log backend configured"),
        };

        let metadata = FileMetadataStore::new(config.data_dir.join("metadata"))?;

        Ok(Self {
            pending,
            events,
            metadata,
        })
    }
}
