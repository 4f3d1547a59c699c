//! Storage layer for Tracemark.
//!
//! Provides the persistence ports the anchoring state machine consumes:
//! - [`PendingStore`]: the single-slot recovery hint
//! - [`EventLog`]: append-only anchor history, queried newest-first
//! - [`MetadataStore`]: mutable metadata records and their source URLs
//!
//! Each port has an in-memory implementation plus durable ones:
//!
//! | Backend | Pending | Events | Metadata |
//! |---------|---------|--------|----------|
//! | memory  | yes     | yes    | yes      |
//! | file    | yes     |        | yes      |
//! | RocksDB | yes     | yes    |          |
//! | PostgREST |       | yes    |          |
//!
//! # Example
//!
//! ```ignore
//! use tracemark_storage::{EventLog, RocksStorage};
//!
//! let storage = RocksStorage::open("./data")?;
//! let history = storage.query("xwing1", 50).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod file;
mod memory;
mod postgrest;
mod rocks;
mod traits;

pub use file::{sanitize_file_stem, FileMetadataStore, FilePendingStore};
pub use memory::{MemoryEventLog, MemoryMetadataStore, MemoryPendingStore};
pub use postgrest::{PostgrestConfig, PostgrestEventLog, DEFAULT_TABLE};
pub use rocks::RocksStorage;
pub use traits::{EventLog, MetadataRecord, MetadataStore, PendingStore};
