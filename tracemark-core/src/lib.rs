//! Tracemark Core - Canonical hashing and data model for metadata anchoring.
//!
//! This crate provides the types shared by every other Tracemark crate:
//!
//! - [`canonical`] - Deterministic serialization and content digests
//! - [`digest`] - The SHA-256 [`Digest`] newtype
//! - [`event`] - Anchor events (the append-only history)
//! - [`pending`] - Recovery hints for unconfirmed anchors
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use tracemark_core::{digest_value, AnchorEvent, EventType};
//!
//! let metadata = json!({"name": "X-Wing", "serial": 1});
//! let event = AnchorEvent::new(
//!     "xwing1",
//!     EventType::MetadataCreated,
//!     json!({"metadata_hash": digest_value(&metadata).to_hex()}),
//!     None,
//! );
//!
//! assert_eq!(event.metadata_hash(), Some(digest_value(&metadata).to_hex().as_str()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod canonical;
pub mod digest;
#[allow(missing_docs)]
pub mod error;
pub mod event;
pub mod pending;

#[cfg(test)]
mod proptest;

// Re-exports for convenience
pub use canonical::{canonicalize, canonicalize_value, digest, digest_value};
pub use digest::{sha256, Digest, DIGEST_LEN};
pub use error::{Error, ErrorCode, Result};
pub use event::{
    metadata_payload, AnchorEvent, EventType, TxRef, METADATA_HASH_FIELD, METADATA_URL_FIELD,
};
pub use pending::PendingAnchor;
