//! Ledger Anchoring for Tracemark.
//!
//! This crate commits content digests of mutable metadata records to an
//! external, eventually-final ledger and later certifies whether a record
//! still matches its latest anchor.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                      TRACEMARK ANCHOR LAYER                          │
//! │                                                                      │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │ ANCHORER                                                       │  │
//! │  │  - Hashes payloads canonically                                 │  │
//! │  │  - Submits with a fresh validity bound per attempt             │  │
//! │  │  - Races finality against a timeout, polls once on expiry      │  │
//! │  │  - Keeps a recovery hint for unconfirmed outcomes              │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! │            │                    │                     │              │
//! │            ▼                    ▼                     ▼              │
//! │  ┌─────────────────┐  ┌──────────────────┐  ┌─────────────────┐     │
//! │  │ LedgerGateway   │  │  PendingStore    │  │   EventLog      │     │
//! │  │ (XRPL, mock)    │  │  (single slot)   │  │ (newest first)  │     │
//! │  └─────────────────┘  └──────────────────┘  └─────────────────┘     │
//! │                                                     │                │
//! │  ┌───────────────────────────────────────────────────────────────┐  │
//! │  │ VERIFIER                                                       │  │
//! │  │  - Compares current metadata with the newest anchored digest   │  │
//! │  │  - Matched / Mismatched / Unknown                              │  │
//! │  └───────────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tracemark_anchor::{AnchorRequest, Anchorer, MockGateway};
//! use tracemark_core::EventType;
//! use tracemark_storage::{MemoryEventLog, MemoryPendingStore};
//!
//! let anchorer = Anchorer::new(
//!     Arc::new(MockGateway::new()),
//!     Arc::new(MemoryPendingStore::new()),
//!     Arc::new(MemoryEventLog::new()),
//! );
//!
//! let request = AnchorRequest::new("xwing1", EventType::MetadataCreated, metadata);
//! let result = anchorer.anchor(request).await?;
//! assert!(result.is_confirmed());
//!
//! let verification = anchorer.verify_subject("xwing1", &metadata).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod anchorer;
pub mod config;
pub mod errors;
pub mod gateway;
pub mod verify;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use anchorer::{AnchorRequest, AnchorResult, Anchorer};
pub use config::AnchorConfig;
pub use errors::{AnchorError, Result};
pub use gateway::{
    GatewayError, GatewayResult, LedgerDraft, LedgerGateway, PreparedTx, Submission, TxStatus,
    MEMO_FORMAT, MEMO_TYPE,
};
pub use verify::{verify, Verification};

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockBehavior, MockGateway};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::anchorer::{AnchorRequest, AnchorResult, Anchorer};
    pub use crate::config::AnchorConfig;
    pub use crate::errors::{AnchorError, Result};
    pub use crate::gateway::{GatewayError, LedgerGateway, TxStatus};
    pub use crate::verify::{verify, Verification};

    #[cfg(any(test, feature = "mock"))]
    pub use crate::mock::{MockBehavior, MockGateway};
}
