//! XRP Ledger Anchoring for Tracemark.
//!
//! This crate provides an XRPL implementation of the `LedgerGateway` trait,
//! talking to a rippled node over JSON-RPC.
//!
//! # Transaction Shape
//!
//! Each anchor is one transaction carrying a single memo:
//!
//! - `MemoType`: hex of `trace_event`
//! - `MemoFormat`: hex of `application/json`
//! - `MemoData`: hex of the canonical `{"event_type","item_id","payload_hash"}`
//!
//! The transaction is an `AccountSet` on the anchoring account, or a 1-drop
//! `Payment` when a destination is configured. `LastLedgerSequence` is the
//! validity bound chosen by the anchorer.
//!
//! # Example
//!
//! ```ignore
//! use tracemark_xrpl::{XrplConfig, XrplGateway};
//!
//! let config = XrplConfig::testnet("rAccount...", secret);
//! let gateway = XrplGateway::connect(config).await?;
//!
//! let anchorer = Anchorer::new(Arc::new(gateway), pending, events);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

use std::time::Duration;

mod config;
mod error;
mod gateway;
pub mod rpc;

pub use config::XrplConfig;
pub use error::{classify_engine_result, EngineClass, Result, XrplError};
pub use gateway::XrplGateway;

/// Public testnet JSON-RPC endpoint.
pub const TESTNET_RPC_URL: &str = "https://s.altnet.rippletest.net:51234";

/// Default provider ID.
pub const DEFAULT_PROVIDER_ID: &str = "xrpl";

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

/// Default interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Amount carried by a `Payment` anchor, in drops.
pub const ANCHOR_AMOUNT_DROPS: &str = "1";
