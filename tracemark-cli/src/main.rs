//! tracemark: anchor metadata digests to the XRP Ledger and verify them.
//!
//! Reads `tracemark.toml` (see [`config::Config`]) and runs one subcommand.
//! Results are printed to stdout as JSON; logs go to stderr.

mod config;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use tracemark_anchor::{verify, AnchorRequest, AnchorResult, Anchorer, Verification};
use tracemark_core::{canonicalize_value, digest_value, EventType, PendingAnchor};
use tracemark_storage::MetadataStore;
use tracemark_xrpl::XrplGateway;

use config::{Config, Stores};

#[derive(Parser)]
#[command(name = "tracemark")]
#[command(about = "Anchor metadata digests to the XRP Ledger and verify them")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "tracemark.toml")]
    config: PathBuf,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Ledger signing secret (overrides config file)
    #[arg(long, env = "TRACEMARK_LEDGER_SECRET", hide_env_values = true)]
    ledger_secret: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the canonical digest of a JSON file
    Digest {
        /// JSON file
        file: PathBuf,
        /// Also print the canonical form
        #[arg(long)]
        show_canonical: bool,
    },

    /// Anchor a JSON payload
    Anchor {
        /// Subject identifier
        #[arg(long)]
        subject: String,
        /// Event type, e.g. SHIPPED
        #[arg(long)]
        event_type: String,
        /// JSON payload file
        #[arg(long)]
        payload: PathBuf,
        /// Where the payload is published
        #[arg(long)]
        source_url: Option<String>,
    },

    /// Anchor the digest of a subject's metadata record
    AnchorMetadata {
        /// Subject identifier
        #[arg(long)]
        subject: String,
        /// Event type (default: METADATA_CREATED for a new record, else
        /// METADATA_UPDATED)
        #[arg(long)]
        event_type: Option<String>,
        /// Store this JSON file as the new record first
        #[arg(long)]
        metadata: Option<PathBuf>,
    },

    /// Retry the pending anchor, if any
    Retry,

    /// Show the pending anchor
    Pending {
        /// Discard it instead
        #[arg(long)]
        clear: bool,
    },

    /// List anchor events for a subject, newest first
    Events {
        /// Subject identifier
        #[arg(long)]
        subject: String,
        /// Maximum number of events
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },

    /// Verify metadata against the latest anchor
    Verify {
        /// Subject identifier
        #[arg(long)]
        subject: String,
        /// JSON file to verify (default: the stored record)
        #[arg(long)]
        metadata: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .init();

    match cli.command {
        Command::Digest {
            file,
            show_canonical,
        } => {
            let value = read_json(&file)?;
            if show_canonical {
                println!("{}", canonicalize_value(&value));
            }
            println!("{}", digest_value(&value));
            Ok(ExitCode::SUCCESS)
        }

        Command::Anchor {
            subject,
            event_type,
            payload,
            source_url,
        } => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            let anchorer = session.anchorer()?;
            let mut request =
                AnchorRequest::new(subject, EventType::from(event_type), read_json(&payload)?);
            request.source_url = source_url;
            let result = anchorer.anchor(request).await?;
            print_json(&result)?;
            Ok(exit_for(&result))
        }

        Command::AnchorMetadata {
            subject,
            event_type,
            metadata,
        } => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            let anchorer = session.anchorer()?;
            let existed = session.stores.metadata.get(&subject).await?.is_some();
            if let Some(path) = metadata {
                let url = session.stores.metadata.put(&subject, read_json(&path)?).await?;
                info!(subject = %subject, url = %url, "Stored metadata record");
            }
            let event_type = match event_type {
                Some(t) => EventType::from(t),
                None if existed => EventType::MetadataUpdated,
                None => EventType::MetadataCreated,
            };
            let result = anchorer
                .anchor_metadata(&session.stores.metadata, &subject, event_type)
                .await?;
            print_json(&result)?;
            Ok(exit_for(&result))
        }

        Command::Retry => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            let Some(hint) = session.pending.clone() else {
                println!("no pending anchor");
                return Ok(ExitCode::SUCCESS);
            };
            let anchorer = session.anchorer()?;
            let result = anchorer.retry(hint).await?;
            print_json(&result)?;
            Ok(exit_for(&result))
        }

        Command::Pending { clear } => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            match (&session.pending, clear) {
                (None, _) => println!("no pending anchor"),
                (Some(_), true) => {
                    session.stores.pending.clear()?;
                    println!("pending anchor cleared");
                }
                (Some(hint), false) => print_json(hint)?,
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Events { subject, limit } => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            let events = session.stores.events.query(&subject, limit).await?;
            print_json(&events)?;
            Ok(ExitCode::SUCCESS)
        }

        Command::Verify { subject, metadata } => {
            let session = Session::open(&cli.config, cli.ledger_secret)?;
            let current = match metadata {
                Some(path) => read_json(&path)?,
                None => {
                    session
                        .stores
                        .metadata
                        .get(&subject)
                        .await?
                        .with_context(|| format!("no metadata record for {}", subject))?
                        .metadata
                }
            };
            let history = session
                .stores
                .events
                .query(&subject, session.config.anchor.history_limit)
                .await?;
            let verification = verify(&subject, &current, &history);
            print_json(&verification)?;
            Ok(match verification {
                Verification::Matched { .. } => ExitCode::SUCCESS,
                Verification::Mismatched { .. } => ExitCode::from(1),
                Verification::Unknown { .. } => ExitCode::from(2),
            })
        }
    }
}

/// Configuration and stores for commands that touch anchor state.
struct Session {
    config: Config,
    stores: Stores,
    pending: Option<PendingAnchor>,
}

impl Session {
    /// Load the config, open the stores and report any unconfirmed anchor.
    fn open(path: &Path, ledger_secret: Option<String>) -> Result<Self> {
        let config = Config::load(path)?.with_ledger_secret(ledger_secret);
        let stores = Stores::open(&config.storage)?;

        let pending = match stores.pending.load() {
            Ok(hint) => hint,
            Err(e) => {
                warn!(error = %e, "Pending anchor unreadable");
                None
            }
        };
        if let Some(hint) = &pending {
            warn!(
                subject = %hint.subject_id,
                event_type = %hint.event_type,
                tx_ref = ?hint.tx_ref,
                attempts = hint.attempts,
                "Unconfirmed anchor on record; run `tracemark retry` to resolve it"
            );
        }

        Ok(Self {
            config,
            stores,
            pending,
        })
    }

    fn anchorer(&self) -> Result<Anchorer> {
        let gateway = XrplGateway::new(self.config.ledger()?.clone())?;
        Ok(Anchorer::with_config(
            Arc::new(gateway),
            self.stores.pending.clone(),
            self.stores.events.clone(),
            self.config.anchor.clone(),
        )?)
    }
}

fn read_json(path: &Path) -> Result<Value> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON in {}", path.display()))
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn exit_for(result: &AnchorResult) -> ExitCode {
    match result {
        AnchorResult::Confirmed { .. } => ExitCode::SUCCESS,
        AnchorResult::Pending { .. } => ExitCode::from(2),
        AnchorResult::Failed { .. } => ExitCode::from(1),
    }
}
