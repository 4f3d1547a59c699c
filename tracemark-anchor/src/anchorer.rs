//! The anchor submission state machine.
//!
//! One operation runs Hash → Build → Attempt loop → one of three terminal
//! states:
//!
//! - **Confirmed**: clear the matching pending hint, append an event
//! - **Pending**: save a hint carrying the last transaction, append nothing
//! - **Failed**: save a hint so the caller can retry the same payload
//!
//! Every attempt fetches the live ledger height and stamps a fresh validity
//! bound. A stale bound is rejected deterministically by the ledger.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use tracemark_core::{
    digest_value, metadata_payload, AnchorEvent, Digest, EventType, PendingAnchor, TxRef,
};
use tracemark_storage::{EventLog, MetadataStore, PendingStore};

use crate::config::AnchorConfig;
use crate::errors::{AnchorError, Result};
use crate::gateway::{GatewayError, LedgerDraft, LedgerGateway};
use crate::verify::{verify, Verification};

/// A request to anchor one payload.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRequest {
    /// Subject being anchored.
    pub subject_id: String,
    /// Event type.
    pub event_type: EventType,
    /// Payload whose digest is committed.
    pub payload: Value,
    /// Where the underlying metadata is published, if known.
    pub source_url: Option<String>,
}

impl AnchorRequest {
    /// Create a request.
    pub fn new(subject_id: impl Into<String>, event_type: EventType, payload: Value) -> Self {
        Self {
            subject_id: subject_id.into(),
            event_type,
            payload,
            source_url: None,
        }
    }

    /// Set the source URL.
    pub fn with_source_url(mut self, url: impl Into<String>) -> Self {
        self.source_url = Some(url.into());
        self
    }

    /// Validate the request.
    pub fn validate(&self) -> Result<()> {
        if self.subject_id.trim().is_empty() {
            return Err(AnchorError::InvalidRequest("subject id is empty".into()));
        }
        if self.event_type.as_str().trim().is_empty() {
            return Err(AnchorError::InvalidRequest("event type is empty".into()));
        }
        Ok(())
    }

    fn from_pending(pending: &PendingAnchor) -> Self {
        Self {
            subject_id: pending.subject_id.clone(),
            event_type: pending.event_type.clone(),
            payload: pending.payload.clone(),
            source_url: pending.source_url.clone(),
        }
    }
}

/// Terminal outcome of an anchor operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AnchorResult {
    /// The transaction validated.
    Confirmed {
        /// Validated transaction.
        tx_ref: TxRef,
        /// Anchored digest.
        payload_hash: Digest,
    },
    /// The outcome is unknown; a recovery hint was saved.
    Pending {
        /// Last submitted transaction.
        tx_ref: TxRef,
        /// Digest being anchored.
        payload_hash: Digest,
    },
    /// The operation failed; a recovery hint was saved.
    Failed {
        /// Why the last attempt failed.
        reason: String,
        /// Digest that was not anchored.
        payload_hash: Digest,
    },
}

impl AnchorResult {
    /// Check if the anchor is confirmed.
    pub fn is_confirmed(&self) -> bool {
        matches!(self, AnchorResult::Confirmed { .. })
    }

    /// Check if the outcome is pending.
    pub fn is_pending(&self) -> bool {
        matches!(self, AnchorResult::Pending { .. })
    }

    /// Check if the operation failed.
    pub fn is_failed(&self) -> bool {
        matches!(self, AnchorResult::Failed { .. })
    }

    /// Transaction reference, if one was submitted.
    pub fn tx_ref(&self) -> Option<&TxRef> {
        match self {
            AnchorResult::Confirmed { tx_ref, .. } | AnchorResult::Pending { tx_ref, .. } => {
                Some(tx_ref)
            }
            AnchorResult::Failed { .. } => None,
        }
    }

    /// Digest of the payload.
    pub fn payload_hash(&self) -> &Digest {
        match self {
            AnchorResult::Confirmed { payload_hash, .. }
            | AnchorResult::Pending { payload_hash, .. }
            | AnchorResult::Failed { payload_hash, .. } => payload_hash,
        }
    }
}

/// How the attempt loop ended, before side effects are applied.
#[derive(Debug)]
enum Outcome {
    Confirmed(TxRef),
    Pending {
        tx_ref: TxRef,
        valid_until: u64,
    },
    /// No transaction of this request can still validate.
    Failed(String),
}

/// Releases a subject's busy flag on drop.
struct SubjectGuard<'a> {
    busy: &'a Mutex<HashSet<String>>,
    subject_id: String,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        self.busy.lock().remove(&self.subject_id);
    }
}

/// Orchestrates hashing, submission and resolution of anchor operations.
///
/// Holds every collaborator explicitly: the ledger gateway, the pending
/// hint store and the event log.
pub struct Anchorer {
    gateway: Arc<dyn LedgerGateway>,
    pending: Arc<dyn PendingStore>,
    events: Arc<dyn EventLog>,
    config: AnchorConfig,
    busy: Mutex<HashSet<String>>,
}

impl Anchorer {
    /// Create an anchorer with default configuration.
    pub fn new(
        gateway: Arc<dyn LedgerGateway>,
        pending: Arc<dyn PendingStore>,
        events: Arc<dyn EventLog>,
    ) -> Self {
        Self {
            gateway,
            pending,
            events,
            config: AnchorConfig::default(),
            busy: Mutex::new(HashSet::new()),
        }
    }

    /// Create with custom configuration.
    pub fn with_config(
        gateway: Arc<dyn LedgerGateway>,
        pending: Arc<dyn PendingStore>,
        events: Arc<dyn EventLog>,
        config: AnchorConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            ..Self::new(gateway, pending, events)
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &AnchorConfig {
        &self.config
    }

    /// Get the gateway.
    pub fn gateway(&self) -> &Arc<dyn LedgerGateway> {
        &self.gateway
    }

    /// Anchor a payload.
    ///
    /// Ledger outcomes are reported in the [`AnchorResult`]; an `Err` means
    /// the operation did not run.
    pub async fn anchor(&self, request: AnchorRequest) -> Result<AnchorResult> {
        request.validate()?;
        let _guard = self.acquire(&request.subject_id)?;

        let payload_hash = digest_value(&request.payload);
        info!(
            subject = %request.subject_id,
            event_type = %request.event_type,
            payload_hash = %payload_hash,
            gateway = self.gateway.id(),
            "Anchoring payload"
        );

        let draft = LedgerDraft::new(
            request.subject_id.clone(),
            request.event_type.clone(),
            payload_hash,
        );
        let (outcome, attempts) = self.attempt_loop(&draft).await;
        Ok(self
            .settle(&request, payload_hash, outcome, attempts, None)
            .await)
    }

    /// Resolve a pending or failed operation.
    ///
    /// Polls the hint's last transaction before resubmitting: a validated
    /// transaction is confirmed as is, and one that may still validate is
    /// left pending. Only otherwise is the stored payload submitted again.
    pub async fn retry(&self, pending: PendingAnchor) -> Result<AnchorResult> {
        let request = AnchorRequest::from_pending(&pending);
        request.validate()?;

        let payload_hash = digest_value(&pending.payload);
        if payload_hash != pending.payload_hash {
            return Err(AnchorError::InvalidRequest(format!(
                "pending payload hashes to {}, hint records {}",
                payload_hash, pending.payload_hash
            )));
        }

        let _guard = self.acquire(&request.subject_id)?;
        let since = Some(pending.created_at);
        info!(
            subject = %pending.subject_id,
            event_type = %pending.event_type,
            attempts = pending.attempts,
            "Retrying pending anchor"
        );

        if let Some(tx_ref) = &pending.tx_ref {
            match self.gateway.poll_status(tx_ref).await {
                Ok(status) if status.validated => {
                    info!(tx_ref = %tx_ref, "Pending transaction already validated");
                    let outcome = Outcome::Confirmed(tx_ref.clone());
                    return Ok(self
                        .settle(&request, payload_hash, outcome, pending.attempts, since)
                        .await);
                }
                Ok(_) => {
                    let height = self.gateway.ledger_height().await;
                    let still_open = match &height {
                        Ok(h) => pending.is_within_window(*h),
                        // Unknown height: do not risk a duplicate submission.
                        Err(_) => true,
                    };
                    if still_open {
                        debug!(tx_ref = %tx_ref, ?height, "Pending transaction may still validate");
                        let outcome = Outcome::Pending {
                            tx_ref: tx_ref.clone(),
                            valid_until: pending.valid_until.unwrap_or_default(),
                        };
                        return Ok(self
                            .settle(&request, payload_hash, outcome, pending.attempts, since)
                            .await);
                    }
                    debug!(tx_ref = %tx_ref, "Pending transaction expired, resubmitting");
                }
                Err(e) => {
                    warn!(tx_ref = %tx_ref, error = %e, "Poll failed, leaving anchor pending");
                    let outcome = Outcome::Pending {
                        tx_ref: tx_ref.clone(),
                        valid_until: pending.valid_until.unwrap_or_default(),
                    };
                    return Ok(self
                        .settle(&request, payload_hash, outcome, pending.attempts, since)
                        .await);
                }
            }
        }

        let draft = LedgerDraft::new(
            request.subject_id.clone(),
            request.event_type.clone(),
            payload_hash,
        );
        let (outcome, attempts) = self.attempt_loop(&draft).await;
        Ok(self
            .settle(&request, payload_hash, outcome, pending.attempts + attempts, since)
            .await)
    }

    /// Load the pending hint left by an earlier process and retry it.
    ///
    /// An unreadable store is logged and treated as empty.
    pub async fn resume(&self) -> Result<Option<AnchorResult>> {
        match self.pending_hint() {
            Some(hint) => {
                info!(subject = %hint.subject_id, "Resuming pending anchor");
                self.retry(hint).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// The current pending hint, if the store can be read.
    pub fn pending_hint(&self) -> Option<PendingAnchor> {
        match self.pending.load() {
            Ok(hint) => hint,
            Err(e) => {
                warn!(error = %e, "Failed to load pending anchor");
                None
            }
        }
    }

    /// Anchor the digest of a subject's current metadata record.
    ///
    /// The payload is `{"metadata_hash", "metadata_url"}`, the shape
    /// [`verify`] reads back.
    pub async fn anchor_metadata(
        &self,
        store: &dyn MetadataStore,
        subject_id: &str,
        event_type: EventType,
    ) -> Result<AnchorResult> {
        let record = store
            .get(subject_id)
            .await?
            .ok_or_else(|| AnchorError::MetadataNotFound(subject_id.to_string()))?;

        let metadata_hash = digest_value(&record.metadata);
        let payload = metadata_payload(&metadata_hash, record.source_url.as_deref());
        let mut request = AnchorRequest::new(subject_id, event_type, payload);
        request.source_url = record.source_url;
        self.anchor(request).await
    }

    /// Verify `current` against the subject's anchor history.
    pub async fn verify_subject(&self, subject_id: &str, current: &Value) -> Result<Verification> {
        let history = self
            .events
            .query(subject_id, self.config.history_limit)
            .await?;
        let verification = verify(subject_id, current, &history);
        debug!(subject = subject_id, events = history.len(), ?verification, "Verified subject");
        Ok(verification)
    }

    fn acquire(&self, subject_id: &str) -> Result<SubjectGuard<'_>> {
        let mut busy = self.busy.lock();
        if !busy.insert(subject_id.to_string()) {
            return Err(AnchorError::SubjectBusy(subject_id.to_string()));
        }
        Ok(SubjectGuard {
            busy: &self.busy,
            subject_id: subject_id.to_string(),
        })
    }

    /// Run up to `max_attempts` submissions. Returns the outcome and the
    /// number of attempts made.
    async fn attempt_loop(&self, draft: &LedgerDraft) -> (Outcome, u32) {
        let mut last_reason = String::new();

        for attempt in 1..=self.config.max_attempts {
            let height = match self.gateway.ledger_height().await {
                Ok(h) => h,
                Err(e) => match self.on_error(e, attempt, &mut last_reason) {
                    Some(stop) => return (stop, attempt),
                    None => continue,
                },
            };
            let valid_until = height.saturating_add(self.config.validity_window);

            let prepared = match self.gateway.prepare(draft, valid_until).await {
                Ok(p) => p,
                Err(e) => match self.on_error(e, attempt, &mut last_reason) {
                    Some(stop) => return (stop, attempt),
                    None => continue,
                },
            };

            let submission = match self.gateway.sign_and_submit(prepared).await {
                Ok(s) => s,
                Err(e) => match self.on_error(e, attempt, &mut last_reason) {
                    Some(stop) => return (stop, attempt),
                    None => continue,
                },
            };
            let tx_ref = submission.tx_ref;
            debug!(
                subject = %draft.subject_id,
                tx_ref = %tx_ref,
                attempt,
                height,
                valid_until,
                "Submitted anchor transaction"
            );

            match tokio::time::timeout(self.config.submit_timeout, submission.outcome).await {
                Ok(Ok(())) => return (Outcome::Confirmed(tx_ref), attempt),
                Ok(Err(GatewayError::Transient(reason))) => {
                    warn!(tx_ref = %tx_ref, attempt, reason = %reason, "Transient ledger error");
                    last_reason = reason;
                }
                Ok(Err(GatewayError::Rejected(reason))) => {
                    warn!(tx_ref = %tx_ref, attempt, reason = %reason, "Transaction rejected");
                    return (Outcome::Failed(reason), attempt);
                }
                Ok(Err(GatewayError::Timeout(_))) | Err(_) => {
                    return (self.poll_after_timeout(tx_ref, valid_until).await, attempt);
                }
            }
        }

        let reason = if last_reason.is_empty() {
            "attempt limit reached".to_string()
        } else {
            last_reason
        };
        (Outcome::Failed(reason), self.config.max_attempts)
    }

    /// Classify a gateway error raised before the transaction was handed
    /// over. `None` means try again.
    fn on_error(&self, e: GatewayError, attempt: u32, last_reason: &mut String) -> Option<Outcome> {
        warn!(attempt, error = %e, "Ledger call failed before submission");
        match e {
            GatewayError::Transient(reason) => {
                *last_reason = reason;
                None
            }
            GatewayError::Rejected(reason) | GatewayError::Timeout(reason) => {
                Some(Outcome::Failed(reason))
            }
        }
    }

    async fn poll_after_timeout(&self, tx_ref: TxRef, valid_until: u64) -> Outcome {
        match self.gateway.poll_status(&tx_ref).await {
            Ok(status) if status.validated => {
                info!(tx_ref = %tx_ref, "Validated after timeout");
                Outcome::Confirmed(tx_ref)
            }
            Ok(_) => {
                info!(tx_ref = %tx_ref, "Not validated after timeout");
                Outcome::Pending {
                    tx_ref,
                    valid_until,
                }
            }
            Err(e) => {
                warn!(tx_ref = %tx_ref, error = %e, "Poll after timeout failed");
                Outcome::Pending {
                    tx_ref,
                    valid_until,
                }
            }
        }
    }

    /// Apply the side effects of a terminal state and build the result.
    async fn settle(
        &self,
        request: &AnchorRequest,
        payload_hash: Digest,
        outcome: Outcome,
        attempts: u32,
        since: Option<DateTime<Utc>>,
    ) -> AnchorResult {
        match outcome {
            Outcome::Confirmed(tx_ref) => {
                self.clear_matching(request, &payload_hash);
                let event = AnchorEvent {
                    subject_id: request.subject_id.clone(),
                    event_type: request.event_type.clone(),
                    payload_hash,
                    payload: request.payload.clone(),
                    ledger_tx_ref: Some(tx_ref.clone()),
                    created_at: Utc::now(),
                };
                self.append_event(&event).await;
                info!(subject = %request.subject_id, tx_ref = %tx_ref, "Anchor confirmed");
                AnchorResult::Confirmed {
                    tx_ref,
                    payload_hash,
                }
            }
            Outcome::Pending {
                tx_ref,
                valid_until,
            } => {
                let hint = self
                    .hint(request, attempts, since)
                    .with_submission(tx_ref.clone(), valid_until);
                self.save_hint(&hint);
                info!(subject = %request.subject_id, tx_ref = %tx_ref, "Anchor pending");
                AnchorResult::Pending {
                    tx_ref,
                    payload_hash,
                }
            }
            // The hint carries no transaction, so a retry resubmits at once.
            Outcome::Failed(reason) => {
                self.save_hint(&self.hint(request, attempts, since));
                warn!(subject = %request.subject_id, reason = %reason, "Anchor failed");
                AnchorResult::Failed {
                    reason,
                    payload_hash,
                }
            }
        }
    }

    fn hint(
        &self,
        request: &AnchorRequest,
        attempts: u32,
        since: Option<DateTime<Utc>>,
    ) -> PendingAnchor {
        let mut hint = PendingAnchor::new(
            request.subject_id.clone(),
            request.event_type.clone(),
            request.payload.clone(),
        )
        .with_attempts(attempts);
        hint.source_url = request.source_url.clone();
        if let Some(created_at) = since {
            hint.created_at = created_at;
        }
        hint
    }

    fn save_hint(&self, hint: &PendingAnchor) {
        if let Err(e) = self.pending.save(hint) {
            warn!(subject = %hint.subject_id, error = %e, "Failed to save pending anchor");
        }
    }

    fn clear_matching(&self, request: &AnchorRequest, payload_hash: &Digest) {
        match self.pending.load() {
            Ok(Some(hint))
                if hint.matches(&request.subject_id, &request.event_type, payload_hash) =>
            {
                if let Err(e) = self.pending.clear() {
                    warn!(subject = %request.subject_id, error = %e, "Failed to clear pending anchor");
                } else {
                    debug!(subject = %request.subject_id, "Cleared pending anchor");
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!(subject = %request.subject_id, error = %e, "Failed to load pending anchor");
            }
        }
    }

    /// Append to the event log. Failures are logged, never returned.
    async fn append_event(&self, event: &AnchorEvent) {
        if let Err(e) = self.events.append(event).await {
            warn!(
                subject = %event.subject_id,
                tx_ref = ?event.ledger_tx_ref,
                error = %e,
                "Failed to append anchor event; confirmed on ledger but missing from log"
            );
        }
    }
}
