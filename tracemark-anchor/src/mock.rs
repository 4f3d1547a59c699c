//! Mock gateway for testing and development.
//!
//! This module provides a scriptable implementation of the
//! [`LedgerGateway`] trait. Each submission consumes one scripted
//! [`MockBehavior`]; poll answers can be scripted independently. Every
//! validity bound stamped through `prepare` is recorded so tests can check
//! that bounds are refreshed per attempt.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::json;

use tracemark_core::TxRef;

use crate::gateway::{
    GatewayError, GatewayResult, LedgerDraft, LedgerGateway, PreparedTx, Submission, TxStatus,
    MEMO_FORMAT, MEMO_TYPE,
};

/// What a submission does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockBehavior {
    /// The outcome resolves validated immediately.
    Validate,
    /// The outcome resolves validated after a delay.
    ValidateAfter(Duration),
    /// The outcome never resolves.
    NeverResolve,
    /// The outcome fails with a transient error.
    Transient(String),
    /// The outcome fails with a rejection.
    Reject(String),
    /// The outcome fails with an ambiguous timeout.
    OutcomeTimeout(String),
    /// `sign_and_submit` itself fails; nothing is submitted.
    SubmitError(GatewayError),
}

/// Scriptable mock implementation of [`LedgerGateway`].
pub struct MockGateway {
    id: String,
    height: AtomicU64,
    advance_per_submit: AtomicU64,
    behaviors: Mutex<VecDeque<MockBehavior>>,
    poll_answers: Mutex<VecDeque<GatewayResult<TxStatus>>>,
    height_errors: Mutex<VecDeque<GatewayError>>,
    validated: Mutex<HashSet<TxRef>>,
    stamped: Mutex<Vec<u64>>,
    submitted: Mutex<Vec<TxRef>>,
    polled: Mutex<Vec<TxRef>>,
    tx_counter: AtomicU64,
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl MockGateway {
    /// Create a mock at ledger height 1000 that validates every submission.
    pub fn new() -> Self {
        Self {
            id: "mock".to_string(),
            height: AtomicU64::new(1000),
            advance_per_submit: AtomicU64::new(0),
            behaviors: Mutex::new(VecDeque::new()),
            poll_answers: Mutex::new(VecDeque::new()),
            height_errors: Mutex::new(VecDeque::new()),
            validated: Mutex::new(HashSet::new()),
            stamped: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            polled: Mutex::new(Vec::new()),
            tx_counter: AtomicU64::new(0),
        }
    }

    /// Script submission behaviors, consumed in order. Once exhausted,
    /// submissions validate.
    pub fn with_behaviors(self, behaviors: impl IntoIterator<Item = MockBehavior>) -> Self {
        self.behaviors.lock().extend(behaviors);
        self
    }

    /// Script poll answers, consumed in order. Once exhausted, polls report
    /// whether the transaction was scripted to validate.
    pub fn with_poll_answers(
        self,
        answers: impl IntoIterator<Item = GatewayResult<TxStatus>>,
    ) -> Self {
        self.poll_answers.lock().extend(answers);
        self
    }

    /// Advance the ledger by `n` heights after every submission.
    pub fn with_advance_per_submit(self, n: u64) -> Self {
        self.advance_per_submit.store(n, Ordering::Relaxed);
        self
    }

    /// Queue an error for the next `ledger_height` call.
    pub fn push_height_error(&self, e: GatewayError) {
        self.height_errors.lock().push_back(e);
    }

    /// Set the ledger height.
    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    /// Advance the ledger.
    pub fn advance(&self, n: u64) {
        self.height.fetch_add(n, Ordering::Relaxed);
    }

    /// Mark a transaction as validated for later polls.
    pub fn mark_validated(&self, tx_ref: &TxRef) {
        self.validated.lock().insert(tx_ref.clone());
    }

    /// Every `valid_until` stamped through `prepare`, in order.
    pub fn stamped_bounds(&self) -> Vec<u64> {
        self.stamped.lock().clone()
    }

    /// Every transaction handed to the ledger, in order.
    pub fn submissions(&self) -> Vec<TxRef> {
        self.submitted.lock().clone()
    }

    /// Every transaction polled, in order.
    pub fn polls(&self) -> Vec<TxRef> {
        self.polled.lock().clone()
    }

    fn next_tx_ref(&self) -> TxRef {
        let n = self.tx_counter.fetch_add(1, Ordering::Relaxed) + 1;
        TxRef::new(format!("MOCKTX{:058X}", n))
    }
}

#[async_trait]
impl LedgerGateway for MockGateway {
    fn id(&self) -> &str {
        &self.id
    }

    async fn ledger_height(&self) -> GatewayResult<u64> {
        if let Some(e) = self.height_errors.lock().pop_front() {
            return Err(e);
        }
        Ok(self.height.load(Ordering::Relaxed))
    }

    async fn prepare(&self, draft: &LedgerDraft, valid_until: u64) -> GatewayResult<PreparedTx> {
        self.stamped.lock().push(valid_until);
        Ok(PreparedTx {
            draft: draft.clone(),
            valid_until,
            body: json!({
                "TransactionType": "AccountSet",
                "LastLedgerSequence": valid_until,
                "Memos": [{
                    "Memo": {
                        "MemoType": MEMO_TYPE,
                        "MemoFormat": MEMO_FORMAT,
                        "MemoData": draft.memo_data(),
                    }
                }],
            }),
        })
    }

    async fn sign_and_submit(&self, _prepared: PreparedTx) -> GatewayResult<Submission> {
        let behavior = self
            .behaviors
            .lock()
            .pop_front()
            .unwrap_or(MockBehavior::Validate);

        if let MockBehavior::SubmitError(e) = &behavior {
            return Err(e.clone());
        }

        let tx_ref = self.next_tx_ref();
        self.submitted.lock().push(tx_ref.clone());
        self.height.fetch_add(
            self.advance_per_submit.load(Ordering::Relaxed),
            Ordering::Relaxed,
        );

        let outcome: BoxFuture<'static, GatewayResult<()>> = match behavior {
            MockBehavior::Validate => {
                self.mark_validated(&tx_ref);
                futures::future::ready(Ok(())).boxed()
            }
            MockBehavior::ValidateAfter(delay) => {
                self.mark_validated(&tx_ref);
                async move {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                .boxed()
            }
            MockBehavior::NeverResolve => futures::future::pending().boxed(),
            MockBehavior::Transient(r) => {
                futures::future::ready(Err(GatewayError::Transient(r))).boxed()
            }
            MockBehavior::Reject(r) => {
                futures::future::ready(Err(GatewayError::Rejected(r))).boxed()
            }
            MockBehavior::OutcomeTimeout(r) => {
                futures::future::ready(Err(GatewayError::Timeout(r))).boxed()
            }
            MockBehavior::SubmitError(e) => futures::future::ready(Err(e)).boxed(),
        };

        Ok(Submission { tx_ref, outcome })
    }

    async fn poll_status(&self, tx_ref: &TxRef) -> GatewayResult<TxStatus> {
        self.polled.lock().push(tx_ref.clone());
        if let Some(answer) = self.poll_answers.lock().pop_front() {
            return answer;
        }
        if self.validated.lock().contains(tx_ref) {
            Ok(TxStatus::validated().with_result("tesSUCCESS"))
        } else {
            Ok(TxStatus::not_validated())
        }
    }
}
