//! XRPL implementation of [`LedgerGateway`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use tracemark_anchor::{
    GatewayError, GatewayResult, LedgerDraft, LedgerGateway, PreparedTx, Submission, TxStatus,
    MEMO_FORMAT, MEMO_TYPE,
};
use tracemark_core::TxRef;

use crate::config::XrplConfig;
use crate::error::{classify_engine_result, EngineClass, Result, XrplError};
use crate::rpc::RpcClient;
use crate::ANCHOR_AMOUNT_DROPS;

/// XRP Ledger anchor gateway.
///
/// Anchors ride in the memo of an `AccountSet`, or of a 1-drop `Payment`
/// when a destination is configured. Signing is delegated to the node's
/// `sign` method.
pub struct XrplGateway {
    id: String,
    config: XrplConfig,
    rpc: Arc<RpcClient>,
}

impl XrplGateway {
    /// Create a new gateway.
    pub fn new(config: XrplConfig) -> Result<Self> {
        config.validate()?;
        let rpc = Arc::new(RpcClient::new(&config)?);
        Ok(Self {
            id: config.provider_id.clone(),
            config,
            rpc,
        })
    }

    /// Create and check that the node answers.
    pub async fn connect(config: XrplConfig) -> Result<Self> {
        let gateway = Self::new(config)?;
        let height = gateway.rpc.ledger_current().await?;
        info!(gateway = %gateway.id, height, "Connected to XRPL node");
        Ok(gateway)
    }

    /// Get the configuration.
    pub fn config(&self) -> &XrplConfig {
        &self.config
    }

    /// Transaction JSON for `draft`, without sequence and fee.
    fn build_tx(&self, draft: &LedgerDraft, valid_until: u64) -> Value {
        let mut tx = json!({
            "TransactionType": "AccountSet",
            "Account": self.config.account,
            "LastLedgerSequence": valid_until,
            "Memos": [{
                "Memo": {
                    "MemoType": hex::encode_upper(MEMO_TYPE),
                    "MemoFormat": hex::encode_upper(MEMO_FORMAT),
                    "MemoData": hex::encode_upper(draft.memo_data()),
                }
            }],
        });
        if let Some(dest) = &self.config.destination {
            tx["TransactionType"] = json!("Payment");
            tx["Destination"] = json!(dest);
            tx["Amount"] = json!(ANCHOR_AMOUNT_DROPS);
        }
        tx
    }

    async fn fee(&self) -> Result<u64> {
        match self.config.fee_drops {
            Some(drops) => Ok(drops),
            None => self.rpc.open_ledger_fee().await,
        }
    }
}

/// Poll `hash` until it validates or `valid_until` passes.
async fn await_validation(
    rpc: Arc<RpcClient>,
    hash: String,
    valid_until: u64,
    interval: Duration,
) -> GatewayResult<()> {
    loop {
        tokio::time::sleep(interval).await;

        match rpc.tx(&hash).await {
            Ok(lookup) if lookup.validated => {
                return match lookup.result.as_deref() {
                    Some("tesSUCCESS") => Ok(()),
                    Some(code) => Err(GatewayError::Rejected(code.to_string())),
                    None => Err(GatewayError::Rejected("validated without result".into())),
                };
            }
            Ok(_) => {}
            Err(e) => debug!(tx = %hash, error = %e, "Status poll failed"),
        }

        match rpc.ledger_current().await {
            Ok(height) if height > valid_until => {
                return Err(GatewayError::Transient(format!(
                    "expired: ledger {} passed LastLedgerSequence {}",
                    height, valid_until
                )));
            }
            Ok(_) => {}
            Err(e) => debug!(error = %e, "Ledger height poll failed"),
        }
    }
}

#[async_trait]
impl LedgerGateway for XrplGateway {
    fn id(&self) -> &str {
        &self.id
    }

    async fn ledger_height(&self) -> GatewayResult<u64> {
        Ok(self.rpc.ledger_current().await?)
    }

    async fn prepare(&self, draft: &LedgerDraft, valid_until: u64) -> GatewayResult<PreparedTx> {
        let sequence = self.rpc.account_sequence(&self.config.account).await?;
        let fee = self.fee().await?;

        let mut body = self.build_tx(draft, valid_until);
        body["Sequence"] = json!(sequence);
        body["Fee"] = json!(fee.to_string());

        debug!(
            subject = %draft.subject_id,
            sequence,
            fee,
            valid_until,
            "Prepared XRPL transaction"
        );
        Ok(PreparedTx {
            draft: draft.clone(),
            valid_until,
            body,
        })
    }

    async fn sign_and_submit(&self, prepared: PreparedTx) -> GatewayResult<Submission> {
        let signed = self.rpc.sign(&prepared.body, &self.config.secret).await?;
        let tx_ref = TxRef::new(signed.hash.clone());

        let waiter = await_validation(
            self.rpc.clone(),
            signed.hash.clone(),
            prepared.valid_until,
            self.config.poll_interval,
        );

        let outcome = match self.rpc.submit(&signed.tx_blob).await {
            Ok(result) => match classify_engine_result(&result.engine_result) {
                EngineClass::Success => {
                    debug!(tx = %tx_ref, code = %result.engine_result, "Submitted");
                    waiter.boxed()
                }
                // The node holds the transaction; resubmitting would reuse its sequence.
                EngineClass::Queued => {
                    info!(tx = %tx_ref, code = %result.engine_result, "Submission queued, polling");
                    waiter.boxed()
                }
                _ => {
                    warn!(
                        tx = %tx_ref,
                        code = %result.engine_result,
                        message = %result.message,
                        "Submission not accepted"
                    );
                    let err = GatewayError::from(XrplError::Engine {
                        code: result.engine_result,
                        message: result.message,
                    });
                    futures::future::ready(Err(err)).boxed()
                }
            },
            // The hash is known from signing; the transaction may be in flight.
            Err(e) if e.is_ambiguous() => {
                warn!(tx = %tx_ref, error = %e, "Submit outcome unknown, polling");
                waiter.boxed()
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Submission { tx_ref, outcome })
    }

    async fn poll_status(&self, tx_ref: &TxRef) -> GatewayResult<TxStatus> {
        let lookup = self.rpc.tx(tx_ref.as_str()).await?;
        // A validated failure carries no anchor.
        let success = lookup.result.as_deref() == Some("tesSUCCESS");
        let status = if lookup.validated && success {
            TxStatus::validated()
        } else {
            TxStatus::not_validated()
        };
        Ok(match lookup.result {
            Some(code) => status.with_result(code),
            None => status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracemark_core::{digest_value, EventType};
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ACCOUNT: &str = "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe";
    const DEST: &str = "rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh";
    const HASH: &str = "E08D6E9754025BA2534A78707605E0601F03ACE063687A0CA1BDDACFCD1698C7";

    fn config(server: &MockServer) -> XrplConfig {
        XrplConfig::new(server.uri(), ACCOUNT, "sEdSECRET")
            .with_poll_interval(Duration::from_millis(10))
    }

    fn draft() -> LedgerDraft {
        LedgerDraft::new(
            "xwing1",
            EventType::MetadataCreated,
            digest_value(&json!({"a": 1})),
        )
    }

    async fn respond(server: &MockServer, rpc: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
            .mount(server)
            .await;
    }

    async fn mount_sign(server: &MockServer) {
        respond(
            server,
            "sign",
            json!({"status": "success", "tx_blob": "1200", "tx_json": {"hash": HASH}}),
        )
        .await;
    }

    #[test]
    fn test_build_tx_account_set_memo() {
        let gw = XrplGateway::new(XrplConfig::new("http://localhost:5005", ACCOUNT, "s")).unwrap();
        let tx = gw.build_tx(&draft(), 4242);

        assert_eq!(tx["TransactionType"], "AccountSet");
        assert_eq!(tx["LastLedgerSequence"], 4242);
        assert!(tx.get("Destination").is_none());

        let memo = &tx["Memos"][0]["Memo"];
        assert_eq!(memo["MemoType"], "74726163655F6576656E74");
        assert_eq!(memo["MemoFormat"], hex::encode_upper("application/json"));
        let data = hex::decode(memo["MemoData"].as_str().unwrap()).unwrap();
        assert_eq!(String::from_utf8(data).unwrap(), draft().memo_data());
    }

    #[test]
    fn test_build_tx_payment_with_destination() {
        let gw = XrplGateway::new(
            XrplConfig::new("http://localhost:5005", ACCOUNT, "s").with_destination(DEST),
        )
        .unwrap();
        let tx = gw.build_tx(&draft(), 1);
        assert_eq!(tx["TransactionType"], "Payment");
        assert_eq!(tx["Destination"], DEST);
        assert_eq!(tx["Amount"], "1");
    }

    #[tokio::test]
    async fn test_prepare_fills_sequence_and_fee() {
        let server = MockServer::start().await;
        respond(
            &server,
            "account_info",
            json!({"status": "success", "account_data": {"Sequence": 17}}),
        )
        .await;
        respond(
            &server,
            "fee",
            json!({"status": "success", "drops": {"open_ledger_fee": "12"}}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = gw.prepare(&draft(), 900).await.unwrap();
        assert_eq!(prepared.valid_until, 900);
        assert_eq!(prepared.body["Sequence"], 17);
        assert_eq!(prepared.body["Fee"], "12");
        assert_eq!(prepared.body["LastLedgerSequence"], 900);
    }

    #[tokio::test]
    async fn test_fixed_fee_skips_fee_rpc() {
        let server = MockServer::start().await;
        respond(
            &server,
            "account_info",
            json!({"status": "success", "account_data": {"Sequence": 1}}),
        )
        .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"method": "fee"})))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let gw = XrplGateway::new(config(&server).with_fee_drops(15)).unwrap();
        let prepared = gw.prepare(&draft(), 10).await.unwrap();
        assert_eq!(prepared.body["Fee"], "15");
    }

    #[tokio::test]
    async fn test_submit_and_validate() {
        let server = MockServer::start().await;
        mount_sign(&server).await;
        respond(
            &server,
            "submit",
            json!({"status": "success", "engine_result": "tesSUCCESS"}),
        )
        .await;
        respond(
            &server,
            "tx",
            json!({"status": "success", "validated": true, "meta": {"TransactionResult": "tesSUCCESS"}}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = PreparedTx {
            draft: draft(),
            valid_until: 100,
            body: gw.build_tx(&draft(), 100),
        };
        let sub = gw.sign_and_submit(prepared).await.unwrap();
        assert_eq!(sub.tx_ref.as_str(), HASH);
        assert_eq!(sub.outcome.await, Ok(()));

        let status = gw.poll_status(&TxRef::new(HASH)).await.unwrap();
        assert!(status.validated);
        assert_eq!(status.result.as_deref(), Some("tesSUCCESS"));
    }

    #[tokio::test]
    async fn test_submit_engine_rejection() {
        let server = MockServer::start().await;
        mount_sign(&server).await;
        respond(
            &server,
            "submit",
            json!({"status": "success", "engine_result": "tefPAST_SEQ"}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = PreparedTx {
            draft: draft(),
            valid_until: 100,
            body: gw.build_tx(&draft(), 100),
        };
        let sub = gw.sign_and_submit(prepared).await.unwrap();
        assert_eq!(
            sub.outcome.await,
            Err(GatewayError::Transient("tefPAST_SEQ".into()))
        );
    }

    #[tokio::test]
    async fn test_queued_submission_awaits_validation() {
        let server = MockServer::start().await;
        mount_sign(&server).await;
        respond(
            &server,
            "submit",
            json!({"status": "success", "engine_result": "terQUEUED"}),
        )
        .await;
        respond(
            &server,
            "tx",
            json!({"status": "success", "validated": true, "meta": {"TransactionResult": "tesSUCCESS"}}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = PreparedTx {
            draft: draft(),
            valid_until: 100,
            body: gw.build_tx(&draft(), 100),
        };
        let sub = gw.sign_and_submit(prepared).await.unwrap();
        assert_eq!(sub.tx_ref.as_str(), HASH);
        assert_eq!(sub.outcome.await, Ok(()));
    }

    #[tokio::test]
    async fn test_awaitable_expires() {
        let server = MockServer::start().await;
        mount_sign(&server).await;
        respond(
            &server,
            "submit",
            json!({"status": "success", "engine_result": "tesSUCCESS"}),
        )
        .await;
        respond(&server, "tx", json!({"status": "error", "error": "txnNotFound"})).await;
        respond(
            &server,
            "ledger_current",
            json!({"status": "success", "ledger_current_index": 101}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = PreparedTx {
            draft: draft(),
            valid_until: 100,
            body: gw.build_tx(&draft(), 100),
        };
        let sub = gw.sign_and_submit(prepared).await.unwrap();
        assert!(sub.outcome.await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_validated_failure_is_not_an_anchor() {
        let server = MockServer::start().await;
        respond(
            &server,
            "tx",
            json!({"status": "success", "validated": true, "meta": {"TransactionResult": "tecNO_DST_INSUF_XRP"}}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let status = gw.poll_status(&TxRef::new(HASH)).await.unwrap();
        assert!(!status.validated);
        assert_eq!(status.result.as_deref(), Some("tecNO_DST_INSUF_XRP"));
    }

    #[tokio::test]
    async fn test_sign_failure_is_not_submitted() {
        let server = MockServer::start().await;
        respond(
            &server,
            "sign",
            json!({"status": "error", "error": "badSecret", "error_message": "Secret does not match account."}),
        )
        .await;

        let gw = XrplGateway::new(config(&server)).unwrap();
        let prepared = PreparedTx {
            draft: draft(),
            valid_until: 100,
            body: gw.build_tx(&draft(), 100),
        };
        let err = gw.sign_and_submit(prepared).await.unwrap_err();
        assert!(matches!(err, GatewayError::Rejected(_)));
    }
}
