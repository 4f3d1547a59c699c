//! Minimal rippled JSON-RPC client.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::trace;
use url::Url;

use crate::config::XrplConfig;
use crate::error::{Result, XrplError};

/// Status of a transaction as reported by the `tx` method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxLookup {
    /// Whether the transaction is in a validated ledger.
    pub validated: bool,
    /// `meta.TransactionResult`, once known.
    pub result: Option<String>,
}

impl TxLookup {
    fn not_found() -> Self {
        Self {
            validated: false,
            result: None,
        }
    }
}

/// A signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signed {
    /// Hex-encoded signed blob.
    pub tx_blob: String,
    /// Transaction hash.
    pub hash: String,
}

/// Preliminary result of a `submit` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitResult {
    /// Engine result code.
    pub engine_result: String,
    /// Human-readable message.
    pub message: String,
}

#[derive(Deserialize)]
struct Envelope {
    result: Value,
}

/// JSON-RPC client for a single rippled endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: Url,
}

impl RpcClient {
    /// Create a client from gateway configuration.
    pub fn new(config: &XrplConfig) -> Result<Self> {
        let url = Url::parse(&config.rpc_url)
            .map_err(|e| XrplError::Config(format!("invalid RPC URL: {}", e)))?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| XrplError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, url })
    }

    /// Call `method` with a single params object and return its `result`.
    ///
    /// RPC-level errors (`"status": "error"`) are returned as
    /// [`XrplError::Rpc`].
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        trace!(method, "XRPL RPC call");
        let resp = self
            .client
            .post(self.url.clone())
            .json(&json!({ "method": method, "params": [params] }))
            .send()
            .await
            .map_err(XrplError::from_http)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(XrplError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope = resp
            .json()
            .await
            .map_err(|e| XrplError::InvalidResponse(format!("{}: {}", method, e)))?;
        let result = envelope.result;

        if result.get("status").and_then(Value::as_str) == Some("error") {
            let error = str_field(&result, "error").unwrap_or("unknown").to_string();
            let message = str_field(&result, "error_message")
                .or_else(|| str_field(&result, "error_exception"))
                .unwrap_or_default()
                .to_string();
            return Err(XrplError::Rpc { error, message });
        }

        Ok(result)
    }

    /// Index of the current open ledger.
    pub async fn ledger_current(&self) -> Result<u64> {
        let result = self.call("ledger_current", json!({})).await?;
        u64_field(&result, "ledger_current_index", "ledger_current")
    }

    /// Next sequence number of `account` in the current ledger.
    pub async fn account_sequence(&self, account: &str) -> Result<u32> {
        let result = self
            .call(
                "account_info",
                json!({ "account": account, "ledger_index": "current" }),
            )
            .await?;
        let seq = result
            .pointer("/account_data/Sequence")
            .and_then(Value::as_u64)
            .ok_or_else(|| XrplError::InvalidResponse("account_info: missing Sequence".into()))?;
        u32::try_from(seq)
            .map_err(|_| XrplError::InvalidResponse(format!("account_info: bad Sequence {}", seq)))
    }

    /// Open-ledger fee in drops.
    pub async fn open_ledger_fee(&self) -> Result<u64> {
        let result = self.call("fee", json!({})).await?;
        result
            .pointer("/drops/open_ledger_fee")
            .and_then(Value::as_str)
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| XrplError::InvalidResponse("fee: missing open_ledger_fee".into()))
    }

    /// Sign `tx_json` with `secret` on the node.
    pub async fn sign(&self, tx_json: &Value, secret: &str) -> Result<Signed> {
        let result = self
            .call("sign", json!({ "tx_json": tx_json, "secret": secret }))
            .await?;
        let tx_blob = str_field(&result, "tx_blob")
            .ok_or_else(|| XrplError::InvalidResponse("sign: missing tx_blob".into()))?
            .to_string();
        let hash = result
            .pointer("/tx_json/hash")
            .and_then(Value::as_str)
            .ok_or_else(|| XrplError::InvalidResponse("sign: missing hash".into()))?
            .to_string();
        Ok(Signed { tx_blob, hash })
    }

    /// Submit a signed blob.
    pub async fn submit(&self, tx_blob: &str) -> Result<SubmitResult> {
        let result = self.call("submit", json!({ "tx_blob": tx_blob })).await?;
        let engine_result = str_field(&result, "engine_result")
            .ok_or_else(|| XrplError::InvalidResponse("submit: missing engine_result".into()))?
            .to_string();
        let message = str_field(&result, "engine_result_message")
            .unwrap_or_default()
            .to_string();
        Ok(SubmitResult {
            engine_result,
            message,
        })
    }

    /// Look up a transaction by hash. Unknown transactions are reported as
    /// not validated.
    pub async fn tx(&self, hash: &str) -> Result<TxLookup> {
        match self.call("tx", json!({ "transaction": hash })).await {
            Ok(result) => Ok(TxLookup {
                validated: result
                    .get("validated")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                result: result
                    .pointer("/meta/TransactionResult")
                    .and_then(Value::as_str)
                    .map(str::to_string),
            }),
            Err(XrplError::Rpc { error, .. }) if error == "txnNotFound" => Ok(TxLookup::not_found()),
            Err(e) => Err(e),
        }
    }
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key).and_then(Value::as_str)
}

fn u64_field(v: &Value, key: &str, method: &str) -> Result<u64> {
    v.get(key)
        .and_then(Value::as_u64)
        .ok_or_else(|| XrplError::InvalidResponse(format!("{}: missing {}", method, key)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> RpcClient {
        RpcClient::new(&XrplConfig::new(
            server.uri(),
            "rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe",
            "s",
        ))
        .unwrap()
    }

    async fn respond(server: &MockServer, rpc: &str, result: Value) {
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "method": rpc })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "result": result })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_ledger_current() {
        let server = MockServer::start().await;
        respond(
            &server,
            "ledger_current",
            json!({"ledger_current_index": 81234, "status": "success"}),
        )
        .await;
        assert_eq!(client(&server).ledger_current().await.unwrap(), 81234);
    }

    #[tokio::test]
    async fn test_rpc_error() {
        let server = MockServer::start().await;
        respond(
            &server,
            "account_info",
            json!({"status": "error", "error": "actNotFound", "error_message": "Account not found."}),
        )
        .await;
        match client(&server).account_sequence("rX").await.unwrap_err() {
            XrplError::Rpc { error, .. } => assert_eq!(error, "actNotFound"),
            e => panic!("unexpected error: {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_tx_not_found_is_not_validated() {
        let server = MockServer::start().await;
        respond(&server, "tx", json!({"status": "error", "error": "txnNotFound"})).await;
        let lookup = client(&server).tx("AB").await.unwrap();
        assert!(!lookup.validated);
        assert!(lookup.result.is_none());
    }

    #[tokio::test]
    async fn test_http_status_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;
        let err = client(&server).open_ledger_fee().await.unwrap_err();
        assert!(err.is_ambiguous());
        assert!(matches!(err, XrplError::HttpStatus { status: 503, .. }));
    }
}
