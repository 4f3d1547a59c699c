//! Event log backed by a PostgREST (Supabase) table.
//!
//! Rows use the column layout of the hosted trace-event table:
//! `item_id, event_type, payload_hash, payload_json, tx_hash, metadata_url,
//! created_at`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};
use url::Url;

use tracemark_core::{AnchorEvent, Digest, Error, EventType, Result, TxRef};

use crate::traits::EventLog;

/// Default table name.
pub const DEFAULT_TABLE: &str = "trace_events";

/// Configuration for [`PostgrestEventLog`].
#[derive(Clone, Serialize, Deserialize)]
pub struct PostgrestConfig {
    /// Project base URL (the REST API lives under `/rest/v1`).
    pub url: String,
    /// Service key, sent as both `apikey` and bearer token.
    pub api_key: String,
    /// Table holding the events.
    #[serde(default = "default_table")]
    pub table: String,
    /// Per-request timeout.
    #[serde(
        default = "default_request_timeout",
        with = "duration_ms",
        rename = "request_timeout_ms"
    )]
    pub request_timeout: Duration,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(15)
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl std::fmt::Debug for PostgrestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgrestConfig")
            .field("url", &self.url)
            .field("api_key", &"<redacted>")
            .field("table", &self.table)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

impl PostgrestConfig {
    /// Create a configuration with the default table and timeout.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            table: default_table(),
            request_timeout: default_request_timeout(),
        }
    }

    /// Set the table name.
    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

    /// Set the request timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.url)
            .map_err(|e| Error::invalid_config(format!("invalid PostgREST URL: {}", e)))?;
        if self.api_key.is_empty() {
            return Err(Error::invalid_config("PostgREST API key is empty"));
        }
        if self.table.is_empty() {
            return Err(Error::invalid_config("PostgREST table is empty"));
        }
        Ok(())
    }

    fn table_url(&self) -> Result<Url> {
        let base = self.url.trim_end_matches('/');
        Url::parse(&format!("{}/rest/v1/{}", base, self.table))
            .map_err(|e| Error::invalid_config(format!("invalid PostgREST URL: {}", e)))
    }
}

/// One row of the event table.
#[derive(Debug, Serialize, Deserialize)]
struct EventRow {
    item_id: String,
    event_type: EventType,
    payload_hash: Digest,
    #[serde(default)]
    payload_json: Value,
    #[serde(default)]
    tx_hash: Option<TxRef>,
    #[serde(default)]
    metadata_url: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<&AnchorEvent> for EventRow {
    fn from(event: &AnchorEvent) -> Self {
        Self {
            item_id: event.subject_id.clone(),
            event_type: event.event_type.clone(),
            payload_hash: event.payload_hash,
            payload_json: event.payload.clone(),
            tx_hash: event.ledger_tx_ref.clone(),
            metadata_url: event.metadata_url().map(str::to_string),
            created_at: event.created_at,
        }
    }
}

impl From<EventRow> for AnchorEvent {
    fn from(row: EventRow) -> Self {
        Self {
            subject_id: row.item_id,
            event_type: row.event_type,
            payload_hash: row.payload_hash,
            payload: row.payload_json,
            ledger_tx_ref: row.tx_hash,
            created_at: row.created_at,
        }
    }
}

/// Event log over the PostgREST HTTP API.
#[derive(Debug, Clone)]
pub struct PostgrestEventLog {
    client: Client,
    config: PostgrestConfig,
    table_url: Url,
}

impl PostgrestEventLog {
    /// Create a client for the configured table.
    pub fn new(config: PostgrestConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| Error::connection(format!("failed to build HTTP client: {}", e)))?;
        let table_url = config.table_url()?;
        Ok(Self {
            client,
            config,
            table_url,
        })
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        req.header("apikey", &self.config.api_key)
            .bearer_auth(&self.config.api_key)
    }

    async fn check(resp: reqwest::Response) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        warn!(%status, "PostgREST request failed");
        Err(match status {
            StatusCode::NOT_FOUND => Error::not_found(format!("table: {}", body)),
            _ => Error::protocol(format!("HTTP {}: {}", status, body)),
        })
    }
}

fn map_http_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(e.to_string())
    } else {
        Error::connection(e.to_string())
    }
}

#[async_trait]
impl EventLog for PostgrestEventLog {
    async fn append(&self, event: &AnchorEvent) -> Result<()> {
        let row = EventRow::from(event);
        let req = self
            .client
            .post(self.table_url.clone())
            .header("Prefer", "return=minimal")
            .json(&row);
        let resp = self.authorize(req).send().await.map_err(map_http_error)?;
        Self::check(resp).await?;
        debug!(subject = %event.subject_id, "Appended anchor event to PostgREST");
        Ok(())
    }

    async fn query(&self, subject_id: &str, limit: usize) -> Result<Vec<AnchorEvent>> {
        let mut url = self.table_url.clone();
        url.query_pairs_mut()
            .append_pair(
                "select",
                "created_at,item_id,event_type,payload_hash,payload_json,metadata_url,tx_hash",
            )
            .append_pair("item_id", &format!("eq.{}", subject_id))
            .append_pair("order", "created_at.desc")
            .append_pair("limit", &limit.to_string());

        let resp = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(map_http_error)?;
        let rows: Vec<EventRow> = Self::check(resp)
            .await?
            .json()
            .await
            .map_err(|e| Error::protocol(format!("invalid event rows: {}", e)))?;
        Ok(rows.into_iter().map(AnchorEvent::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn log_for(server: &MockServer) -> PostgrestEventLog {
        PostgrestEventLog::new(PostgrestConfig::new(server.uri(), "service-key")).unwrap()
    }

    #[test]
    fn test_config_validate() {
        assert!(PostgrestConfig::new("https://x.supabase.co", "k").validate().is_ok());
        assert!(PostgrestConfig::new("not a url", "k").validate().is_err());
        assert!(PostgrestConfig::new("https://x.supabase.co", "").validate().is_err());
        assert!(PostgrestConfig::new("https://x.supabase.co", "k")
            .with_table("")
            .validate()
            .is_err());
    }

    #[test]
    fn test_config_debug_redacts_key() {
        let cfg = PostgrestConfig::new("https://x.supabase.co", "super-secret");
        assert!(!format!("{:?}", cfg).contains("super-secret"));
    }

    #[tokio::test]
    async fn test_append_posts_row() {
        let server = MockServer::start().await;
        let digest = tracemark_core::sha256(b"m");
        let event = AnchorEvent::new(
            "xwing1",
            EventType::MetadataUpdated,
            tracemark_core::metadata_payload(&digest, Some("https://cdn.test/xwing1.json")),
            Some(TxRef::new("ABCDEF")),
        );

        Mock::given(method("POST"))
            .and(path("/rest/v1/trace_events"))
            .and(header("apikey", "service-key"))
            .and(header("authorization", "Bearer service-key"))
            .and(body_partial_json(json!({
                "item_id": "xwing1",
                "event_type": "METADATA_UPDATED",
                "payload_hash": event.payload_hash.to_hex(),
                "tx_hash": "ABCDEF",
                "metadata_url": "https://cdn.test/xwing1.json",
            })))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        log_for(&server).append(&event).await.unwrap();
    }

    #[tokio::test]
    async fn test_query_parses_rows() {
        let server = MockServer::start().await;
        let payload = json!({"metadata_hash": "ab"});
        let hash = tracemark_core::digest_value(&payload).to_hex();

        Mock::given(method("GET"))
            .and(path("/rest/v1/trace_events"))
            .and(query_param("item_id", "eq.xwing1"))
            .and(query_param("order", "created_at.desc"))
            .and(query_param("limit", "50"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {
                    "id": 7,
                    "created_at": "2025-03-01T12:00:00.5+00:00",
                    "item_id": "xwing1",
                    "event_type": "METADATA_UPDATED",
                    "payload_hash": hash,
                    "payload_json": payload,
                    "metadata_url": null,
                    "tx_hash": "T2"
                },
                {
                    "id": 3,
                    "created_at": "2025-02-01T12:00:00+00:00",
                    "item_id": "xwing1",
                    "event_type": "SHIPPED",
                    "payload_hash": hash,
                    "payload_json": null,
                    "metadata_url": null,
                    "tx_hash": null
                }
            ])))
            .mount(&server)
            .await;

        let events = log_for(&server).query("xwing1", 50).await.unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::MetadataUpdated);
        assert_eq!(events[0].ledger_tx_ref, Some(TxRef::new("T2")));
        assert_eq!(events[0].metadata_hash(), Some("ab"));
        assert_eq!(events[1].event_type, EventType::Custom("SHIPPED".into()));
        assert!(events[1].ledger_tx_ref.is_none());
        assert!(events[0].created_at > events[1].created_at);
    }

    #[tokio::test]
    async fn test_http_error_surfaces() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = log_for(&server).query("xwing1", 10).await.unwrap_err();
        assert_eq!(err.code(), tracemark_core::ErrorCode::ProtocolError);
        assert!(err.to_string().contains("boom"));
    }
}
