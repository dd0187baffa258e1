//! # 📡 THE ELASTICSEARCH BACKEND
//!
//! 🎬 COLD OPEN - INT. SERVER ROOM - 3:47 AM
//!
//! A table changed. A stream noticed. A batch was assembled with love, and now it
//! stands at the door of `_bulk`, NDJSON in hand, hoping the cluster is in a good mood.
//!
//! This module is the door. It POSTs the body, attaches whatever auth you configured,
//! gzips it if you asked nicely, and hands back whatever JSON the cluster replied with.
//! It does not retry. It does not reinterpret `errors: true`. It reports. 🦆

use std::io::Write;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::backends::{BulkClient, BulkRequest};

/// 🔧 Where the cluster lives and how to talk to it.
#[derive(Debug, Deserialize, Clone)]
pub struct ElasticsearchConfig {
    /// 📡 Cluster base URL, e.g. `http://localhost:9200`. A trailing slash is forgiven.
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// 🔒 Wins over basic auth when both are set.
    #[serde(default)]
    pub api_key: Option<String>,
    /// 🫁 gzip the request body.
    #[serde(default)]
    pub compress: bool,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl ElasticsearchConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: None,
            password: None,
            api_key: None,
            compress: false,
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// 📡 A `BulkClient` that speaks HTTP to a real cluster.
///
/// Holds one `reqwest::Client`, reused across calls so connections pool.
#[derive(Debug, Clone)]
pub struct ElasticsearchBulkClient {
    client: reqwest::Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchBulkClient {
    /// 🚀 Build the HTTP client. No network traffic happens here.
    pub fn new(config: ElasticsearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably a missing TLS cert or a cursed system OpenSSL. Either way: tragic.")?;
        Ok(Self { client, config })
    }

    fn bulk_url(&self, request: &BulkRequest<'_>) -> Result<reqwest::Url> {
        let raw = format!("{}/_bulk", self.config.url.trim_end_matches('/'));
        let mut url = reqwest::Url::parse(&raw)
            .with_context(|| format!("💀 '{raw}' is not a URL. It is a cry for help with a colon in it."))?;
        // -- an empty query_pairs_mut() still leaves a dangling '?', so only touch it when needed
        if !request.params.is_empty() {
            url.query_pairs_mut().extend_pairs(request.params.iter());
        }
        Ok(url)
    }

    fn encode_body(&self, payload: String) -> Result<Vec<u8>> {
        if !self.config.compress {
            return Ok(payload.into_bytes());
        }
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder
            .write_all(payload.as_bytes())
            .context("💀 gzip choked on the payload. The bytes were too spicy.")?;
        encoder
            .finish()
            .context("💀 gzip could not finish. It started strong, like most of my side projects.")
    }
}

#[async_trait]
impl BulkClient for ElasticsearchBulkClient {
    /// 📡 POST the NDJSON body to `/_bulk` and return the parsed reply.
    async fn bulk(&self, request: BulkRequest<'_>) -> Result<Value> {
        let url = self.bulk_url(&request)?;
        let payload = request.to_ndjson()?;
        debug!(
            url = %url,
            bytes = payload.len(),
            entries = request.body.len(),
            compressed = self.config.compress,
            "📡 Sending bulk request, the payload has left the building"
        );

        let mut builder = self
            .client
            .post(url)
            // ⚠️ x-ndjson, not json. The bulk API is particular about this.
            .header("Content-Type", "application/x-ndjson");
        if self.config.compress {
            builder = builder.header("Content-Encoding", "gzip");
        }
        // -- 🔒 api_key beats basic auth in this club
        if let Some(ref api_key) = self.config.api_key {
            builder = builder.header("Authorization", format!("ApiKey {api_key}"));
        } else if let Some(ref username) = self.config.username {
            builder = builder.basic_auth(username, self.config.password.as_ref());
        }

        let response = builder
            .body(self.encode_body(payload)?)
            .send()
            .await
            .context("💀 The bulk request never made it to Elasticsearch. Check connectivity, check timeouts, and check your feelings.")?;

        let status = response.status();
        let body = response
            .text()
            .await
            .context("💀 Elasticsearch answered, but the reply body got lost on the way back")?;
        if !status.is_success() {
            anyhow::bail!(
                "💀 The bulk request arrived, but Elasticsearch said '{}'. The body of the response read: '{}'",
                status,
                body
            );
        }

        trace!(%status, "🚀 Bulk request landed");
        serde_json::from_str(&body).with_context(|| {
            format!("💀 Elasticsearch replied {status} with something that isn't JSON: '{body}'")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDescriptor, BulkAction, BulkEntry};
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::io::Read;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn body() -> Vec<BulkEntry> {
        vec![BulkEntry::Action(BulkAction::Delete(ActionDescriptor {
            index: "things".to_string(),
            doc_type: None,
            id: "a".to_string(),
            parent: None,
            version: None,
            version_type: None,
        }))]
    }

    const EXPECTED_NDJSON: &str = "{\"delete\":{\"_index\":\"things\",\"_id\":\"a\"}}\n";

    fn reply() -> Value {
        json!({"took": 3, "errors": false, "items": [{"delete": {"_index": "things", "_id": "a", "status": 200}}]})
    }

    #[tokio::test]
    async fn the_one_where_the_bulk_call_lands_with_params_and_api_key() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(query_param("refresh", "wait_for"))
            .and(query_param("pipeline", "enrich"))
            .and(header("content-type", "application/x-ndjson"))
            .and(header("authorization", "ApiKey s3cr3t"))
            .and(body_string(EXPECTED_NDJSON))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchBulkClient::new(ElasticsearchConfig {
            api_key: Some("s3cr3t".to_string()),
            username: Some("ignored".to_string()),
            ..ElasticsearchConfig::new(format!("{}/", server.uri()))
        })?;
        let params = BTreeMap::from([
            ("refresh".to_string(), "wait_for".to_string()),
            ("pipeline".to_string(), "enrich".to_string()),
        ]);
        let body = body();
        let result = client.bulk(BulkRequest { params: &params, body: &body }).await?;
        assert_eq!(result, reply());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_basic_auth_shows_up_when_there_is_no_api_key() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            // 🔒 base64("user:pass")
            .and(header("authorization", "Basic dXNlcjpwYXNz"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchBulkClient::new(ElasticsearchConfig {
            username: Some("user".to_string()),
            password: Some("pass".to_string()),
            ..ElasticsearchConfig::new(server.uri())
        })?;
        let params = BTreeMap::new();
        let body = body();
        client.bulk(BulkRequest { params: &params, body: &body }).await?;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_429_comes_back_as_an_error_with_receipts() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down, cowboy"))
            .mount(&server)
            .await;

        let client = ElasticsearchBulkClient::new(ElasticsearchConfig::new(server.uri()))?;
        let params = BTreeMap::new();
        let body = body();
        let err = client
            .bulk(BulkRequest { params: &params, body: &body })
            .await
            .expect_err("💀 a 429 should not count as success");
        let message = err.to_string();
        assert!(message.contains("429"), "status missing from: {message}");
        assert!(message.contains("slow down, cowboy"), "body missing from: {message}");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_payload_travels_gzipped() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .and(header("content-encoding", "gzip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(reply()))
            .expect(1)
            .mount(&server)
            .await;

        let client = ElasticsearchBulkClient::new(ElasticsearchConfig {
            compress: true,
            ..ElasticsearchConfig::new(server.uri())
        })?;
        let params = BTreeMap::new();
        let body = body();
        client.bulk(BulkRequest { params: &params, body: &body }).await?;

        let received = server
            .received_requests()
            .await
            .ok_or_else(|| anyhow::anyhow!("request recording should be on"))?;
        assert_eq!(received.len(), 1);
        let mut decoded = String::new();
        GzDecoder::new(received[0].body.as_slice()).read_to_string(&mut decoded)?;
        assert_eq!(decoded, EXPECTED_NDJSON);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_success_that_isnt_json_is_still_a_failure() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/_bulk"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy says hi</html>"))
            .mount(&server)
            .await;

        let client = ElasticsearchBulkClient::new(ElasticsearchConfig::new(server.uri()))?;
        let params = BTreeMap::new();
        let body = body();
        let err = client
            .bulk(BulkRequest { params: &params, body: &body })
            .await
            .expect_err("💀 html is not a bulk response");
        assert!(err.to_string().contains("isn't JSON"));
        Ok(())
    }
}
