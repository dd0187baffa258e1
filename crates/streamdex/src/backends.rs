//! 🔌 Backends: where the bulk body finally leaves the building.
//!
//! 🚰 The pipeline builds the action list. A backend ships it. That's the whole deal.
//! Need to hit a real cluster? `ElasticsearchBulkClient`. Need to watch what *would*
//! have been sent, in a test or a dry run? `InMemoryBulkClient`.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls → `BulkBackend` enum, so config can pick one at runtime.
//! - Backends do I/O. They don't retry (the submission engine does), they don't
//!   build actions (the assembler does), they don't judge (nobody does, here).
//!
//! 🦆 The duck reviewed this module and approved it with one comment: "quack".

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::actions::BulkEntry;

pub mod elasticsearch;
pub mod in_mem;

pub use elasticsearch::{ElasticsearchBulkClient, ElasticsearchConfig};
pub use in_mem::{InMemoryBulkClient, InMemoryConfig, RecordedRequest};

/// 📨 One bulk call: the action list plus the caller's extra parameters.
#[derive(Debug, Clone, Copy)]
pub struct BulkRequest<'a> {
    /// 📡 `refresh`, `pipeline`, `timeout`, ... passed through untouched
    pub params: &'a BTreeMap<String, String>,
    pub body: &'a [BulkEntry],
}

impl BulkRequest<'_> {
    /// 📜 Render the body as NDJSON: one entry per line, trailing newline included.
    ///
    /// The bulk API rejects a body whose last line isn't terminated.
    pub fn to_ndjson(&self) -> Result<String> {
        let mut payload = String::new();
        for entry in self.body {
            let line = serde_json::to_string(entry)
                .context("💀 A bulk entry refused to become JSON. Serde has never refused before. We are concerned.")?;
            payload.push_str(&line);
            payload.push('\n');
        }
        Ok(payload)
    }
}

/// 📡 Something that can execute a bulk request and hand back the store's JSON reply.
///
/// # Contract
/// - One call, one request. No retries in here.
/// - A non-success reply is an `Err`, with enough detail to write the postmortem.
/// - A success reply comes back verbatim (`took`, `errors`, `items`, ...).
#[async_trait]
pub trait BulkClient: Send + Sync + std::fmt::Debug {
    async fn bulk(&self, request: BulkRequest<'_>) -> Result<Value>;
}

/// 🎛️ Which backend to build, as it appears in config:
/// `[backend.Elasticsearch]` or `[backend.InMemory]`.
#[derive(Debug, Deserialize, Clone)]
pub enum BackendConfig {
    Elasticsearch(ElasticsearchConfig),
    InMemory(InMemoryConfig),
}

/// 🎭 The many faces of a bulk client. The handler never needs to know which one it got.
#[derive(Debug, Clone)]
pub enum BulkBackend {
    Elasticsearch(ElasticsearchBulkClient),
    InMemory(InMemoryBulkClient),
}

impl BulkBackend {
    /// 🏗️ Build the backend the config asks for.
    pub fn from_config(config: &BackendConfig) -> Result<Self> {
        Ok(match config {
            BackendConfig::Elasticsearch(es) => BulkBackend::Elasticsearch(
                ElasticsearchBulkClient::new(es.clone())
                    .context("💀 Could not stand up the Elasticsearch bulk client")?,
            ),
            BackendConfig::InMemory(mem) => BulkBackend::InMemory(InMemoryBulkClient::new(mem.clone())),
        })
    }
}

#[async_trait]
impl BulkClient for BulkBackend {
    async fn bulk(&self, request: BulkRequest<'_>) -> Result<Value> {
        match self {
            BulkBackend::Elasticsearch(client) => client.bulk(request).await,
            BulkBackend::InMemory(client) => client.bulk(request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{ActionDescriptor, BulkAction};
    use serde_json::json;

    fn descriptor(id: &str) -> ActionDescriptor {
        ActionDescriptor {
            index: "things".to_string(),
            doc_type: None,
            id: id.to_string(),
            parent: None,
            version: None,
            version_type: None,
        }
    }

    #[test]
    fn the_one_where_every_line_gets_its_own_newline() -> Result<()> {
        let mut document = crate::common::Document::new();
        document.insert("name".to_string(), json!("x"));
        let body = vec![
            BulkEntry::Action(BulkAction::Index(descriptor("a"))),
            BulkEntry::Document(document),
            BulkEntry::Action(BulkAction::Delete(descriptor("b"))),
        ];
        let params = BTreeMap::new();
        let ndjson = BulkRequest { params: &params, body: &body }.to_ndjson()?;
        assert_eq!(
            ndjson,
            "{\"index\":{\"_index\":\"things\",\"_id\":\"a\"}}\n\
             {\"name\":\"x\"}\n\
             {\"delete\":{\"_index\":\"things\",\"_id\":\"b\"}}\n"
        );
        Ok(())
    }

    #[test]
    fn the_one_where_config_picks_the_backend() -> Result<()> {
        let config: BackendConfig = serde_json::from_value(json!({"InMemory": {"fail_first": 2}}))?;
        assert!(matches!(BulkBackend::from_config(&config)?, BulkBackend::InMemory(_)));

        let config: BackendConfig = serde_json::from_value(json!({"Elasticsearch": {"url": "http://localhost:9200"}}))?;
        assert!(matches!(BulkBackend::from_config(&config)?, BulkBackend::Elasticsearch(_)));
        Ok(())
    }
}
