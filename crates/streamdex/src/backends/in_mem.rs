//! 📦 The in-memory backend: a bulk client that never forgets and never touches a socket.
//!
//! Tests use it to see exactly what would have been sent. The CLI uses it for `--dry-run`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::actions::{BulkAction, BulkEntry};
use crate::backends::{BulkClient, BulkRequest};

/// 🔧 Knobs for the fake. Mostly for testing how the rest of us cope with failure.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct InMemoryConfig {
    /// 💀 Fail this many calls before starting to succeed.
    #[serde(default)]
    pub fail_first: usize,
}

/// 🧾 One call, exactly as the client saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub params: BTreeMap<String, String>,
    pub entries: Vec<BulkEntry>,
    pub ndjson: String,
}

/// 📦 A bulk client that hoards every request in a shared Vec.
///
/// Clone-able because tests need to peek inside after handing a copy to the handler.
/// The `Arc` means every clone shares the same evidence locker.
#[derive(Debug, Clone, Default)]
pub struct InMemoryBulkClient {
    received: Arc<tokio::sync::Mutex<Vec<RecordedRequest>>>,
    calls: Arc<AtomicUsize>,
    fail_first: usize,
}

impl InMemoryBulkClient {
    pub fn new(config: InMemoryConfig) -> Self {
        Self {
            fail_first: config.fail_first,
            ..Default::default()
        }
    }

    /// 💀 A client that fails its first `n` calls.
    pub fn failing_first(n: usize) -> Self {
        Self::new(InMemoryConfig { fail_first: n })
    }

    /// 🔢 Every call, failed ones included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 📋 Every request that was accepted, oldest first.
    pub async fn received(&self) -> Vec<RecordedRequest> {
        self.received.lock().await.clone()
    }
}

#[async_trait]
impl BulkClient for InMemoryBulkClient {
    async fn bulk(&self, request: BulkRequest<'_>) -> Result<Value> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.fail_first {
            anyhow::bail!(
                "💀 In-memory bulk call #{call} failed on purpose ({} scripted failures). It's not you, it's the test.",
                self.fail_first
            );
        }

        let recorded = RecordedRequest {
            params: request.params.clone(),
            entries: request.body.to_vec(),
            ndjson: request.to_ndjson()?,
        };
        let reply = synthesize_reply(&recorded.entries);
        debug!(call, entries = recorded.entries.len(), "📦 In-memory bulk request stashed");
        self.received.lock().await.push(recorded);
        Ok(reply)
    }
}

// 🎭 one item per action header, shaped like the real thing
fn synthesize_reply(entries: &[BulkEntry]) -> Value {
    let items: Vec<Value> = entries
        .iter()
        .filter_map(|entry| match entry {
            BulkEntry::Action(action) => Some(action),
            BulkEntry::Document(_) => None,
        })
        .map(|action| {
            let descriptor = action.descriptor();
            let (status, result) = match action {
                BulkAction::Index(_) => (201, "created"),
                BulkAction::Delete(_) => (200, "deleted"),
            };
            json!({
                action.verb_name(): {
                    "_index": descriptor.index,
                    "_id": descriptor.id,
                    "status": status,
                    "result": result,
                }
            })
        })
        .collect();
    json!({"took": 0, "errors": false, "items": items})
}
