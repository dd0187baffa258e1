//! 🔄 Submission: one bulk call, tried until it works or the budget runs out.
//!
//! With `retries = k` a client that always fails is called exactly `k + 1` times,
//! with the same action list every time, then the last error goes up the stack.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use backoff::backoff::Backoff;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::actions::BulkEntry;
use crate::backends::{BulkClient, BulkRequest};
use crate::config::RetryConfig;

/// 🕳️ What an invocation returns when there was nothing to send.
pub fn empty_result() -> Value {
    json!({"took": 0, "errors": false, "items": []})
}

pub(crate) async fn submit<C: BulkClient + ?Sized>(
    client: &C,
    params: &BTreeMap<String, String>,
    actions: &[BulkEntry],
    retry: &RetryConfig,
) -> Result<Value> {
    let max_attempts = retry.retries + 1;
    let mut backoff = retry.backoff();
    let mut attempt = 0;

    loop {
        attempt += 1;
        debug!(attempt, max_attempts, entries = actions.len(), "📡 Submitting bulk request");

        match client.bulk(BulkRequest { params, body: actions }).await {
            Ok(reply) => return Ok(reply),
            Err(err) if attempt < max_attempts => {
                let delay = backoff
                    .next_backoff()
                    .unwrap_or(Duration::from_millis(retry.max_timeout_ms));
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %format!("{err:#}"),
                    "🔄 Bulk request failed, backing off before the next try"
                );
                tokio::time::sleep(delay).await;
            }
            Err(err) => {
                return Err(err).with_context(|| {
                    format!("💀 Bulk submission gave up after {attempt} attempt(s). The cluster and us need to talk.")
                });
            }
        }
    }
}
