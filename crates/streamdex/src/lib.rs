//! 🌊 streamdex: turns a batch of table change records into one bulk index request.
//!
//! ```text
//!   StreamEvent ─▶ decoder ─▶ fields/actions/documents ─▶ assembler ─▶ submission ─▶ BulkClient
//! ```
//!
//! Library users build a [`Handler`] around any [`BulkClient`]. The CLI goes through [`run`].

pub mod actions;
pub mod app_config;
pub mod assembler;
pub mod backends;
pub mod common;
pub mod config;
pub mod decoder;
pub mod documents;
pub mod errors;
pub mod fields;
pub mod handler;
pub mod hooks;
pub mod submission;

#[cfg(test)]
pub(crate) mod fixtures;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::info;

pub use actions::{ActionDescriptor, BulkAction, BulkEntry, VersionType};
pub use app_config::{AppConfig, RecordErrorMode};
pub use assembler::{BatchResult, RecordMeta};
pub use backends::{BackendConfig, BulkBackend, BulkClient, BulkRequest};
pub use common::{DecodedRecord, Document, EventName, InvocationContext, StreamEvent};
pub use config::{HandlerConfig, RetryConfig};
pub use errors::{ConfigError, PipelineError};
pub use fields::{FieldSpec, ImageKind};
pub use handler::{Handler, HandlerBuilder};

use crate::backends::InMemoryBulkClient;
use crate::hooks::LogRecordErrors;

/// 🚀 Run one batch through a handler built from `app_config`.
///
/// `dry_run` swaps the configured backend for an in-memory one, so nothing leaves the process.
pub async fn run(app_config: AppConfig, event: Value, dry_run: bool) -> Result<Value> {
    let backend = if dry_run {
        info!("🧪 Dry run: bulk requests stay in memory");
        BulkBackend::InMemory(InMemoryBulkClient::default())
    } else {
        BulkBackend::from_config(&app_config.backend)?
    };

    let mut builder = Handler::builder(app_config.handler, backend);
    if app_config.record_errors == RecordErrorMode::Skip {
        builder = builder.record_error_hook(LogRecordErrors);
    }
    let handler = builder.build()?;

    let ctx = InvocationContext {
        function_name: Some(env!("CARGO_PKG_NAME").to_string()),
        ..Default::default()
    };
    handler
        .handle(event, &ctx)
        .await
        .context("💀 The batch didn't make it through the handler")
}
