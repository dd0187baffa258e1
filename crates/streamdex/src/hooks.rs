//! 🪝 Hooks: the places where the caller gets a say.
//!
//! 🎬 *[a pipeline runs. at four specific moments, it stops and asks for opinions.]*
//! *[it does not ask at any other moment. it is a pipeline, not a committee.]*
//!
//! Two families live here:
//!
//! - **Resolvers** (`Resolvers`): awaited once per record, in record order.
//!   `id(document, old_image)`, `version(document, old_image)`, and
//!   `transform(document, old_image)`, which may return `None` to drop the record.
//!   Sync closures get the async traits for free.
//! - **Lifecycle hooks** (`Hooks`): async trait objects called around the batch, in this
//!   order and never concurrently:
//!
//! ```text
//!   before(event, ctx)                         → may fail; nothing has been parsed yet
//!   record_error(event, ctx, err)              → once per failing record, batch continues
//!   after(event, ctx, result, meta)            → Some(value) replaces the result
//!   error(event, ctx, err)                     → any failure above, its value is the result
//! ```
//!
//! Every slot is optional. An empty slot changes behavior: no `record_error` means one bad
//! record sinks the batch, no `error` means failures propagate to the caller. 🦆

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use crate::assembler::RecordMeta;
use crate::common::{Document, InvocationContext};

/// 🆔 `(document, old_image) -> id`. Beats every static id strategy.
///
/// Async, so a resolver may look things up before it answers. A plain
/// `Fn(&Document, &Document) -> Result<String>` closure works as-is.
#[async_trait]
pub trait IdResolver: Send + Sync {
    async fn resolve_id(&self, document: &Document, old_image: &Document) -> Result<String>;
}

#[async_trait]
impl<F> IdResolver for F
where
    F: Fn(&Document, &Document) -> Result<String> + Send + Sync,
{
    async fn resolve_id(&self, document: &Document, old_image: &Document) -> Result<String> {
        self(document, old_image)
    }
}

/// 🔢 `(document, old_image) -> version`. The value still has to pass the version gate.
#[async_trait]
pub trait VersionResolver: Send + Sync {
    async fn resolve_version(&self, document: &Document, old_image: &Document) -> Result<Value>;
}

#[async_trait]
impl<F> VersionResolver for F
where
    F: Fn(&Document, &Document) -> Result<Value> + Send + Sync,
{
    async fn resolve_version(&self, document: &Document, old_image: &Document) -> Result<Value> {
        self(document, old_image)
    }
}

/// 🔄 `(document, old_image) -> Some(new document)` or `None` to drop the record.
#[async_trait]
pub trait TransformRecordHook: Send + Sync {
    async fn transform(&self, document: Document, old_image: &Document) -> Result<Option<Document>>;
}

#[async_trait]
impl<F> TransformRecordHook for F
where
    F: Fn(Document, &Document) -> Result<Option<Document>> + Send + Sync,
{
    async fn transform(&self, document: Document, old_image: &Document) -> Result<Option<Document>> {
        self(document, old_image)
    }
}

/// 📦 The per-record resolvers, all optional.
#[derive(Clone, Default)]
pub struct Resolvers {
    pub id: Option<Arc<dyn IdResolver>>,
    pub version: Option<Arc<dyn VersionResolver>>,
    pub transform: Option<Arc<dyn TransformRecordHook>>,
}

impl std::fmt::Debug for Resolvers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 🎭 trait objects don't do Debug, so we report which slots are filled
        f.debug_struct("Resolvers")
            .field("id", &self.id.is_some())
            .field("version", &self.version.is_some())
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

/// 🚪 Runs first. An error here aborts the batch before any record is parsed.
#[async_trait]
pub trait BeforeHook: Send + Sync {
    async fn before(&self, event: &Value, ctx: &InvocationContext) -> Result<()>;
}

/// 🏁 Runs after a successful (or short-circuited) submission.
/// `Some(value)` replaces the submission result; `None` keeps it.
#[async_trait]
pub trait AfterHook: Send + Sync {
    async fn after(
        &self,
        event: &Value,
        ctx: &InvocationContext,
        result: &Value,
        meta: &[RecordMeta],
    ) -> Result<Option<Value>>;
}

/// 🚑 Turns a failed invocation into a result. Return `Err` to keep failing.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    async fn on_error(&self, event: &Value, ctx: &InvocationContext, error: anyhow::Error) -> Result<Value>;
}

/// 👀 Observes one failing record. The batch carries on without it.
/// An `Err` from the observer itself aborts the batch.
#[async_trait]
pub trait RecordErrorHook: Send + Sync {
    async fn on_record_error(&self, event: &Value, ctx: &InvocationContext, error: &anyhow::Error) -> Result<()>;
}

/// 🪝 The four lifecycle slots.
#[derive(Clone, Default)]
pub struct Hooks {
    pub before: Option<Arc<dyn BeforeHook>>,
    pub after: Option<Arc<dyn AfterHook>>,
    pub error: Option<Arc<dyn ErrorHook>>,
    pub record_error: Option<Arc<dyn RecordErrorHook>>,
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("error", &self.error.is_some())
            .field("record_error", &self.record_error.is_some())
            .finish()
    }
}

/// 📝 A record-error hook that writes the failure to the log and moves on.
///
/// What the CLI installs when told to skip bad records.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogRecordErrors;

#[async_trait]
impl RecordErrorHook for LogRecordErrors {
    async fn on_record_error(&self, _event: &Value, ctx: &InvocationContext, error: &anyhow::Error) -> Result<()> {
        tracing::warn!(
            request_id = ctx.request_id.as_deref().unwrap_or("-"),
            error = %format!("{error:#}"),
            "⚠️ Skipping a change record that refused to become a bulk action"
        );
        Ok(())
    }
}
