//! 🏗️ Batch Assembler: folding a whole batch into one ordered bulk body.
//!
//! 🎬 COLD OPEN - INT. ASSEMBLY LINE - SHIFT CHANGE
//!
//! Records come in on the left conveyor, in the order the stream wrote them.
//! Each one is decoded, addressed, filled, and stamped with a verb. Bulk lines roll
//! off on the right: two for an index (header, then body, glued together), one for a
//! delete. Nobody cuts in line. Nobody gets reordered. The bulk API would notice.
//!
//! Sometimes a record jams the machine. What happens next is a policy decision:
//!
//! - `RecordErrorPolicy::Abort`: stop the line, the whole batch fails.
//! - `RecordErrorPolicy::Report`: hand the jammed record's error to the record-error hook,
//!   toss the record, keep the line moving.
//!
//! 🧠 Knowledge graph:
//! - `assemble_record` returns a sum type: `Ok(Some(..))` emitted, `Ok(None)` dropped by the
//!   transform hook, `Err(..)` failed. The fold decides what an `Err` means.
//! - One `RecordMeta` per *emitted* record, not per raw record, in input order.

use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, trace};

use crate::actions::{BulkAction, BulkEntry, build_descriptor};
use crate::common::{DecodedRecord, Document, InvocationContext, RawChangeRecord, StreamEvent};
use crate::config::HandlerConfig;
use crate::decoder::decode_record;
use crate::documents::{build_document, transform_document};
use crate::errors::PipelineError;
use crate::hooks::{RecordErrorHook, Resolvers};

/// 🧾 What one emitted record turned into, for hooks and callers to inspect.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordMeta {
    /// 📬 the record as it arrived
    pub event: RawChangeRecord,
    /// 🔓 its decoded images
    pub decoded: DecodedRecord,
    pub action: BulkAction,
    pub document: Document,
}

/// 📦 The assembled batch: the bulk body, plus one meta entry per emitted record.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct BatchResult {
    pub actions: Vec<BulkEntry>,
    pub meta: Vec<RecordMeta>,
}

/// ✅ One record's contribution: one or two bulk lines and its meta.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct AssembledRecord {
    pub entries: Vec<BulkEntry>,
    pub meta: RecordMeta,
}

/// ⚖️ What to do when a record fails.
pub(crate) enum RecordErrorPolicy<'a> {
    Abort,
    Report(&'a dyn RecordErrorHook),
}

impl<'a> RecordErrorPolicy<'a> {
    pub(crate) fn from_hook(hook: Option<&'a dyn RecordErrorHook>) -> Self {
        match hook {
            Some(hook) => RecordErrorPolicy::Report(hook),
            None => RecordErrorPolicy::Abort,
        }
    }
}

/// 🔧 Decode → verb → document → header → transform → emit, for one record.
pub(crate) async fn assemble_record(
    position: usize,
    record: &RawChangeRecord,
    config: &HandlerConfig,
    resolvers: &Resolvers,
) -> Result<Option<AssembledRecord>> {
    let decoded = decode_record(&record.change)?;

    let verb = record
        .event_name
        .verb()
        .ok_or_else(|| PipelineError::UnknownEventName {
            position,
            event_name: record.event_name.to_string(),
        })?;

    let document = build_document(&decoded.new_image, config.pick_fields.as_deref());
    let descriptor = build_descriptor(&decoded, &document, config, resolvers).await?;

    let Some(document) = transform_document(document, &decoded.old_image, resolvers.transform.as_deref()).await? else {
        trace!(position, "🗑️ Transform hook returned nothing, record dropped without ceremony");
        return Ok(None);
    };

    let action = BulkAction::new(verb, descriptor)?;
    let mut entries = Vec::with_capacity(2);
    entries.push(BulkEntry::Action(action.clone()));
    if let BulkAction::Index(_) = action {
        entries.push(BulkEntry::Document(document.clone()));
    }

    Ok(Some(AssembledRecord {
        entries,
        meta: RecordMeta {
            event: record.clone(),
            decoded,
            action,
            document,
        },
    }))
}

/// 🏗️ Fold every record into one `BatchResult`, in input order.
pub(crate) async fn assemble_batch(
    raw_event: &Value,
    event: &StreamEvent,
    ctx: &InvocationContext,
    config: &HandlerConfig,
    resolvers: &Resolvers,
    policy: RecordErrorPolicy<'_>,
) -> Result<BatchResult> {
    let mut batch = BatchResult::default();
    let mut skipped = 0usize;

    for (position, record) in event.records.iter().enumerate() {
        let outcome = assemble_record(position, record, config, resolvers).await.with_context(|| {
            format!(
                "💀 Record #{position} ({}) could not be turned into a bulk action",
                record.event_name
            )
        });

        match (outcome, &policy) {
            (Ok(Some(assembled)), _) => {
                batch.actions.extend(assembled.entries);
                batch.meta.push(assembled.meta);
            }
            (Ok(None), _) => {}
            (Err(err), RecordErrorPolicy::Abort) => return Err(err),
            (Err(err), RecordErrorPolicy::Report(hook)) => {
                skipped += 1;
                hook.on_record_error(raw_event, ctx, &err)
                    .await
                    .context("💀 The record-error hook itself failed. The observer needed observing.")?;
            }
        }
    }

    debug!(
        records = event.records.len(),
        emitted = batch.meta.len(),
        skipped,
        bulk_lines = batch.actions.len(),
        "📦 Batch assembled, every record accounted for"
    );
    Ok(batch)
}
