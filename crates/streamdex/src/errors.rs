//! 💀 Errors: the typed ways a batch can go sideways.
//!
//! 🧠 Knowledge graph:
//! - Everything public returns `anyhow::Result`. These enums ride inside the `anyhow::Error`
//!   and come back out with `err.downcast_ref::<PipelineError>()` when a caller (or a test)
//!   needs to know *which* flavor of sadness it is holding.
//! - `ConfigError`: raised once, at `Handler` construction. Never retried. Fix the config.
//! - `PipelineError`: raised per batch (shape) or per record (everything else).
//!   Submission failures stay plain `anyhow` because the client owns that story. 🦆

use serde_json::Value;
use thiserror::Error;

/// 🔧 The config was rejected before a single record was harmed.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("💀 Neither `index` nor `index_field` is configured. Every document needs a home and we were given no address.")]
    MissingIndex,

    #[error("💀 Option `{option}` is configured but empty. A field spec needs at least one non-empty field name.")]
    EmptyFieldSpec { option: &'static str },

    #[error("💀 Option `separator` must not be empty, otherwise `a` + `b` and `ab` become the same id.")]
    EmptySeparator,

    #[error("💀 Option `lookup_order` must list each image at most once and at least one image, got {got:?}")]
    InvalidLookupOrder { got: Vec<String> },

    #[error("💀 Retry policy rejected: {reason}")]
    InvalidRetry { reason: String },
}

/// 📦 Batch- and record-level failures raised while assembling the bulk request.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PipelineError {
    #[error("💀 The batch event is not shaped like a change stream batch: {reason}")]
    BatchShape { reason: String },

    #[error("💀 Record #{position} has event name '{event_name}', which is neither INSERT, MODIFY nor REMOVE. We do not improvise verbs.")]
    UnknownEventName { position: usize, event_name: String },

    #[error("💀 Record is missing `dynamodb.Keys`. A change record without keys is a rumor, not a record.")]
    MissingKeys,

    #[error("💀 Could not decode attribute value in {image}: {reason}")]
    Decode { image: &'static str, reason: String },

    #[error("💀 Field '{field}' was not found in any image of the record")]
    FieldNotFound { field: String },

    #[error("💀 \"{label}\" must be a non-negative integer, got {value}")]
    InvalidVersion { label: String, value: Value },

    #[error("💀 The resolved index name is blank. Elasticsearch will not accept a document addressed to nowhere.")]
    EmptyIndexName,
}
