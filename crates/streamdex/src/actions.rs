//! 📡 Action Descriptor Builder: writing the cover letter for every document.
//!
//! 🎬 COLD OPEN - INT. THE BULK API'S MAIL ROOM - HIGH NOON
//!
//! Every document that arrives at `_bulk` needs a header. Which index? Which id?
//! Which version, and is that version *external*? The mail room does not guess.
//! The mail room reads the header, and if the header is wrong, the mail room
//! returns the whole envelope with a 400 and a note that says "see me".
//!
//! This module writes the headers. Each field has its own ladder of strategies, and
//! the highest rung that's configured wins:
//!
//! ```text
//!   index   : static `index`            > `index_prefix` + assembled `index_field`
//!   type    : static `type`             > assembled `type_field`          (omitted if blank)
//!   id      : `id_resolver(doc, old)`   > assembled `id_field`            > the record's own keys
//!   version : `version_resolver(...)`   > raw `version_field`             (validated, external)
//!   parent  : raw `parent_field`, when configured
//! ```
//!
//! Then the verb: INSERT and MODIFY index (header + body), REMOVE deletes (header only,
//! version bumped by one), anything else is an error. 🦆

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{DecodedRecord, Document, EventName};
use crate::config::HandlerConfig;
use crate::errors::PipelineError;
use crate::fields::{FieldSpec, assemble_field, get_field};
use crate::hooks::Resolvers;

/// 🏷️ The only version type we ever send. The store checks our number, not its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionType {
    External,
}

/// 📋 The bulk action header: where the document goes and how to treat it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionDescriptor {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_type", default, skip_serializing_if = "Option::is_none")]
    pub doc_type: Option<String>,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Serialized as `version_type`, the bulk API's own spelling, not `versionType`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_type: Option<VersionType>,
}

/// 🎭 Index or delete. Serialized as `{"index": {...}}` / `{"delete": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkAction {
    Index(ActionDescriptor),
    Delete(ActionDescriptor),
}

/// 📦 One line of the bulk body: an action header, or the document that follows one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BulkEntry {
    Action(BulkAction),
    Document(Document),
}

/// 🔀 What a recognized event turns into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Index,
    Delete,
}

impl EventName {
    /// INSERT and MODIFY index, REMOVE deletes, everything else gets `None` and an error upstream.
    pub fn verb(&self) -> Option<Verb> {
        match self {
            EventName::Insert | EventName::Modify => Some(Verb::Index),
            EventName::Remove => Some(Verb::Delete),
            EventName::Other(_) => None,
        }
    }
}

impl BulkAction {
    /// 🔀 Wrap a descriptor in its verb.
    ///
    /// A delete supersedes version N, so it is sent as N + 1.
    pub fn new(verb: Verb, mut descriptor: ActionDescriptor) -> Result<Self, PipelineError> {
        Ok(match verb {
            Verb::Index => BulkAction::Index(descriptor),
            Verb::Delete => {
                if let Some(version) = descriptor.version {
                    descriptor.version = Some(version.checked_add(1).ok_or_else(|| {
                        PipelineError::InvalidVersion {
                            label: "version".to_string(),
                            value: Value::from(version),
                        }
                    })?);
                }
                BulkAction::Delete(descriptor)
            }
        })
    }

    pub fn descriptor(&self) -> &ActionDescriptor {
        match self {
            BulkAction::Index(descriptor) | BulkAction::Delete(descriptor) => descriptor,
        }
    }

    pub fn verb_name(&self) -> &'static str {
        match self {
            BulkAction::Index(_) => "index",
            BulkAction::Delete(_) => "delete",
        }
    }
}

/// 🔢 The version gate: a non-negative integer, or nothing gets through.
///
/// A float counts when it is a whole number (`3.0`), since numeric attributes can
/// decode either way.
pub fn validate_version(value: &Value, label: &str) -> Result<u64, PipelineError> {
    value
        .as_u64()
        .or_else(|| {
            value
                .as_f64()
                .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0 && *v < u64::MAX as f64)
                .map(|v| v as u64)
        })
        .ok_or_else(|| PipelineError::InvalidVersion {
            label: label.to_string(),
            value: value.clone(),
        })
}

/// 📋 Resolve every header field for one record.
///
/// `document` is the candidate body *before* the transform hook runs; that's what the
/// id and version resolvers get to look at, alongside the old image.
pub async fn build_descriptor(
    record: &DecodedRecord,
    document: &Document,
    config: &HandlerConfig,
    resolvers: &Resolvers,
) -> anyhow::Result<ActionDescriptor> {
    let separator = config.separator.as_str();
    let order = config.lookup_order.as_slice();

    // 🆔 id: the resolver, else the id field(s), else every key the table has
    let id = match (&resolvers.id, &config.id_field) {
        (Some(resolver), _) => resolver.resolve_id(document, &record.old_image).await?,
        (None, Some(spec)) => assemble_field(record, spec, separator, order)?,
        (None, None) => {
            let key_names: Vec<String> = record.keys.keys().cloned().collect();
            if key_names.is_empty() {
                return Err(PipelineError::MissingKeys.into());
            }
            assemble_field(record, &key_names_spec(key_names), separator, order)?
        }
    };

    // 📡 index: static wins, computed gets the prefix
    let index = match non_blank(config.index.as_deref()) {
        Some(index) => index.to_string(),
        None => match &config.index_field {
            Some(spec) => format!(
                "{}{}",
                config.index_prefix,
                assemble_field(record, spec, separator, order)?
            ),
            None => String::new(),
        },
    };
    if index.trim().is_empty() {
        return Err(PipelineError::EmptyIndexName.into());
    }

    // 🏷️ type: blank means absent, never `"_type": ""`
    let doc_type = match non_blank(config.doc_type.as_deref()) {
        Some(doc_type) => Some(doc_type.to_string()),
        None => match &config.type_field {
            Some(spec) => Some(assemble_field(record, spec, separator, order)?),
            None => None,
        },
    }
    .filter(|doc_type| !doc_type.is_empty());

    // 🔒 parent: raw value, so numeric routing stays numeric
    let parent = config
        .parent_field
        .as_deref()
        .and_then(|field| get_field(record, field, order))
        .cloned();

    // 🔢 version: resolver or field, then through the gate
    let version = match (&resolvers.version, &config.version_field) {
        (Some(resolver), _) => {
            let value = resolver.resolve_version(document, &record.old_image).await?;
            Some(validate_version(&value, "resolved version")?)
        }
        (None, Some(field)) => {
            let value = get_field(record, field, order).cloned().unwrap_or(Value::Null);
            Some(validate_version(&value, field)?)
        }
        (None, None) => None,
    };

    Ok(ActionDescriptor {
        index,
        doc_type,
        id,
        parent,
        version,
        version_type: version.map(|_| VersionType::External),
    })
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

// 🔑 a table with one key gets a single spec; composite keys get joined in the order they arrived
fn key_names_spec(mut names: Vec<String>) -> FieldSpec {
    if names.len() == 1 {
        FieldSpec::Single(names.remove(0))
    } else {
        FieldSpec::Many(names)
    }
}
