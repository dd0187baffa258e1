//! 🔎 Field Resolver: finding a field in a record that has three places to hide it.
//!
//! A decoded record has a new image, an old image, and keys. A field can live in any of
//! them, or all of them, or (on a REMOVE) nowhere you'd first think to look. So we look
//! in a fixed, configured order, and we apply that order everywhere: ids, index names,
//! type names, parents, versions. Same rules for every question.
//!
//! 🧠 Knowledge graph:
//! - `ImageKind` + `lookup_order`: the search order, default `[new_image, keys, old_image]`.
//! - `get_field`: the raw JSON value (versions must stay numbers).
//! - `assemble_field`: stringify one field or join several with the separator.
//! - Missing field, `null` field, absent image: all the same thing, `FieldNotFound`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::common::{DecodedRecord, Document};
use crate::errors::PipelineError;

/// 🖼️ Which part of a decoded record to look in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageKind {
    NewImage,
    Keys,
    OldImage,
}

/// 🔧 New image first (it's the freshest), then the keys (always present), then the old image.
pub fn default_lookup_order() -> Vec<ImageKind> {
    vec![ImageKind::NewImage, ImageKind::Keys, ImageKind::OldImage]
}

/// 📎 One field name, or an ordered list of them to be joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldSpec {
    Single(String),
    Many(Vec<String>),
}

impl FieldSpec {
    pub fn names(&self) -> impl Iterator<Item = &str> {
        let names: &[String] = match self {
            FieldSpec::Single(name) => std::slice::from_ref(name),
            FieldSpec::Many(names) => names,
        };
        names.iter().map(String::as_str)
    }

    /// ✅ At least one name, and no blank ones.
    pub fn is_valid(&self) -> bool {
        let mut names = self.names().peekable();
        names.peek().is_some() && names.all(|name| !name.is_empty())
    }
}

impl From<&str> for FieldSpec {
    fn from(name: &str) -> Self {
        FieldSpec::Single(name.to_string())
    }
}

impl From<Vec<&str>> for FieldSpec {
    fn from(names: Vec<&str>) -> Self {
        FieldSpec::Many(names.into_iter().map(str::to_string).collect())
    }
}

impl DecodedRecord {
    pub fn image(&self, kind: ImageKind) -> &Document {
        match kind {
            ImageKind::NewImage => &self.new_image,
            ImageKind::Keys => &self.keys,
            ImageKind::OldImage => &self.old_image,
        }
    }
}

/// 🔎 The raw value of `field`, from the first image (in `order`) that has a non-null one.
pub fn get_field<'a>(record: &'a DecodedRecord, field: &str, order: &[ImageKind]) -> Option<&'a Value> {
    order
        .iter()
        .filter_map(|kind| record.image(*kind).get(field))
        .find(|value| !value.is_null())
}

/// 🧵 Resolve a field spec into one identity string.
///
/// Single name: the stringified value. List: each stringified, joined with `separator`,
/// in list order. Any missing name fails the whole assembly.
pub fn assemble_field(
    record: &DecodedRecord,
    spec: &FieldSpec,
    separator: &str,
    order: &[ImageKind],
) -> Result<String, PipelineError> {
    let parts = spec
        .names()
        .map(|field| {
            get_field(record, field, order)
                .map(stringify)
                .ok_or_else(|| PipelineError::FieldNotFound {
                    field: field.to_string(),
                })
        })
        .collect::<Result<Vec<_>, _>>()?;
    Ok(parts.join(separator))
}

// 📝 strings verbatim, everything else as its compact JSON text
fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
