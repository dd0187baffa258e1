//! 📄 Document Builder: deciding what actually gets indexed.
//!
//! The new image, verbatim. Or the new image with only the fields you asked for.
//! Then, if you configured one, whatever your transform hook turns it into.
//! If the hook says `None`, the record quietly leaves the party: no action, no error.

use anyhow::Result;
use serde_json::Value;

use crate::common::Document;
use crate::hooks::TransformRecordHook;

/// 🧺 The candidate body: `new_image`, narrowed to `pick_fields` when set.
///
/// A picked name that is a top-level key is taken as-is. Otherwise a dotted name walks
/// into nested objects (`"address.city"`) and the result keeps that nesting.
/// Picked fields that the image doesn't have are left out, not filled with `null`.
pub fn build_document(new_image: &Document, pick_fields: Option<&[String]>) -> Document {
    match pick_fields {
        Some(fields) => {
            let mut picked = Document::new();
            for field in fields {
                pick_path(new_image, field, &mut picked);
            }
            picked
        }
        None => new_image.clone(),
    }
}

fn pick_path(source: &Document, field: &str, picked: &mut Document) {
    if let Some(value) = source.get(field) {
        picked.insert(field.to_string(), value.clone());
        return;
    }
    let segments: Vec<&str> = field.split('.').collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };
    if parents.is_empty() {
        return;
    }

    let mut current = source;
    for segment in parents {
        match current.get(*segment) {
            Some(Value::Object(inner)) => current = inner,
            _ => return,
        }
    }
    let Some(value) = current.get(*leaf) else {
        return;
    };

    let mut slot = picked;
    for segment in parents {
        let entry = slot
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Document::new()));
        // 🧱 an earlier pick already put a non-object here, leave it be
        let Value::Object(inner) = entry else {
            return;
        };
        slot = inner;
    }
    slot.insert(leaf.to_string(), value.clone());
}

/// 🔄 Run the transform hook if there is one. `None` means "drop this record".
pub async fn transform_document(
    document: Document,
    old_image: &Document,
    transform: Option<&dyn TransformRecordHook>,
) -> Result<Option<Document>> {
    match transform {
        Some(transform) => transform.transform(document, old_image).await,
        None => Ok(Some(document)),
    }
}
