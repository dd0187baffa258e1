//! 🔓 Record Decoder: un-encoding the attribute-value soup.
//!
//! The change stream does not send `{"id": "a"}`. It sends `{"id": {"S": "a"}}`,
//! because apparently every value needs a tiny passport stating its type.
//! Numbers arrive as strings (`{"N": "42"}`), because of course they do.
//!
//! `serde_dynamo` owns the passport office. This module only walks each image in the
//! order the attributes arrived, hands every attribute to `serde_dynamo`, and blames
//! the right image when one of them won't decode. 🦆
//!
//! 🧠 Knowledge graph:
//! - `decode_record`: `StreamRecord` → `DecodedRecord`. Absent images become `{}`,
//!   absent keys become `PipelineError::MissingKeys`.
//! - Images are decoded attribute by attribute so the wire order survives. A whole-image
//!   `serde_dynamo::Item` is a `HashMap` and would shuffle it.
//! - Binary (`B`, `BS`) stays as the base64 text it arrived as. We don't index raw bytes,
//!   and `serde_json::Value` has no bytes variant to put them in anyway.

use serde::Deserialize;
use serde_dynamo::AttributeValue;
use serde_json::Value;

use crate::common::{DecodedRecord, Document, StreamRecord};
use crate::errors::PipelineError;

// 📼 `B` → `S` and `BS` → `SS`, all the way down through `M` and `L`
fn binary_as_base64(encoded: Value) -> Value {
    let Value::Object(tagged) = encoded else {
        return encoded;
    };
    if tagged.len() != 1 {
        return Value::Object(tagged);
    }
    let Some((tag, inner)) = tagged.into_iter().next() else {
        return Value::Object(Document::new());
    };

    let inner = match (tag.as_str(), inner) {
        ("M", Value::Object(attributes)) => Value::Object(
            attributes
                .into_iter()
                .map(|(name, value)| (name, binary_as_base64(value)))
                .collect(),
        ),
        ("L", Value::Array(items)) => Value::Array(items.into_iter().map(binary_as_base64).collect()),
        (_, inner) => inner,
    };
    let renamed = match tag.as_str() {
        "B" => Some("S"),
        "BS" => Some("SS"),
        _ => None,
    };
    let tag = renamed.map(str::to_string).unwrap_or(tag);

    let mut retagged = Document::new();
    retagged.insert(tag, inner);
    Value::Object(retagged)
}

fn decode_attribute(encoded: &Value) -> Result<Value, String> {
    let attribute = AttributeValue::deserialize(binary_as_base64(encoded.clone())).map_err(|err| err.to_string())?;
    serde_dynamo::from_attribute_value::<_, Value>(attribute).map_err(|err| err.to_string())
}

/// 🔓 Decode one encoded image. `None` and JSON `null` both mean "no image" and give `{}`.
pub fn decode_image(image: &'static str, encoded: Option<&Value>) -> Result<Document, PipelineError> {
    let attributes = match encoded {
        None | Some(Value::Null) => return Ok(Document::new()),
        Some(Value::Object(attributes)) => attributes,
        Some(other) => {
            return Err(PipelineError::Decode {
                image,
                reason: format!("expected a map of attributes, got {other}"),
            });
        }
    };
    attributes
        .iter()
        .map(|(name, encoded)| {
            decode_attribute(encoded)
                .map(|value| (name.clone(), value))
                .map_err(|reason| PipelineError::Decode {
                    image,
                    reason: format!("attribute '{name}': {reason}"),
                })
        })
        .collect()
}

/// 🔓 Decode the three images of a change record.
pub fn decode_record(record: &StreamRecord) -> Result<DecodedRecord, PipelineError> {
    let keys = match &record.keys {
        None | Some(Value::Null) => return Err(PipelineError::MissingKeys),
        Some(keys) => keys,
    };
    Ok(DecodedRecord {
        new_image: decode_image("NewImage", record.new_image.as_ref())?,
        old_image: decode_image("OldImage", record.old_image.as_ref())?,
        keys: decode_image("Keys", Some(keys))?,
    })
}
