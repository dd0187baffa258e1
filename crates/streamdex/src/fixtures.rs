//! 🧪 Test fixtures: change-stream events from plain JSON.
//!
//! Write `{"id": "a"}`, get `{"id": {"S": "a"}}` in the right slot of a real-looking record.

use serde_dynamo::AttributeValue;
use serde_json::{Value, json};

use crate::common::Document;

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Document::new(),
    }
}

// 🔄 one attribute at a time, so the image keeps the order it was written in
fn to_wire(document: &Document) -> Value {
    Value::Object(
        document
            .iter()
            .map(|(name, value)| {
                let attribute: AttributeValue =
                    serde_dynamo::to_attribute_value(value).expect("plain JSON always encodes");
                let encoded = serde_json::to_value(attribute).expect("attribute values always serialize");
                (name.clone(), encoded)
            })
            .collect(),
    )
}

// 🔑 images always carry the key attributes, like the real stream
fn with_keys(keys: &Value, attributes: Value) -> Value {
    let mut image = object(keys.clone());
    image.extend(object(attributes));
    to_wire(&image)
}

/// 📬 Wrap records in a batch.
pub(crate) fn event(records: Vec<Value>) -> Value {
    json!({"Records": records})
}

/// 🧱 A record with exactly the images given, no key merging.
pub(crate) fn record(event_name: &str, keys: Value, new_image: Option<Value>, old_image: Option<Value>) -> Value {
    let mut dynamodb = json!({"Keys": to_wire(&object(keys))});
    if let Some(new_image) = new_image {
        dynamodb["NewImage"] = to_wire(&object(new_image));
    }
    if let Some(old_image) = old_image {
        dynamodb["OldImage"] = to_wire(&object(old_image));
    }
    json!({
        "eventID": "1",
        "eventName": event_name,
        "eventSource": "aws:dynamodb",
        "dynamodb": dynamodb,
    })
}

/// ➕ An INSERT: keys plus new attributes, no old image.
pub(crate) fn insert(keys: Value, attributes: Value) -> Value {
    let new_image = with_keys(&keys, attributes);
    let mut record = record("INSERT", keys, None, None);
    record["dynamodb"]["NewImage"] = new_image;
    record
}

/// ✏️ A MODIFY: both images, keys merged into each.
pub(crate) fn modify(keys: Value, new_attributes: Value, old_attributes: Value) -> Value {
    let new_image = with_keys(&keys, new_attributes);
    let old_image = with_keys(&keys, old_attributes);
    let mut record = record("MODIFY", keys, None, None);
    record["dynamodb"]["NewImage"] = new_image;
    record["dynamodb"]["OldImage"] = old_image;
    record
}

/// ➖ A REMOVE: the old image only.
pub(crate) fn remove(keys: Value, old_attributes: Value) -> Value {
    let old_image = with_keys(&keys, old_attributes);
    let mut record = record("REMOVE", keys, None, None);
    record["dynamodb"]["OldImage"] = old_image;
    record
}
