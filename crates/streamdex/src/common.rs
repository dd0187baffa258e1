//! 📦 Common data structures: the building blocks of streamdex
//!
//! ---
//!
//! 🎬 COLD OPEN - INT. A DYNAMODB TABLE - THE EXACT MILLISECOND SOMEONE HITS "SAVE"
//!
//! A row changes. Nobody notices. Except the change stream, which notices
//! EVERYTHING, writes it down in triplicate (new image, old image, keys), wraps it in
//! an attribute-value encoding only a mother could love, and hands it to us in a batch.
//!
//! This module defines the structs that carry that batch around: the raw records as
//! they arrive, the decoded records once we've un-encoded them, and the little bits of
//! invocation context the host runtime hands us on the way in. They don't ask
//! questions. They carry the data. 🦆
//!
//! ---
//!
//! 🧠 Knowledge graph:
//! - Raw shapes (`StreamEvent`, `RawChangeRecord`, `StreamRecord`) keep unknown fields in an
//!   `extra` map, so whatever the stream sends (`eventID`, `StreamViewType`, ...) survives
//!   into `RecordMeta` untouched.
//! - Field names mirror `aws_lambda_events::dynamodb::EventRecord` (`change` is the
//!   `dynamodb` section), but the types are looser: `eventName` may be anything and images
//!   keep their wire order, so one odd record can't sink the whole batch.
//! - Encoded images stay as `serde_json::Value` here. Turning them into documents is the
//!   decoder's job, and a malformed image is a per-record problem, not a batch-shape problem.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 📄 A JSON object. Images, keys and index bodies are all one of these.
pub type Document = Map<String, Value>;

/// 📬 One batch of change records, exactly as the stream delivered it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records")]
    pub records: Vec<RawChangeRecord>,
    #[serde(flatten)]
    pub extra: Document,
}

/// 🎯 A single change record: what happened, plus the encoded row images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawChangeRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: EventName,
    #[serde(rename = "dynamodb")]
    pub change: StreamRecord,
    #[serde(flatten)]
    pub extra: Document,
}

/// 🔒 The `dynamodb` section of a change record. Still encoded. Still mysterious.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StreamRecord {
    #[serde(rename = "Keys", default, skip_serializing_if = "Option::is_none")]
    pub keys: Option<Value>,
    #[serde(rename = "NewImage", default, skip_serializing_if = "Option::is_none")]
    pub new_image: Option<Value>,
    #[serde(rename = "OldImage", default, skip_serializing_if = "Option::is_none")]
    pub old_image: Option<Value>,
    #[serde(flatten)]
    pub extra: Document,
}

/// 🎭 What kind of change this record describes.
///
/// Anything the stream sends that isn't one of the big three lands in `Other`,
/// verbatim, so the error message can quote it back at you. That includes a `null`
/// or a number where a string should be: those are rendered as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Value", into = "String")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
    Other(String),
}

impl Default for EventName {
    fn default() -> Self {
        EventName::Other(String::new())
    }
}

impl From<String> for EventName {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "INSERT" => EventName::Insert,
            "MODIFY" => EventName::Modify,
            "REMOVE" => EventName::Remove,
            _ => EventName::Other(raw),
        }
    }
}

impl From<Value> for EventName {
    fn from(raw: Value) -> Self {
        match raw {
            Value::String(raw) => EventName::from(raw),
            other => EventName::Other(other.to_string()),
        }
    }
}

impl From<EventName> for String {
    fn from(name: EventName) -> Self {
        name.as_str().to_string()
    }
}

impl EventName {
    pub fn as_str(&self) -> &str {
        match self {
            EventName::Insert => "INSERT",
            EventName::Modify => "MODIFY",
            EventName::Remove => "REMOVE",
            EventName::Other(raw) => raw,
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// ✅ A change record after decoding: three plain JSON objects.
///
/// Absent images decode to `{}`, so a REMOVE still has a `new_image`, it's just empty.
/// Emotionally and literally.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DecodedRecord {
    #[serde(rename = "NewImage")]
    pub new_image: Document,
    #[serde(rename = "OldImage")]
    pub old_image: Document,
    #[serde(rename = "Keys")]
    pub keys: Document,
}

/// 🧾 Whatever the host runtime tells us about this invocation.
///
/// Handed to every lifecycle hook untouched. We only peek at `request_id` for the logs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InvocationContext {
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "functionName", default, skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(flatten)]
    pub extra: Document,
}

impl StreamEvent {
    /// 🔒 Validate the batch shape and parse it.
    ///
    /// `Records` must be an array, each record an object with a `dynamodb` object.
    /// Unknown fields are allowed anywhere. Anything else is a `BatchShape` error.
    pub fn from_value(event: &Value) -> anyhow::Result<Self> {
        let records = event
            .get("Records")
            .ok_or_else(|| shape_error("`Records` is missing"))?;
        let records = records
            .as_array()
            .ok_or_else(|| shape_error("`Records` must be an array"))?;
        for (position, record) in records.iter().enumerate() {
            match record.get("dynamodb") {
                Some(Value::Object(_)) => {}
                Some(_) => {
                    return Err(shape_error(format!(
                        "`Records[{position}].dynamodb` must be an object"
                    )));
                }
                None => {
                    return Err(shape_error(format!(
                        "`Records[{position}].dynamodb` is missing"
                    )));
                }
            }
        }
        StreamEvent::deserialize(event).map_err(|err| shape_error(err.to_string()))
    }
}

fn shape_error(reason: impl Into<String>) -> anyhow::Error {
    crate::errors::PipelineError::BatchShape {
        reason: reason.into(),
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;
    use serde_json::json;

    #[test]
    fn the_one_where_event_names_know_their_lines() {
        assert_eq!(EventName::from("INSERT".to_string()), EventName::Insert);
        assert_eq!(EventName::from("MODIFY".to_string()), EventName::Modify);
        assert_eq!(EventName::from("REMOVE".to_string()), EventName::Remove);
        assert_eq!(
            EventName::from("UPSERT".to_string()),
            EventName::Other("UPSERT".to_string())
        );
        assert_eq!(EventName::Other("UPSERT".to_string()).to_string(), "UPSERT");
    }

    #[test]
    fn the_one_where_unknown_fields_ride_along_for_free() -> anyhow::Result<()> {
        let raw = json!({
            "Records": [{
                "eventID": "abc-123",
                "eventName": "INSERT",
                "dynamodb": {
                    "Keys": {"id": {"S": "a"}},
                    "StreamViewType": "NEW_AND_OLD_IMAGES"
                }
            }],
            "source": "aws:dynamodb"
        });

        let event = StreamEvent::from_value(&raw)?;
        assert_eq!(event.records.len(), 1);
        assert_eq!(event.records[0].event_name, EventName::Insert);
        assert_eq!(event.records[0].extra["eventID"], "abc-123");
        assert_eq!(
            event.records[0].change.extra["StreamViewType"],
            "NEW_AND_OLD_IMAGES"
        );
        assert_eq!(event.extra["source"], "aws:dynamodb");
        // 🔄 and back out again, same shape
        assert_eq!(serde_json::to_value(&event)?, raw);
        Ok(())
    }

    #[test]
    fn the_one_where_records_is_not_an_array_and_we_say_so() {
        for bad in [
            json!({}),
            json!({"Records": "nope"}),
            json!({"Records": [{"eventName": "INSERT"}]}),
            json!({"Records": [{"eventName": "INSERT", "dynamodb": 42}]}),
        ] {
            let err = StreamEvent::from_value(&bad).expect_err("💀 bad shape should be rejected");
            assert!(
                matches!(
                    err.downcast_ref::<PipelineError>(),
                    Some(PipelineError::BatchShape { .. })
                ),
                "expected BatchShape for {bad}, got {err:?}"
            );
        }
    }

    #[test]
    fn the_one_where_a_missing_event_name_becomes_an_empty_other() -> anyhow::Result<()> {
        let event = StreamEvent::from_value(&json!({"Records": [{"dynamodb": {}}]}))?;
        assert_eq!(event.records[0].event_name, EventName::Other(String::new()));
        Ok(())
    }

    #[test]
    fn the_one_where_a_weird_event_name_is_a_record_problem_not_a_batch_problem() -> anyhow::Result<()> {
        let event = StreamEvent::from_value(&json!({
            "Records": [
                {"eventName": null, "dynamodb": {}},
                {"eventName": 7, "dynamodb": {}},
                {"eventName": "INSERT", "dynamodb": {}}
            ]
        }))?;
        assert_eq!(event.records[0].event_name, EventName::Other("null".to_string()));
        assert_eq!(event.records[1].event_name, EventName::Other("7".to_string()));
        assert_eq!(event.records[2].event_name, EventName::Insert);
        Ok(())
    }
}
