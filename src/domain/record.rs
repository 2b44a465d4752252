//! Record shapes flowing through a sync run
//!
//! A [`RawRecord`] is exactly what the API returned, with field order preserved.
//! A [`FlatRecord`] is the entity-attribute-value shape of a submission: metadata
//! fields kept as-is plus an ordered list of question/response pairs.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Field name to JSON value mapping, in the order the server sent the fields
pub type RawRecord = Map<String, Value>;

/// Typed value of a single survey response
///
/// Lists never appear here: they are carried as their compact JSON text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Map(Map<String, Value>),
}

impl ResponseValue {
    /// Build a response value from a JSON value, serializing lists to compact JSON text
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => ResponseValue::Null,
            Value::Bool(b) => ResponseValue::Bool(*b),
            Value::Number(n) => ResponseValue::Number(n.clone()),
            Value::String(s) => ResponseValue::Text(s.clone()),
            Value::Array(_) => ResponseValue::Text(value.to_string()),
            Value::Object(map) => ResponseValue::Map(map.clone()),
        }
    }

    /// Convert back into a JSON value
    pub fn to_json(&self) -> Value {
        match self {
            ResponseValue::Null => Value::Null,
            ResponseValue::Bool(b) => Value::Bool(*b),
            ResponseValue::Number(n) => Value::Number(n.clone()),
            ResponseValue::Text(s) => Value::String(s.clone()),
            ResponseValue::Map(map) => Value::Object(map.clone()),
        }
    }

    /// Text content, if this is a text response
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ResponseValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// One question and its answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEntry {
    pub question: String,
    pub response: ResponseValue,
}

/// Submission reshaped for SQL consumption
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FlatRecord {
    /// `_`-prefixed fields, verbatim
    pub metadata: RawRecord,

    /// Every other field, in first-appearance order
    pub responses: Vec<ResponseEntry>,
}

impl FlatRecord {
    /// Look up the response to a question
    pub fn response(&self, question: &str) -> Option<&ResponseValue> {
        self.responses
            .iter()
            .find(|entry| entry.question == question)
            .map(|entry| &entry.response)
    }

    /// Render as a single JSON document: metadata fields plus a `responses` array
    pub fn to_json(&self) -> Value {
        let mut doc = self.metadata.clone();
        let responses = self
            .responses
            .iter()
            .map(|entry| {
                let mut item = Map::new();
                item.insert("question".to_string(), Value::String(entry.question.clone()));
                item.insert("response".to_string(), entry.response.to_json());
                Value::Object(item)
            })
            .collect();
        doc.insert("responses".to_string(), Value::Array(responses));
        Value::Object(doc)
    }
}

/// Payload of a row headed for the destination
#[derive(Debug, Clone, PartialEq)]
pub enum RecordBody {
    Raw(RawRecord),
    Flat(FlatRecord),
}

impl RecordBody {
    /// Single JSON document for the row
    pub fn to_json(&self) -> Value {
        match self {
            RecordBody::Raw(record) => Value::Object(record.clone()),
            RecordBody::Flat(flat) => flat.to_json(),
        }
    }

    /// The row's own columns: the raw record, or the metadata of a flat record
    pub fn columns(&self) -> &RawRecord {
        match self {
            RecordBody::Raw(record) => record,
            RecordBody::Flat(flat) => &flat.metadata,
        }
    }

    pub fn responses(&self) -> &[ResponseEntry] {
        match self {
            RecordBody::Raw(_) => &[],
            RecordBody::Flat(flat) => &flat.responses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_response_value_list_becomes_compact_text() {
        let value = ResponseValue::from_json(&json!(["a", 1, null]));
        assert_eq!(value, ResponseValue::Text("[\"a\",1,null]".to_string()));
    }

    #[test]
    fn test_response_value_keeps_scalar_types() {
        assert_eq!(ResponseValue::from_json(&json!(null)), ResponseValue::Null);
        assert_eq!(ResponseValue::from_json(&json!(true)), ResponseValue::Bool(true));
        assert_eq!(ResponseValue::from_json(&json!(3)).to_json(), json!(3));
        assert_eq!(ResponseValue::from_json(&json!("")).as_text(), Some(""));
    }

    #[test]
    fn test_response_value_nested_map() {
        let value = ResponseValue::from_json(&json!({"lat": 1.5, "lon": 2.5}));
        assert!(matches!(value, ResponseValue::Map(_)));
        assert_eq!(value.to_json(), json!({"lat": 1.5, "lon": 2.5}));
    }

    #[test]
    fn test_flat_record_to_json_keeps_order() {
        let mut metadata = RawRecord::new();
        metadata.insert("_id".to_string(), json!(7));
        let record = FlatRecord {
            metadata,
            responses: vec![
                ResponseEntry {
                    question: "q2".to_string(),
                    response: ResponseValue::Text("b".to_string()),
                },
                ResponseEntry {
                    question: "q1".to_string(),
                    response: ResponseValue::Null,
                },
            ],
        };

        let doc = record.to_json();
        assert_eq!(doc["_id"], json!(7));
        assert_eq!(doc["responses"][0]["question"], json!("q2"));
        assert_eq!(doc["responses"][1]["response"], json!(null));
        assert_eq!(record.response("q2").and_then(|r| r.as_text()), Some("b"));
    }
}
