//! Firestore REST API wire types and field-map conversion helpers.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};

/// Firestore document value types (the subset this backend writes).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue(()),
    BooleanValue(bool),
    IntegerValue(String), // Firestore sends integers as strings
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Option<Vec<Value>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: Option<HashMap<String, Value>>,
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::StringValue(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Value::IntegerValue(n.to_string())
    }

    pub fn timestamp(t: DateTime<Utc>) -> Self {
        Value::TimestampValue(t.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn array(values: Vec<Value>) -> Self {
        Value::ArrayValue(ArrayValue {
            values: Some(values),
        })
    }

    pub fn map(fields: HashMap<String, Value>) -> Self {
        Value::MapValue(MapValue {
            fields: Some(fields),
        })
    }
}

/// Firestore document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Full resource name
    pub name: Option<String>,
    /// Document fields
    pub fields: Option<HashMap<String, Value>>,
    /// Create time
    pub create_time: Option<String>,
    /// Update time
    pub update_time: Option<String>,
}

impl Document {
    pub fn new(fields: HashMap<String, Value>) -> Self {
        Self {
            name: None,
            fields: Some(fields),
            create_time: None,
            update_time: None,
        }
    }

    /// Last path segment of the resource name.
    pub fn doc_id(&self) -> Option<&str> {
        self.name.as_deref().and_then(|n| n.rsplit('/').next())
    }
}

// ============================================================================
// Structured queries
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryRequest {
    pub structured_query: StructuredQuery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunQueryResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document: Option<Document>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub read_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredQuery {
    pub from: Vec<CollectionSelector>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub r#where: Option<Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionSelector {
    pub collection_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub composite_filter: Option<CompositeFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_filter: Option<FieldFilter>,
}

impl Filter {
    pub fn field(path: impl Into<String>, op: impl Into<String>, value: Value) -> Self {
        Self {
            composite_filter: None,
            field_filter: Some(FieldFilter {
                field: FieldReference {
                    field_path: path.into(),
                },
                op: op.into(),
                value,
            }),
        }
    }

    pub fn and(filters: Vec<Filter>) -> Self {
        Self {
            composite_filter: Some(CompositeFilter {
                op: "AND".to_string(),
                filters,
            }),
            field_filter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeFilter {
    pub op: String,
    pub filters: Vec<Filter>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldFilter {
    pub field: FieldReference,
    pub op: String,
    pub value: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldReference {
    pub field_path: String,
}

// ============================================================================
// Field-map extraction helpers
// ============================================================================

/// Extract a string field from a document field map.
pub fn get_string(fields: &HashMap<String, Value>, key: &str) -> StoreResult<String> {
    match fields.get(key) {
        Some(Value::StringValue(s)) => Ok(s.clone()),
        _ => Err(StoreError::invalid_document(format!(
            "missing string field '{key}'"
        ))),
    }
}

/// Extract an optional string field.
pub fn get_opt_string(fields: &HashMap<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

/// Extract an integer field.
pub fn get_integer(fields: &HashMap<String, Value>, key: &str) -> StoreResult<i64> {
    match fields.get(key) {
        Some(Value::IntegerValue(s)) => s
            .parse()
            .map_err(|_| StoreError::invalid_document(format!("bad integer field '{key}'"))),
        _ => Err(StoreError::invalid_document(format!(
            "missing integer field '{key}'"
        ))),
    }
}

/// Extract a timestamp field.
pub fn get_timestamp(fields: &HashMap<String, Value>, key: &str) -> StoreResult<DateTime<Utc>> {
    match fields.get(key) {
        Some(Value::TimestampValue(s)) => parse_timestamp(s, key),
        _ => Err(StoreError::invalid_document(format!(
            "missing timestamp field '{key}'"
        ))),
    }
}

/// Extract an optional timestamp field.
pub fn get_opt_timestamp(
    fields: &HashMap<String, Value>,
    key: &str,
) -> StoreResult<Option<DateTime<Utc>>> {
    match fields.get(key) {
        Some(Value::TimestampValue(s)) => parse_timestamp(s, key).map(Some),
        _ => Ok(None),
    }
}

/// Extract an array of strings.
pub fn get_string_array(fields: &HashMap<String, Value>, key: &str) -> Vec<String> {
    match fields.get(key) {
        Some(Value::ArrayValue(arr)) => arr
            .values
            .iter()
            .flatten()
            .filter_map(|v| match v {
                Value::StringValue(s) => Some(s.clone()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn parse_timestamp(s: &str, key: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::invalid_document(format!("bad timestamp field '{key}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_serialization() {
        let v = Value::integer(42);
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["integerValue"], "42");

        let v = Value::string("hi");
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["stringValue"], "hi");
    }

    #[test]
    fn test_timestamp_roundtrip() {
        let now = Utc::now();
        let mut fields = HashMap::new();
        fields.insert("t".to_string(), Value::timestamp(now));
        let back = get_timestamp(&fields, "t").unwrap();
        // RFC3339 with micros loses sub-microsecond precision
        assert!((back - now).num_milliseconds().abs() < 1);
    }

    #[test]
    fn test_doc_id_from_name() {
        let doc = Document {
            name: Some("projects/p/databases/(default)/documents/posts/abc".to_string()),
            fields: None,
            create_time: None,
            update_time: None,
        };
        assert_eq!(doc.doc_id(), Some("abc"));
    }

    #[test]
    fn test_composite_filter_shape() {
        let f = Filter::and(vec![
            Filter::field("state", "EQUAL", Value::string("active")),
            Filter::field("expiresAt", "LESS_THAN_OR_EQUAL", Value::timestamp(Utc::now())),
        ]);
        let json = serde_json::to_value(&f).unwrap();
        assert_eq!(json["compositeFilter"]["op"], "AND");
        assert_eq!(
            json["compositeFilter"]["filters"][0]["fieldFilter"]["field"]["fieldPath"],
            "state"
        );
    }
}
