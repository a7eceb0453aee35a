//! Conversion between Firestore typed values and plain JSON.
//!
//! The REST API wraps every field in a single-key object naming its type
//! (`{"stringValue": "x"}`, `{"mapValue": {"fields": {...}}}`). Forwarded
//! payloads need the plain JSON shape, and query filters need the typed one.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number, Value};
use tracing::warn;

use crate::error::{ForwarderError, Result};

/// Decodes a document's `fields` object into plain JSON.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.clone(), decode_value(value)?)))
        .collect()
}

/// Decodes one typed value.
///
/// Timestamps, references and bytes stay strings. Non-finite doubles become
/// `null`, the same as `JSON.stringify` would produce. Value types this
/// decoder does not know keep their raw REST representation.
pub fn decode_value(value: &Value) -> Result<Value> {
    let Some(object) = value.as_object() else {
        return Err(invalid("expected an object", value));
    };
    let Some((kind, inner)) = object.iter().next() else {
        return Err(invalid("empty value", value));
    };

    match kind.as_str() {
        "nullValue" => Ok(Value::Null),
        "booleanValue" => inner
            .as_bool()
            .map(Value::Bool)
            .ok_or_else(|| invalid("booleanValue is not a boolean", value)),
        "integerValue" => decode_integer(inner).ok_or_else(|| invalid("bad integerValue", value)),
        "doubleValue" => decode_double(inner).ok_or_else(|| invalid("bad doubleValue", value)),
        "timestampValue" | "stringValue" | "bytesValue" | "referenceValue" => inner
            .as_str()
            .map(|s| Value::String(s.to_string()))
            .ok_or_else(|| invalid("expected a string", value)),
        "geoPointValue" => {
            let mut point = Map::new();
            for axis in ["latitude", "longitude"] {
                point.insert(
                    axis.to_string(),
                    inner.get(axis).cloned().unwrap_or(Value::from(0.0))
                );
            }
            Ok(Value::Object(point))
        }
        "arrayValue" => match inner.get("values") {
            Some(Value::Array(values)) => values
                .iter()
                .map(decode_value)
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            None => Ok(Value::Array(Vec::new())),
            Some(_) => Err(invalid("arrayValue.values is not an array", value))
        },
        "mapValue" => match inner.get("fields") {
            Some(Value::Object(fields)) => decode_fields(fields).map(Value::Object),
            None => Ok(Value::Object(Map::new())),
            Some(_) => Err(invalid("mapValue.fields is not an object", value))
        },
        other => {
            warn!(value_type = other, "Passing through unknown Firestore value type");
            Ok(inner.clone())
        }
    }
}

// int64 values arrive as decimal strings.
fn decode_integer(inner: &Value) -> Option<Value> {
    match inner {
        Value::String(s) => s.parse::<i64>().ok().map(Value::from),
        Value::Number(n) => n.as_i64().map(Value::from),
        _ => None
    }
}

fn decode_double(inner: &Value) -> Option<Value> {
    match inner {
        Value::Number(n) => Some(Value::Number(n.clone())),
        Value::String(s) => match s.as_str() {
            "NaN" | "Infinity" | "-Infinity" => Some(Value::Null),
            other => other
                .parse::<f64>()
                .ok()
                .map(|f| Number::from_f64(f).map_or(Value::Null, Value::Number))
        },
        _ => None
    }
}

fn invalid(reason: &str, value: &Value) -> ForwarderError {
    ForwarderError::InvalidValue(format!("{reason}: {value}"))
}

/// Encodes plain JSON as a typed value.
pub fn encode_value(value: &Value) -> Value {
    let mut typed = Map::new();
    match value {
        Value::Null => {
            typed.insert("nullValue".to_string(), Value::Null);
        }
        Value::Bool(b) => {
            typed.insert("booleanValue".to_string(), Value::Bool(*b));
        }
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                typed.insert("integerValue".to_string(), Value::String(i.to_string()));
            } else {
                typed.insert("doubleValue".to_string(), Value::Number(n.clone()));
            }
        }
        Value::String(s) => {
            typed.insert("stringValue".to_string(), Value::String(s.clone()));
        }
        Value::Array(values) => {
            let values = values.iter().map(encode_value).collect();
            typed.insert(
                "arrayValue".to_string(),
                serde_json::json!({ "values": Value::Array(values) })
            );
        }
        Value::Object(fields) => {
            let fields: Map<String, Value> = fields
                .iter()
                .map(|(k, v)| (k.clone(), encode_value(v)))
                .collect();
            typed.insert(
                "mapValue".to_string(),
                serde_json::json!({ "fields": Value::Object(fields) })
            );
        }
    }
    Value::Object(typed)
}

/// Encodes a timestamp value for query filters.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    serde_json::json!({ "timestampValue": at.to_rfc3339_opts(SecondsFormat::Micros, true) })
}
