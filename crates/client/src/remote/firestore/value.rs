//! Conversion between Firestore typed values and plain JSON.
//!
//! Firestore's REST API wraps every value in a single-key object naming its
//! type (`{"stringValue": "x"}`, `{"integerValue": "42"}`, ...). The rest of
//! the crate only deals in plain JSON, so documents are converted at the edge.
//!
//! Timestamps, references and bytes decode to strings; geo points decode to
//! `{"latitude", "longitude"}` objects. Encoding never produces those types:
//! JSON strings are always written as `stringValue`.

use serde_json::{Map, Number, Value, json};

use grocer_core::DocumentId;

use crate::remote::{Document, StoreError};

/// Decode a Firestore `Value` object into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value, StoreError> {
    let Some((kind, inner)) = value.as_object().and_then(|obj| obj.iter().next()) else {
        return Err(StoreError::Unexpected(format!("not a typed value: {value}")));
    };

    let decoded = match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => {
            let n = match inner {
                Value::String(s) => s.parse::<i64>().map_err(|e| {
                    StoreError::Unexpected(format!("bad integerValue {s:?}: {e}"))
                })?,
                other => other.as_i64().ok_or_else(|| {
                    StoreError::Unexpected(format!("bad integerValue {other}"))
                })?,
            };
            Value::Number(n.into())
        }
        // NaN and infinities have no JSON representation
        "doubleValue" => inner
            .as_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number),
        "timestampValue" | "stringValue" | "bytesValue" | "referenceValue" => inner.clone(),
        "geoPointValue" => json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        }),
        "arrayValue" => {
            let values = match inner.get("values") {
                Some(Value::Array(values)) => values
                    .iter()
                    .map(decode_value)
                    .collect::<Result<Vec<_>, _>>()?,
                _ => Vec::new(),
            };
            Value::Array(values)
        }
        "mapValue" => Value::Object(decode_fields(inner.get("fields"))?),
        other => {
            return Err(StoreError::Unexpected(format!("unknown value type {other}")));
        }
    };

    Ok(decoded)
}

/// Decode a Firestore `fields` map (absent means empty).
pub fn decode_fields(fields: Option<&Value>) -> Result<Map<String, Value>, StoreError> {
    match fields {
        None | Some(Value::Null) => Ok(Map::new()),
        Some(Value::Object(fields)) => fields
            .iter()
            .map(|(key, value)| Ok::<_, StoreError>((key.clone(), decode_value(value)?)))
            .collect(),
        Some(other) => Err(StoreError::Unexpected(format!("fields is not a map: {other}"))),
    }
}

/// Encode plain JSON as a Firestore `Value` object.
#[must_use]
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => json!({
            "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}

/// Encode a JSON object as a Firestore `fields` map.
#[must_use]
pub fn encode_fields(fields: &Map<String, Value>) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(key, value)| (key.clone(), encode_value(value)))
            .collect(),
    )
}

/// Decode a Firestore `Document` resource.
pub fn decode_document(resource: &Value) -> Result<Document, StoreError> {
    let name = resource
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::Unexpected("document without a name".to_string()))?;
    let id = name.rsplit('/').next().unwrap_or(name);

    Ok(Document {
        id: DocumentId::new(id),
        fields: decode_fields(resource.get("fields"))?,
    })
}

/// Quote a field name for use in an update mask.
///
/// Simple names (letters, digits, underscore, not starting with a digit) pass
/// through; anything else is wrapped in backticks.
#[must_use]
pub fn field_path(name: &str) -> String {
    let simple = name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');

    if simple {
        name.to_owned()
    } else {
        format!("`{}`", name.replace('\\', "\\\\").replace('`', "\\`"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_document() {
        let resource = json!({
            "name": "projects/p/databases/(default)/documents/users/u1/orders/o42",
            "fields": {
                "total": { "doubleValue": 12.5 },
                "count": { "integerValue": "3" },
                "paid": { "booleanValue": true },
                "createdAt": { "timestampValue": "2026-03-01T10:00:00Z" },
                "items": { "arrayValue": { "values": [{ "stringValue": "apple" }] } },
                "shipTo": { "mapValue": { "fields": { "city": { "stringValue": "Oslo" } } } },
                "note": { "nullValue": null },
                "tags": { "arrayValue": {} }
            },
            "createTime": "2026-03-01T10:00:00Z"
        });

        let doc = decode_document(&resource).unwrap();
        assert_eq!(doc.id, DocumentId::new("o42"));
        assert_eq!(
            Value::Object(doc.fields),
            json!({
                "total": 12.5,
                "count": 3,
                "paid": true,
                "createdAt": "2026-03-01T10:00:00Z",
                "items": ["apple"],
                "shipTo": { "city": "Oslo" },
                "note": null,
                "tags": []
            })
        );
    }

    #[test]
    fn test_decode_empty_document() {
        let doc = decode_document(&json!({ "name": "projects/p/databases/(default)/documents/users/u1" })).unwrap();
        assert_eq!(doc.id, DocumentId::new("u1"));
        assert!(doc.fields.is_empty());
    }

    #[test]
    fn test_decode_rejects_unknown_type() {
        assert!(matches!(
            decode_value(&json!({ "mysteryValue": 1 })),
            Err(StoreError::Unexpected(_))
        ));
    }

    #[test]
    fn test_encode_value() {
        assert_eq!(
            encode_value(&json!({ "qty": 2, "price": 1.5, "tags": ["a"], "gift": false })),
            json!({
                "mapValue": { "fields": {
                    "qty": { "integerValue": "2" },
                    "price": { "doubleValue": 1.5 },
                    "tags": { "arrayValue": { "values": [{ "stringValue": "a" }] } },
                    "gift": { "booleanValue": false }
                } }
            })
        );
    }

    #[test]
    fn test_field_path_quoting() {
        assert_eq!(field_path("displayName"), "displayName");
        assert_eq!(field_path("_private"), "_private");
        assert_eq!(field_path("phone-number"), "`phone-number`");
        assert_eq!(field_path("9lives"), "`9lives`");
    }
}
