//! Conversion between plain JSON and Firestore's typed REST values
//! (`{"stringValue": "..."}`, `{"mapValue": {"fields": {...}}}`, ...).

use serde_json::{Map, Number, Value, json};

use crate::domain::documents::document::Fields;

pub fn encode(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                // int64 travels as a decimal string.
                json!({ "integerValue": i.to_string() })
            } else {
                json!({ "doubleValue": n.as_f64().unwrap_or_default() })
            }
        }
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(items) => {
            json!({ "arrayValue": { "values": items.iter().map(encode).collect::<Vec<_>>() } })
        }
        Value::Object(map) => json!({ "mapValue": { "fields": encode_fields(map) } }),
    }
}

pub fn encode_fields(fields: &Fields) -> Value {
    Value::Object(
        fields
            .iter()
            .map(|(k, v)| (k.clone(), encode(v)))
            .collect::<Map<String, Value>>(),
    )
}

pub fn decode(value: &Value) -> Value {
    let Some(obj) = value.as_object() else {
        return Value::Null;
    };
    let Some((kind, inner)) = obj.iter().next() else {
        return Value::Null;
    };
    match kind.as_str() {
        "nullValue" => Value::Null,
        "booleanValue" => Value::Bool(inner.as_bool().unwrap_or_default()),
        "integerValue" => match inner {
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(Value::Null),
            Value::Number(n) => Value::Number(n.clone()),
            _ => Value::Null,
        },
        // Whole doubles stay floats so a write-back keeps `doubleValue`.
        "doubleValue" => match inner {
            Value::Number(n) => n
                .as_f64()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            // "NaN" / "Infinity" have no JSON representation.
            _ => Value::Null,
        },
        "stringValue" | "timestampValue" | "referenceValue" | "bytesValue" => inner.clone(),
        "geoPointValue" => json!({
            "latitude": inner.get("latitude").cloned().unwrap_or(json!(0.0)),
            "longitude": inner.get("longitude").cloned().unwrap_or(json!(0.0)),
        }),
        "arrayValue" => Value::Array(
            inner
                .get("values")
                .and_then(Value::as_array)
                .map(|items| items.iter().map(decode).collect())
                .unwrap_or_default(),
        ),
        "mapValue" => Value::Object(
            inner
                .get("fields")
                .map(decode_fields)
                .unwrap_or_default(),
        ),
        _ => Value::Null,
    }
}

pub fn decode_fields(fields: &Value) -> Fields {
    fields
        .as_object()
        .map(|map| map.iter().map(|(k, v)| (k.clone(), decode(v))).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_scalars_with_firestore_type_tags() {
        assert_eq!(encode(&json!(42)), json!({"integerValue": "42"}));
        assert_eq!(encode(&json!(1.5)), json!({"doubleValue": 1.5}));
        assert_eq!(encode(&json!("todo")), json!({"stringValue": "todo"}));
        assert_eq!(encode(&json!(null)), json!({"nullValue": null}));
    }

    #[test]
    fn encodes_nested_structures() {
        let encoded = encode(&json!({"tags": ["a"], "meta": {"done": true}}));
        assert_eq!(
            encoded,
            json!({"mapValue": {"fields": {
                "tags": {"arrayValue": {"values": [{"stringValue": "a"}]}},
                "meta": {"mapValue": {"fields": {"done": {"booleanValue": true}}}}
            }}})
        );
    }

    #[test]
    fn decodes_server_values() {
        let fields = json!({
            "title": {"stringValue": "Backlog"},
            "order": {"integerValue": "7"},
            "weight": {"doubleValue": 0.25},
            "createdAt": {"timestampValue": "2024-05-01T10:00:00Z"},
            "empty": {"arrayValue": {}},
            "where": {"geoPointValue": {"latitude": 1.0, "longitude": 2.0}}
        });
        let decoded = decode_fields(&fields);
        assert_eq!(
            Value::Object(decoded),
            json!({
                "title": "Backlog",
                "order": 7,
                "weight": 0.25,
                "createdAt": "2024-05-01T10:00:00Z",
                "empty": [],
                "where": {"latitude": 1.0, "longitude": 2.0}
            })
        );
    }

    #[test]
    fn whole_doubles_keep_their_type() {
        let decoded = decode(&json!({"doubleValue": 1}));
        assert!(decoded.is_f64());
        assert_eq!(encode(&decoded), json!({"doubleValue": 1.0}));
        assert_eq!(
            encode(&decode(&json!({"integerValue": "1"}))),
            json!({"integerValue": "1"})
        );
    }

    #[test]
    fn decode_is_inverse_of_encode_for_plain_json() {
        let plain = json!({"a": [1, "two", {"three": false}], "b": null});
        let fields = plain.as_object().cloned().unwrap();
        assert_eq!(Value::Object(decode_fields(&encode_fields(&fields))), plain);
    }
}
