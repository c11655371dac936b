//! JSON fast path for JSON-compatible data.

use crate::error::CodecError;
use crate::serializer::ValueSerializer;
use crate::value::Value;
use std::collections::BTreeMap;

/// UTF-8 JSON encoding for values that JSON can represent.
///
/// Documented collapses of the round-trip:
/// * `Timestamp` is emitted as an ISO-8601 string and comes back as `Text`.
/// * Integral JSON numbers decode as `Int`, everything else as `Float`.
///
/// `Bytes` has no JSON representation and fails explicitly; base64
/// smuggling would silently change the value's type on the way back.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    pub const FORMAT_TAG: &'static str = "json1";
}

impl ValueSerializer for JsonSerializer {
    fn format_tag(&self) -> &'static str {
        Self::FORMAT_TAG
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let json = to_json(value)?;
        serde_json::to_vec(&json).map_err(|err| CodecError::Encode {
            serializer: Self::FORMAT_TAG,
            reason: err.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let json: serde_json::Value =
            serde_json::from_slice(bytes).map_err(|err| CodecError::Decode {
                serializer: Self::FORMAT_TAG,
                reason: err.to_string(),
            })?;
        from_json(json)
    }
}

fn to_json(value: &Value) -> Result<serde_json::Value, CodecError> {
    use serde_json::Value as Json;
    Ok(match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Int(i) => Json::from(*i),
        Value::Float(f) => serde_json::Number::from_f64(*f).map(Json::Number).ok_or_else(|| {
            CodecError::UnsupportedValue {
                serializer: JsonSerializer::FORMAT_TAG,
                reason: "non-finite float has no JSON representation".into(),
            }
        })?,
        Value::Text(s) => Json::String(s.clone()),
        Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
        Value::Bytes(_) => {
            return Err(CodecError::UnsupportedValue {
                serializer: JsonSerializer::FORMAT_TAG,
                reason: "raw bytes are not JSON-compatible; use the binary serializer".into(),
            });
        },
        Value::Sequence(items) => {
            Json::Array(items.iter().map(to_json).collect::<Result<_, _>>()?)
        },
        Value::Map(entries) => Json::Object(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), to_json(v)?)))
                .collect::<Result<_, CodecError>>()?,
        ),
    })
}

fn from_json(json: serde_json::Value) -> Result<Value, CodecError> {
    use serde_json::Value as Json;
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(b),
        Json::Number(n) => n.as_i64().map_or_else(
            || Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            Value::Int,
        ),
        Json::String(s) => Value::Text(s),
        Json::Array(items) => {
            Value::Sequence(items.into_iter().map(from_json).collect::<Result<_, _>>()?)
        },
        Json::Object(entries) => Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| Ok((k, from_json(v)?)))
                .collect::<Result<BTreeMap<_, _>, CodecError>>()?,
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_roundtrip_json_compatible() {
        let serializer = JsonSerializer;
        let mut map = BTreeMap::new();
        map.insert("id".to_owned(), Value::Int(7));
        map.insert("score".to_owned(), Value::Float(0.25));
        map.insert("name".to_owned(), Value::Text("ada".into()));
        let value = Value::Map(map);

        let bytes = serializer.serialize(&value).unwrap();
        assert_eq!(serializer.deserialize(&bytes).unwrap(), value);
    }

    #[test]
    fn test_output_is_utf8_text() {
        let bytes = JsonSerializer.serialize(&Value::Sequence(vec![Value::Int(1)])).unwrap();
        assert_eq!(std::str::from_utf8(&bytes).unwrap(), "[1]");
    }

    #[test]
    fn test_bytes_rejected() {
        let result = JsonSerializer.serialize(&Value::Bytes(vec![1, 2, 3]));
        assert!(matches!(result, Err(CodecError::UnsupportedValue { .. })));
    }

    #[test]
    fn test_timestamp_collapses_to_text() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let bytes = JsonSerializer.serialize(&Value::Timestamp(ts)).unwrap();
        let back = JsonSerializer.deserialize(&bytes).unwrap();
        assert_eq!(back, Value::Text(ts.to_rfc3339()));
    }
}
