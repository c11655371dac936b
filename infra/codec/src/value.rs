//! The closed container model cached values are expressed in.
//!
//! The model deliberately stays narrow: primitives, ordered sequences,
//! string-keyed maps, raw bytes, and a promoted timestamp scalar. Domain
//! types must be converted explicitly by the caller; nothing here inspects
//! or auto-detects user structs. Producers with tuple-like types collapse
//! into the single ordered-sequence form, which is documented behavior of
//! the round-trip rather than a hidden loss.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A cacheable value.
///
/// `Map` keys are unique and sorted (`BTreeMap`), so two maps with the same
/// entries always canonicalize to the same bytes regardless of insertion
/// order. `Sequence` order is significant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    /// Promoted scalar: encoded as an ISO-8601 string by text formats.
    Timestamp(DateTime<Utc>),
    Sequence(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Returns `true` for `Null`.
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, for error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
            Self::Timestamp(_) => "timestamp",
            Self::Sequence(_) => "sequence",
            Self::Map(_) => "map",
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Self::Sequence(v)
    }
}

// Canonical type tags. These feed key fingerprints, so the assignment is
// frozen: reusing or renumbering a tag changes every derived cache key.
const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_TEXT: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_TIMESTAMP: u8 = 0x06;
const TAG_SEQUENCE: u8 = 0x07;
const TAG_MAP: u8 = 0x08;

/// Appends the canonical type-tagged encoding of `value` to `out`.
///
/// The encoding is pure and stable across processes and versions: same value,
/// same bytes. Map entries are emitted in key order; floats are emitted as
/// raw IEEE-754 bits, so `-0.0` and `0.0` fingerprint differently.
pub fn canonical_bytes(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(b) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*b));
        },
        Value::Int(i) => {
            out.push(TAG_INT);
            out.extend_from_slice(&i.to_le_bytes());
        },
        Value::Float(f) => {
            out.push(TAG_FLOAT);
            out.extend_from_slice(&f.to_bits().to_le_bytes());
        },
        Value::Text(s) => {
            out.push(TAG_TEXT);
            push_len(out, s.len());
            out.extend_from_slice(s.as_bytes());
        },
        Value::Bytes(b) => {
            out.push(TAG_BYTES);
            push_len(out, b.len());
            out.extend_from_slice(b);
        },
        Value::Timestamp(ts) => {
            out.push(TAG_TIMESTAMP);
            out.extend_from_slice(&ts.timestamp_micros().to_le_bytes());
        },
        Value::Sequence(items) => {
            out.push(TAG_SEQUENCE);
            push_len(out, items.len());
            for item in items {
                canonical_bytes(item, out);
            }
        },
        Value::Map(entries) => {
            out.push(TAG_MAP);
            push_len(out, entries.len());
            for (key, item) in entries {
                push_len(out, key.len());
                out.extend_from_slice(key.as_bytes());
                canonical_bytes(item, out);
            }
        },
    }
}

fn push_len(out: &mut Vec<u8>, len: usize) {
    out.extend_from_slice(&u32::try_from(len).unwrap_or(u32::MAX).to_le_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canon(value: &Value) -> Vec<u8> {
        let mut out = Vec::new();
        canonical_bytes(value, &mut out);
        out
    }

    #[test]
    fn test_map_order_is_canonical() {
        let mut a = BTreeMap::new();
        a.insert("b".to_owned(), Value::Int(2));
        a.insert("a".to_owned(), Value::Int(1));

        let mut b = BTreeMap::new();
        b.insert("a".to_owned(), Value::Int(1));
        b.insert("b".to_owned(), Value::Int(2));

        assert_eq!(canon(&Value::Map(a)), canon(&Value::Map(b)));
    }

    #[test]
    fn test_type_tags_disambiguate() {
        // The integer 1 and the float 1.0 must never fingerprint identically.
        assert_ne!(canon(&Value::Int(1)), canon(&Value::Float(1.0)));
        // Text "1" differs from the integer 1.
        assert_ne!(canon(&Value::Text("1".into())), canon(&Value::Int(1)));
        // Empty bytes differ from empty text.
        assert_ne!(canon(&Value::Bytes(vec![])), canon(&Value::Text(String::new())));
    }

    #[test]
    fn test_nested_encoding_is_stable() {
        let value = Value::Sequence(vec![
            Value::Null,
            Value::Bool(true),
            Value::Sequence(vec![Value::Int(-7), Value::Text("x".into())]),
        ]);
        assert_eq!(canon(&value), canon(&value.clone()));
    }
}
