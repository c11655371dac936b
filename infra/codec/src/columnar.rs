//! Columnar encoding for table-shaped values.

use crate::error::CodecError;
use crate::serializer::ValueSerializer;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Columnar encoding for sequences of uniform maps ("tables").
///
/// A table is a `Sequence` whose items are all `Map`s over the same key set.
/// Rows are transposed into typed columns, so a 100k-row result set of
/// homogeneous columns encodes as a handful of dense arrays instead of 100k
/// small maps. Scalar and non-uniform inputs are rejected; this strategy is
/// opt-in for callers that know their values are tables.
#[derive(Debug, Clone, Copy, Default)]
pub struct ColumnarSerializer;

impl ColumnarSerializer {
    pub const FORMAT_TAG: &'static str = "col1";
}

#[derive(Debug, Serialize, Deserialize)]
struct Table {
    rows: u32,
    columns: Vec<(String, Column)>,
}

/// A column promoted to its densest uniform representation.
#[derive(Debug, Serialize, Deserialize)]
enum Column {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Text(Vec<String>),
    /// Fallback for columns that mix types or contain nulls.
    Mixed(Vec<Value>),
}

impl Column {
    fn from_values(values: Vec<Value>) -> Self {
        if values.iter().all(|v| matches!(v, Value::Bool(_))) {
            return Self::Bool(
                values.into_iter().map(|v| if let Value::Bool(b) = v { b } else { false }).collect(),
            );
        }
        if values.iter().all(|v| matches!(v, Value::Int(_))) {
            return Self::Int(
                values.into_iter().map(|v| if let Value::Int(i) = v { i } else { 0 }).collect(),
            );
        }
        if values.iter().all(|v| matches!(v, Value::Float(_))) {
            return Self::Float(
                values.into_iter().map(|v| if let Value::Float(f) = v { f } else { 0.0 }).collect(),
            );
        }
        if values.iter().all(|v| matches!(v, Value::Text(_))) {
            return Self::Text(
                values
                    .into_iter()
                    .map(|v| if let Value::Text(s) = v { s } else { String::new() })
                    .collect(),
            );
        }
        Self::Mixed(values)
    }

    fn into_values(self) -> Vec<Value> {
        match self {
            Self::Bool(items) => items.into_iter().map(Value::Bool).collect(),
            Self::Int(items) => items.into_iter().map(Value::Int).collect(),
            Self::Float(items) => items.into_iter().map(Value::Float).collect(),
            Self::Text(items) => items.into_iter().map(Value::Text).collect(),
            Self::Mixed(items) => items,
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Bool(items) => items.len(),
            Self::Int(items) => items.len(),
            Self::Float(items) => items.len(),
            Self::Text(items) => items.len(),
            Self::Mixed(items) => items.len(),
        }
    }
}

impl ValueSerializer for ColumnarSerializer {
    fn format_tag(&self) -> &'static str {
        Self::FORMAT_TAG
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        let table = to_table(value)?;
        postcard::to_stdvec(&table).map_err(|err| CodecError::Encode {
            serializer: Self::FORMAT_TAG,
            reason: err.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        let table: Table = postcard::from_bytes(bytes).map_err(|err| CodecError::Decode {
            serializer: Self::FORMAT_TAG,
            reason: err.to_string(),
        })?;
        from_table(table)
    }
}

fn to_table(value: &Value) -> Result<Table, CodecError> {
    let Value::Sequence(rows) = value else {
        return Err(reject(format!("expected a sequence of maps, got {}", value.kind())));
    };

    let Some(Value::Map(first)) = rows.first() else {
        // An empty sequence is a legal zero-row, zero-column table.
        if rows.is_empty() {
            return Ok(Table { rows: 0, columns: Vec::new() });
        }
        return Err(reject(format!(
            "expected a sequence of maps, first item is {}",
            rows[0].kind()
        )));
    };

    let names: Vec<&String> = first.keys().collect();
    let mut columns: Vec<Vec<Value>> = names.iter().map(|_| Vec::with_capacity(rows.len())).collect();

    for (index, row) in rows.iter().enumerate() {
        let Value::Map(entries) = row else {
            return Err(reject(format!("row {index} is {}, not a map", row.kind())));
        };
        if entries.len() != names.len() || !names.iter().all(|name| entries.contains_key(*name)) {
            return Err(reject(format!("row {index} does not match the table's key set")));
        }
        for (slot, name) in columns.iter_mut().zip(&names) {
            slot.push(entries[*name].clone());
        }
    }

    let rows_len = u32::try_from(rows.len())
        .map_err(|_| reject("table exceeds u32 row count".to_owned()))?;
    Ok(Table {
        rows: rows_len,
        columns: names
            .into_iter()
            .cloned()
            .zip(columns.into_iter().map(Column::from_values))
            .collect(),
    })
}

fn from_table(table: Table) -> Result<Value, CodecError> {
    let rows = table.rows as usize;
    for (name, column) in &table.columns {
        if column.len() != rows {
            return Err(CodecError::Decode {
                serializer: ColumnarSerializer::FORMAT_TAG,
                reason: format!("column {name:?} has {} values for {rows} rows", column.len()),
            });
        }
    }

    let mut out: Vec<BTreeMap<String, Value>> = (0..rows).map(|_| BTreeMap::new()).collect();
    for (name, column) in table.columns {
        for (row, item) in out.iter_mut().zip(column.into_values()) {
            row.insert(name.clone(), item);
        }
    }
    Ok(Value::Sequence(out.into_iter().map(Value::Map).collect()))
}

fn reject(reason: String) -> CodecError {
    CodecError::UnsupportedValue { serializer: ColumnarSerializer::FORMAT_TAG, reason: reason.into() }
}
