//! Raw fast path for dense numeric arrays.

use crate::error::CodecError;
use crate::serializer::ValueSerializer;
use crate::value::Value;

/// Typed header + raw little-endian bytes for dense numeric data.
///
/// Admits homogeneous `Int` or `Float` sequences and raw `Bytes`. The
/// output is already dense, so [`ValueSerializer::compressible`] is `false`
/// and the envelope codec frames it pass-through instead of burning CPU on
/// LZ4 for no gain.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawNumericSerializer;

impl RawNumericSerializer {
    pub const FORMAT_TAG: &'static str = "num1";
}

const ELEM_I64: u8 = 0;
const ELEM_F64: u8 = 1;
const ELEM_U8: u8 = 2;

impl ValueSerializer for RawNumericSerializer {
    fn format_tag(&self) -> &'static str {
        Self::FORMAT_TAG
    }

    fn compressible(&self) -> bool {
        false
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        match value {
            Value::Bytes(bytes) => {
                let mut out = header(ELEM_U8, bytes.len())?;
                out.extend_from_slice(bytes);
                Ok(out)
            },
            Value::Sequence(items) if items.iter().all(|v| matches!(v, Value::Int(_))) => {
                let mut out = header(ELEM_I64, items.len())?;
                for item in items {
                    if let Value::Int(i) = item {
                        out.extend_from_slice(&i.to_le_bytes());
                    }
                }
                Ok(out)
            },
            Value::Sequence(items) if items.iter().all(|v| matches!(v, Value::Float(_))) => {
                let mut out = header(ELEM_F64, items.len())?;
                for item in items {
                    if let Value::Float(f) = item {
                        out.extend_from_slice(&f.to_le_bytes());
                    }
                }
                Ok(out)
            },
            other => Err(CodecError::UnsupportedValue {
                serializer: Self::FORMAT_TAG,
                reason: format!(
                    "expected a homogeneous numeric sequence or bytes, got {}",
                    other.kind()
                )
                .into(),
            }),
        }
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        if bytes.len() < 5 {
            return Err(decode_error("header truncated".to_owned()));
        }
        let elem = bytes[0];
        let count =
            u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]]) as usize;
        let body = &bytes[5..];

        match elem {
            ELEM_U8 => {
                if body.len() != count {
                    return Err(decode_error(format!(
                        "expected {count} bytes, found {}",
                        body.len()
                    )));
                }
                Ok(Value::Bytes(body.to_vec()))
            },
            ELEM_I64 => {
                let items = read_chunks(body, count, "i64")?
                    .map(|chunk| Value::Int(i64::from_le_bytes(chunk)))
                    .collect();
                Ok(Value::Sequence(items))
            },
            ELEM_F64 => {
                let items = read_chunks(body, count, "f64")?
                    .map(|chunk| Value::Float(f64::from_le_bytes(chunk)))
                    .collect();
                Ok(Value::Sequence(items))
            },
            other => Err(decode_error(format!("unknown element tag {other:#04x}"))),
        }
    }
}

fn header(elem: u8, count: usize) -> Result<Vec<u8>, CodecError> {
    let count = u32::try_from(count).map_err(|_| CodecError::Encode {
        serializer: RawNumericSerializer::FORMAT_TAG,
        reason: "array exceeds u32 element count".to_owned(),
    })?;
    let mut out = Vec::with_capacity(5 + count as usize * 8);
    out.push(elem);
    out.extend_from_slice(&count.to_le_bytes());
    Ok(out)
}

fn read_chunks<'a>(
    body: &'a [u8],
    count: usize,
    kind: &str,
) -> Result<impl Iterator<Item = [u8; 8]> + 'a, CodecError> {
    if body.len() != count * 8 {
        return Err(decode_error(format!(
            "expected {count} {kind} elements ({} bytes), found {}",
            count * 8,
            body.len()
        )));
    }
    Ok(body.chunks_exact(8).map(|chunk| {
        let mut array = [0u8; 8];
        array.copy_from_slice(chunk);
        array
    }))
}

fn decode_error(reason: String) -> CodecError {
    CodecError::Decode { serializer: RawNumericSerializer::FORMAT_TAG, reason }
}
