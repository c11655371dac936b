//! General-purpose binary serializer (postcard).

use crate::error::CodecError;
use crate::serializer::ValueSerializer;
use crate::value::Value;

/// Schema-less compact binary encoding of the full container model.
///
/// This is the default strategy: it admits every [`Value`] and round-trips
/// all of them exactly. Tuple-like producer types have already collapsed
/// into the ordered-sequence form by the time they reach this layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct BinarySerializer;

impl BinarySerializer {
    pub const FORMAT_TAG: &'static str = "bin1";
}

impl ValueSerializer for BinarySerializer {
    fn format_tag(&self) -> &'static str {
        Self::FORMAT_TAG
    }

    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError> {
        postcard::to_stdvec(value).map_err(|err| CodecError::Encode {
            serializer: Self::FORMAT_TAG,
            reason: err.to_string(),
        })
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError> {
        postcard::from_bytes(bytes).map_err(|err| CodecError::Decode {
            serializer: Self::FORMAT_TAG,
            reason: err.to_string(),
        })
    }
}
