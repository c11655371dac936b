//! The serializer strategy contract.

use crate::error::CodecError;
use crate::value::Value;

/// Converts cache values to bytes and back.
///
/// Implementations are strategies chosen at configuration time. The format
/// tag a serializer emits is stamped into every envelope it produces; on
/// read, a tag that does not match the configured serializer is a
/// [`CodecError::SerializerMismatch`], which the cache handler treats as a
/// miss on the hot path and surfaces on explicit decode.
pub trait ValueSerializer: Send + Sync + std::fmt::Debug {
    /// Short stable identifier stamped into envelopes.
    fn format_tag(&self) -> &'static str;

    /// Whether the envelope codec should attempt LZ4 on this serializer's
    /// output. Dense binary formats opt out.
    fn compressible(&self) -> bool {
        true
    }

    /// Encodes an admissible value.
    fn serialize(&self, value: &Value) -> Result<Vec<u8>, CodecError>;

    /// Decodes bytes this serializer produced.
    fn deserialize(&self, bytes: &[u8]) -> Result<Value, CodecError>;
}

/// Ensures `found` is the tag of the configured serializer.
///
/// # Errors
/// Returns [`CodecError::SerializerMismatch`] otherwise.
pub fn check_format_tag(serializer: &dyn ValueSerializer, found: &str) -> Result<(), CodecError> {
    if found == serializer.format_tag() {
        Ok(())
    } else {
        Err(CodecError::SerializerMismatch {
            expected: serializer.format_tag().into(),
            found: found.to_owned(),
        })
    }
}
