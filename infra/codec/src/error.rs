//! Error types for envelope framing and serializer strategies.

use std::borrow::Cow;

/// Failures produced while framing, unframing, or (de)serializing payloads.
///
/// None of these are silently recovered at this layer; the cache handler
/// decides whether a failure is surfaced or treated as a miss.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The envelope frame is structurally invalid: unknown version byte,
    /// truncated header, or a payload longer than its declared original size.
    #[error("malformed envelope: {reason}")]
    MalformedEnvelope { reason: Cow<'static, str> },

    /// The envelope declares a decompressed size beyond the configured
    /// bounds, or an implausible compression ratio.
    #[error("envelope exceeds decompression bounds ({reason}): original_size={original_size}")]
    SizeLimitExceeded { reason: Cow<'static, str>, original_size: u64 },

    /// The payload checksum does not match the framed checksum.
    #[error("payload checksum mismatch: expected {expected:016x}, got {actual:016x}")]
    IntegrityError { expected: u64, actual: u64 },

    /// The envelope was produced by a different serializer than the one
    /// currently configured.
    #[error("serializer mismatch: envelope carries {found:?}, configured {expected:?}")]
    SerializerMismatch { expected: Cow<'static, str>, found: String },

    /// The value cannot be represented by the chosen serializer.
    #[error("{serializer} serializer cannot encode this value: {reason}")]
    UnsupportedValue { serializer: &'static str, reason: Cow<'static, str> },

    /// The serializer failed to encode an admissible value.
    #[error("{serializer} encoding failed: {reason}")]
    Encode { serializer: &'static str, reason: String },

    /// The serializer failed to decode bytes it claims to understand.
    #[error("{serializer} decoding failed: {reason}")]
    Decode { serializer: &'static str, reason: String },
}
