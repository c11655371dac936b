//! Byte envelope codec and serializer strategies.
//!
//! This crate owns the byte pipeline both cache tiers store: a value from
//! the closed container model ([`Value`]) is serialized by a pluggable
//! strategy, then framed by the [`EnvelopeCodec`] with LZ4 compression, an
//! xxh3-64 checksum, and the declared original size. The frame is the
//! cache-compatibility surface; encryption (a separate crate) wraps the
//! finished envelope without looking inside it.
//!
//! # Core Features
//!
//! - **Bit-exact framing**: `version || fmt_tag || checksum || original_size || payload`.
//! - **Bomb guards**: absolute decompressed-size ceiling and compression-ratio
//!   ceiling, both checked before decompression allocates anything.
//! - **Strategy serializers**: general binary (postcard), JSON fast path,
//!   columnar tables, raw numeric arrays. The chosen strategy's tag is
//!   stamped into every envelope it produces.
//! - **Loud failures**: malformed frames, checksum mismatches, and
//!   inadmissible values are reported, never papered over.
//!
//! # Example
//!
//! ```rust
//! use tiercache_codec::{BinarySerializer, EnvelopeCodec, Value, ValueSerializer};
//!
//! # fn main() -> Result<(), tiercache_codec::CodecError> {
//! let serializer = BinarySerializer;
//! let codec = EnvelopeCodec::default();
//!
//! let value = Value::Sequence(vec![Value::Int(1), Value::Text("two".into())]);
//! let plain = serializer.serialize(&value)?;
//! let envelope = codec.store(&plain, serializer.format_tag(), serializer.compressible())?;
//!
//! let unframed = codec.retrieve(&envelope)?;
//! assert_eq!(unframed.format_tag, "bin1");
//! assert_eq!(serializer.deserialize(&unframed.plaintext)?, value);
//! # Ok(())
//! # }
//! ```

mod binary;
mod columnar;
mod envelope;
mod error;
mod json;
mod numeric;
mod serializer;
mod value;

pub use binary::BinarySerializer;
pub use columnar::ColumnarSerializer;
pub use envelope::{
    DEFAULT_COMPRESS_THRESHOLD, DEFAULT_MAX_RATIO, DEFAULT_MAX_UNCOMPRESSED, ENVELOPE_VERSION,
    EnvelopeCodec, Unframed,
};
pub use error::CodecError;
pub use json::JsonSerializer;
pub use numeric::RawNumericSerializer;
pub use serializer::{ValueSerializer, check_format_tag};
pub use value::{Value, canonical_bytes};
