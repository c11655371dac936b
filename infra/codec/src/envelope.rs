//! Byte envelope framing.
//!
//! Every value stored in either cache tier travels as one opaque envelope:
//!
//! ```text
//! version(1) || fmt_len(varint) || fmt_tag(fmt_len) || checksum(8, LE) ||
//! original_size(4, LE) || compressed_payload(*)
//! ```
//!
//! The layout is bit-exact cache-compatibility surface: changing it orphans
//! every existing entry. The checksum is xxh3-64 over `compressed_payload`;
//! `original_size` bounds the decompressed output and, together with the
//! ratio guard, rejects decompression bombs before any allocation happens.

use crate::error::CodecError;
use tracing::trace;
use xxhash_rust::xxh3::xxh3_64;

/// Envelope format version emitted by [`EnvelopeCodec::store`].
pub const ENVELOPE_VERSION: u8 = 0x01;

/// Default ceiling for the decompressed payload (512 MiB).
pub const DEFAULT_MAX_UNCOMPRESSED: u32 = 512 * 1024 * 1024;

/// Default ceiling for `original_size / compressed_len`.
pub const DEFAULT_MAX_RATIO: u32 = 100;

/// Plaintexts shorter than this are framed as-is; LZ4 cannot win on them.
pub const DEFAULT_COMPRESS_THRESHOLD: usize = 64;

/// Longest accepted format tag. Tags are short ASCII identifiers; anything
/// longer is a framing error, not a real serializer.
const MAX_FORMAT_TAG_LEN: usize = 64;

/// A parsed envelope: the recovered plaintext and the serializer tag that
/// produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unframed {
    pub plaintext: Vec<u8>,
    pub format_tag: String,
}

/// Frames and unframes compressed, checksummed payloads.
///
/// The codec is stateless and cheap to clone; limits are fixed at
/// construction.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    max_uncompressed: u32,
    max_ratio: u32,
    compress_threshold: usize,
}

impl Default for EnvelopeCodec {
    fn default() -> Self {
        Self {
            max_uncompressed: DEFAULT_MAX_UNCOMPRESSED,
            max_ratio: DEFAULT_MAX_RATIO,
            compress_threshold: DEFAULT_COMPRESS_THRESHOLD,
        }
    }
}

impl EnvelopeCodec {
    /// Creates a codec with explicit bomb-guard limits.
    #[must_use]
    pub const fn new(max_uncompressed: u32, max_ratio: u32, compress_threshold: usize) -> Self {
        Self { max_uncompressed, max_ratio, compress_threshold }
    }

    /// Frames `plaintext` into an envelope.
    ///
    /// The payload is LZ4-compressed when `compressible` is set, the
    /// plaintext reaches the compression threshold, and compression strictly
    /// shrinks it; otherwise the plaintext is framed as-is. Because of the
    /// strict-shrink rule, `payload_len < original_size` is the unambiguous
    /// marker for a compressed payload on the read side.
    ///
    /// # Errors
    /// Returns [`CodecError::SizeLimitExceeded`] if `plaintext` is larger
    /// than the configured decompression ceiling (such an envelope could
    /// never be read back).
    pub fn store(
        &self,
        plaintext: &[u8],
        format_tag: &str,
        compressible: bool,
    ) -> Result<Vec<u8>, CodecError> {
        let original_size = u32::try_from(plaintext.len())
            .ok()
            .filter(|&len| len <= self.max_uncompressed)
            .ok_or_else(|| CodecError::SizeLimitExceeded {
                reason: "plaintext exceeds decompression ceiling".into(),
                original_size: plaintext.len() as u64,
            })?;

        let compressed = if compressible && plaintext.len() >= self.compress_threshold {
            let candidate = lz4_flex::compress(plaintext);
            if candidate.len() < plaintext.len() { Some(candidate) } else { None }
        } else {
            None
        };
        let payload = compressed.as_deref().unwrap_or(plaintext);
        let checksum = xxh3_64(payload);

        let mut out =
            Vec::with_capacity(1 + 5 + format_tag.len() + 8 + 4 + payload.len());
        out.push(ENVELOPE_VERSION);
        write_varint(&mut out, format_tag.len() as u64);
        out.extend_from_slice(format_tag.as_bytes());
        out.extend_from_slice(&checksum.to_le_bytes());
        out.extend_from_slice(&original_size.to_le_bytes());
        out.extend_from_slice(payload);

        trace!(
            format_tag,
            original_size,
            framed = out.len(),
            compressed = compressed.is_some(),
            "Envelope framed"
        );
        Ok(out)
    }

    /// Unframes an envelope back into plaintext and its format tag.
    ///
    /// Validation order matters: structural checks, then size and ratio
    /// guards, then the checksum, and only then decompression, so corrupt
    /// or hostile payloads are rejected before any expensive work.
    ///
    /// # Errors
    /// * [`CodecError::MalformedEnvelope`] on unknown version, truncation,
    ///   or a payload longer than its declared original size.
    /// * [`CodecError::SizeLimitExceeded`] when either bomb guard fires.
    /// * [`CodecError::IntegrityError`] on checksum mismatch.
    pub fn retrieve(&self, envelope: &[u8]) -> Result<Unframed, CodecError> {
        let mut cursor = Cursor { buf: envelope, pos: 0 };

        let version = cursor.take_byte()?;
        if version != ENVELOPE_VERSION {
            return Err(CodecError::MalformedEnvelope {
                reason: format!("unknown envelope version {version:#04x}").into(),
            });
        }

        let tag_len = cursor.take_varint()? as usize;
        if tag_len > MAX_FORMAT_TAG_LEN {
            return Err(CodecError::MalformedEnvelope {
                reason: format!("format tag length {tag_len} exceeds {MAX_FORMAT_TAG_LEN}").into(),
            });
        }
        let format_tag = std::str::from_utf8(cursor.take(tag_len)?)
            .map_err(|_| CodecError::MalformedEnvelope {
                reason: "format tag is not valid UTF-8".into(),
            })?
            .to_owned();

        let expected = u64::from_le_bytes(cursor.take_array::<8>()?);
        let original_size = u32::from_le_bytes(cursor.take_array::<4>()?);
        let payload = cursor.rest();

        if original_size > self.max_uncompressed {
            return Err(CodecError::SizeLimitExceeded {
                reason: "declared original size exceeds ceiling".into(),
                original_size: u64::from(original_size),
            });
        }
        let ratio = u64::from(original_size) / std::cmp::max(1, payload.len() as u64);
        if ratio > u64::from(self.max_ratio) {
            return Err(CodecError::SizeLimitExceeded {
                reason: format!("compression ratio {ratio} exceeds {}", self.max_ratio).into(),
                original_size: u64::from(original_size),
            });
        }

        let actual = xxh3_64(payload);
        if actual != expected {
            return Err(CodecError::IntegrityError { expected, actual });
        }

        let original_size = original_size as usize;
        let plaintext = match payload.len().cmp(&original_size) {
            std::cmp::Ordering::Equal => payload.to_vec(),
            std::cmp::Ordering::Less => lz4_flex::decompress(payload, original_size)
                .map_err(|err| CodecError::MalformedEnvelope {
                    reason: format!("lz4 decompression failed: {err}").into(),
                })?,
            std::cmp::Ordering::Greater => {
                return Err(CodecError::MalformedEnvelope {
                    reason: "payload longer than declared original size".into(),
                });
            },
        };

        Ok(Unframed { plaintext, format_tag })
    }

    /// Reads only the format tag without touching the payload.
    ///
    /// Used to detect serializer mismatches before decode work is spent.
    ///
    /// # Errors
    /// Returns [`CodecError::MalformedEnvelope`] on structural problems.
    pub fn peek_format_tag(envelope: &[u8]) -> Result<&str, CodecError> {
        let mut cursor = Cursor { buf: envelope, pos: 0 };
        let version = cursor.take_byte()?;
        if version != ENVELOPE_VERSION {
            return Err(CodecError::MalformedEnvelope {
                reason: format!("unknown envelope version {version:#04x}").into(),
            });
        }
        let tag_len = cursor.take_varint()? as usize;
        if tag_len > MAX_FORMAT_TAG_LEN {
            return Err(CodecError::MalformedEnvelope {
                reason: format!("format tag length {tag_len} exceeds {MAX_FORMAT_TAG_LEN}").into(),
            });
        }
        std::str::from_utf8(cursor.take(tag_len)?).map_err(|_| CodecError::MalformedEnvelope {
            reason: "format tag is not valid UTF-8".into(),
        })
    }
}

struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos.checked_add(len).filter(|&end| end <= self.buf.len()).ok_or(
            CodecError::MalformedEnvelope { reason: "truncated envelope".into() },
        )?;
        let slice = &self.buf[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_byte(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N], CodecError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn take_varint(&mut self) -> Result<u64, CodecError> {
        let mut value: u64 = 0;
        for shift in (0..64).step_by(7) {
            let byte = self.take_byte()?;
            value |= u64::from(byte & 0x7f) << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::MalformedEnvelope { reason: "unterminated varint".into() })
    }

    fn rest(self) -> &'a [u8] {
        &self.buf[self.pos..]
    }
}

fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_compressed() {
        let codec = EnvelopeCodec::default();
        let plaintext = vec![42u8; 4096];

        let envelope = codec.store(&plaintext, "bin1", true).unwrap();
        assert!(envelope.len() < plaintext.len(), "repetitive payload should compress");

        let unframed = codec.retrieve(&envelope).unwrap();
        assert_eq!(unframed.plaintext, plaintext);
        assert_eq!(unframed.format_tag, "bin1");
    }

    #[test]
    fn test_roundtrip_passthrough_below_threshold() {
        let codec = EnvelopeCodec::default();
        let plaintext = b"tiny".to_vec();

        let envelope = codec.store(&plaintext, "json1", true).unwrap();
        let unframed = codec.retrieve(&envelope).unwrap();
        assert_eq!(unframed.plaintext, plaintext);
    }

    #[test]
    fn test_incompressible_payload_passes_through() {
        let codec = EnvelopeCodec::default();
        // A byte ramp long enough to clear the threshold but with no repetition
        // LZ4 can exploit.
        let plaintext: Vec<u8> = (0..=255u8).cycle().take(1024).enumerate()
            .map(|(i, b)| b.wrapping_mul(i as u8 | 1))
            .collect();

        let envelope = codec.store(&plaintext, "num1", false).unwrap();
        let unframed = codec.retrieve(&envelope).unwrap();
        assert_eq!(unframed.plaintext, plaintext);
    }

    #[test]
    fn test_unknown_version_rejected() {
        let codec = EnvelopeCodec::default();
        let mut envelope = codec.store(b"payload-payload-payload", "bin1", true).unwrap();
        envelope[0] = 0x7f;

        assert!(matches!(
            codec.retrieve(&envelope),
            Err(CodecError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn test_truncation_rejected() {
        let codec = EnvelopeCodec::default();
        let envelope = codec.store(b"some payload bytes", "bin1", true).unwrap();

        for cut in [0, 1, 3, envelope.len() / 2] {
            let result = codec.retrieve(&envelope[..cut]);
            assert!(result.is_err(), "truncation at {cut} must not parse");
        }
    }

    #[test]
    fn test_bit_flip_in_payload_is_integrity_error() {
        let codec = EnvelopeCodec::default();
        let plaintext = vec![7u8; 2048];
        let envelope = codec.store(&plaintext, "bin1", true).unwrap();

        // Header: version(1) + varint(1) + "bin1"(4) + checksum(8) + size(4).
        let payload_start = 18;
        for pos in payload_start..envelope.len() {
            let mut tampered = envelope.clone();
            tampered[pos] ^= 0x01;
            assert!(
                matches!(codec.retrieve(&tampered), Err(CodecError::IntegrityError { .. })),
                "flip at {pos} must fail the checksum"
            );
        }
    }

    #[test]
    fn test_bit_flip_in_checksum_is_integrity_error() {
        let codec = EnvelopeCodec::default();
        let envelope = codec.store(&vec![9u8; 512], "bin1", true).unwrap();

        // checksum occupies 8 bytes after version + varint(4) + "bin1"
        let checksum_start = 1 + 1 + 4;
        for pos in checksum_start..checksum_start + 8 {
            let mut tampered = envelope.clone();
            tampered[pos] ^= 0x80;
            assert!(matches!(
                codec.retrieve(&tampered),
                Err(CodecError::IntegrityError { .. })
            ));
        }
    }

    #[test]
    fn test_decompression_bomb_rejected_by_size() {
        let codec = EnvelopeCodec::default();
        // Hand-craft an envelope declaring a 2^31 original size with a 4-byte payload.
        let payload = [0u8; 4];
        let mut envelope = vec![ENVELOPE_VERSION];
        envelope.push(4); // varint tag length
        envelope.extend_from_slice(b"bin1");
        envelope.extend_from_slice(&xxh3_64(&payload).to_le_bytes());
        envelope.extend_from_slice(&(2u32.pow(31)).to_le_bytes());
        envelope.extend_from_slice(&payload);

        assert!(matches!(
            codec.retrieve(&envelope),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_implausible_ratio_rejected() {
        let codec = EnvelopeCodec::default();
        let payload = [0u8; 4];
        let mut envelope = vec![ENVELOPE_VERSION];
        envelope.push(4);
        envelope.extend_from_slice(b"bin1");
        envelope.extend_from_slice(&xxh3_64(&payload).to_le_bytes());
        // 1 MiB from 4 bytes: under the absolute ceiling, far over the ratio.
        envelope.extend_from_slice(&(1024u32 * 1024).to_le_bytes());
        envelope.extend_from_slice(&payload);

        assert!(matches!(
            codec.retrieve(&envelope),
            Err(CodecError::SizeLimitExceeded { .. })
        ));
    }

    #[test]
    fn test_payload_longer_than_original_is_malformed() {
        let codec = EnvelopeCodec::default();
        let payload = [1u8, 2, 3, 4, 5, 6, 7, 8];
        let mut envelope = vec![ENVELOPE_VERSION];
        envelope.push(4);
        envelope.extend_from_slice(b"bin1");
        envelope.extend_from_slice(&xxh3_64(&payload).to_le_bytes());
        envelope.extend_from_slice(&4u32.to_le_bytes());
        envelope.extend_from_slice(&payload);

        assert!(matches!(
            codec.retrieve(&envelope),
            Err(CodecError::MalformedEnvelope { .. })
        ));
    }

    #[test]
    fn test_peek_format_tag() {
        let codec = EnvelopeCodec::default();
        let envelope = codec.store(b"x", "col1", true).unwrap();
        assert_eq!(EnvelopeCodec::peek_format_tag(&envelope).unwrap(), "col1");
    }
}
