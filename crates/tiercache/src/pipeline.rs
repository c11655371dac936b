//! The byte pipeline: serialize → compress → checksum → (encrypt).
//!
//! `encode` produces the opaque blob both tiers store; `decode` reverses
//! it. Decode failures keep their precise kinds (`IntegrityError`,
//! `DecryptionError`, `SerializerMismatch`, `SizeLimitExceeded`) so the
//! handler can decide miss-versus-surface per its policy.

use crate::config::SerializerKind;
use crate::error::CacheError;
use crate::keys::CacheKey;
use std::sync::Arc;
use tiercache_codec::{
    BinarySerializer, ColumnarSerializer, EnvelopeCodec, JsonSerializer, RawNumericSerializer,
    Value, ValueSerializer, check_format_tag,
};
use tiercache_vault::CacheVault;

#[derive(Debug)]
pub(crate) struct Pipeline {
    serializer: Arc<dyn ValueSerializer>,
    codec: EnvelopeCodec,
    vault: Option<CacheVault>,
}

impl Pipeline {
    pub(crate) fn new(kind: SerializerKind, vault: Option<CacheVault>) -> Self {
        let serializer: Arc<dyn ValueSerializer> = match kind {
            SerializerKind::Binary => Arc::new(BinarySerializer),
            SerializerKind::Json => Arc::new(JsonSerializer),
            SerializerKind::Columnar => Arc::new(ColumnarSerializer),
            SerializerKind::RawNumeric => Arc::new(RawNumericSerializer),
        };
        Self { serializer, codec: EnvelopeCodec::default(), vault }
    }

    pub(crate) fn encrypted(&self) -> bool {
        self.vault.is_some()
    }

    /// Value → stored blob for `key`.
    pub(crate) fn encode(&self, key: &CacheKey, value: &Value) -> Result<Vec<u8>, CacheError> {
        let plain = self.serializer.serialize(value)?;
        let envelope = self.codec.store(
            &plain,
            self.serializer.format_tag(),
            self.serializer.compressible(),
        )?;
        match self.vault.as_ref() {
            Some(vault) => Ok(vault.seal(&key.namespace, &envelope, key.as_bytes())?),
            None => Ok(envelope),
        }
    }

    /// Stored blob for `key` → value.
    pub(crate) fn decode(&self, key: &CacheKey, blob: &[u8]) -> Result<Value, CacheError> {
        let envelope = match self.vault.as_ref() {
            Some(vault) => vault.open(&key.namespace, blob, key.as_bytes())?,
            None => blob.to_vec(),
        };
        let unframed = self.codec.retrieve(&envelope)?;
        check_format_tag(self.serializer.as_ref(), &unframed.format_tag)?;
        Ok(self.serializer.deserialize(&unframed.plaintext)?)
    }
}
