use aead::inout::InOutBuf;
use aead::{AeadInOut, Key, KeyInit, Nonce};
use aes_gcm::Aes256Gcm;
use fxhash::FxHashMap;
use hkdf::Hkdf;
use parking_lot::RwLock;
use sha2::Sha256;
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::builder::{NoKey, VaultBuilder};
use crate::error::VaultError;
use crate::nonce::{NONCE_LEN, NonceSequence};

/// AEAD tag length (128-bit).
pub(crate) const TAG_LEN: usize = 16;

/// Bytes a sealed payload adds on top of the envelope: nonce + tag.
pub const SEALED_OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// Domain-separation salt for the HKDF extract step. Frozen: changing it
/// re-keys every namespace and orphans all sealed entries.
const HKDF_SALT: &[u8] = b"tiercache/v1";

/// Per-namespace key info prefix for the HKDF expand step.
const KEY_INFO_PREFIX: &[u8] = b"k_ns:";

/// The internal shared state of a [`CacheVault`].
pub struct VaultInner {
    /// Master secrets: the current one first, retired ones after, in the
    /// order decryption should try them.
    pub(crate) masters: Vec<Zeroizing<Vec<u8>>>,
    pub(crate) nonces: NonceSequence,
    /// Derived per-namespace ciphers, one per master, cached after first use.
    pub(crate) ciphers: RwLock<FxHashMap<String, Arc<Vec<Aes256Gcm>>>>,
}

impl std::fmt::Debug for VaultInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material is intentionally absent from the Debug output.
        f.debug_struct("VaultInner")
            .field("masters", &self.masters.len())
            .field("namespaces", &self.ciphers.read().len())
            .finish_non_exhaustive()
    }
}

/// A thread-safe AEAD wrapper for cache envelopes.
///
/// `CacheVault` seals finished byte envelopes into
/// `nonce(12) || ciphertext || tag(16)` blobs with AES-256-GCM, binding each
/// blob to its cache key through the associated data. Every namespace gets
/// its own key, derived once via HKDF-SHA256 from the master secret, so
/// namespaces are cryptographically isolated from one another and the L2
/// store never observes plaintext.
///
/// The handle is internally reference-counted and cheap to clone across
/// threads or tasks.
///
/// # Example
///
/// ```rust
/// use tiercache_vault::CacheVault;
///
/// # fn main() -> Result<(), tiercache_vault::VaultError> {
/// let vault = CacheVault::builder()
///     .master_key([7u8; 32])?
///     .build()?;
///
/// let cache_key = b"ns:users:func:profile:args:00ff";
/// let sealed = vault.seal("users", b"envelope bytes", cache_key)?;
/// let opened = vault.open("users", &sealed, cache_key)?;
/// assert_eq!(opened, b"envelope bytes");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CacheVault {
    pub(crate) inner: Arc<VaultInner>,
}

impl CacheVault {
    /// Returns a new [`VaultBuilder`].
    #[must_use]
    pub fn builder() -> VaultBuilder<NoKey> {
        VaultBuilder::new()
    }

    /// Seals an envelope under the namespace key, bound to `aad`.
    ///
    /// `aad` is the full cache key in UTF-8; moving a sealed blob to a
    /// different key makes it undecryptable.
    ///
    /// # Errors
    /// * [`VaultError::Encryption`] if the AEAD core fails.
    /// * [`VaultError::InvalidConfiguration`] if key derivation fails.
    pub fn seal(&self, namespace: &str, envelope: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        let ciphers = self.ciphers_for(namespace)?;
        // New writes always use the current master key.
        let cipher = &ciphers[0];

        let nonce_bytes = self.inner.nonces.next();
        let nonce = Nonce::<Aes256Gcm>::try_from(&nonce_bytes[..]).map_err(|_| {
            VaultError::Encryption { namespace: namespace.to_owned() }
        })?;

        let mut buf = Vec::with_capacity(SEALED_OVERHEAD + envelope.len());
        buf.extend_from_slice(&nonce_bytes);
        buf.extend_from_slice(envelope);

        let (_nonce_part, data_part) = buf.split_at_mut(NONCE_LEN);
        let in_out = InOutBuf::from(data_part);
        let tag = cipher
            .encrypt_inout_detached(&nonce, aad, in_out)
            .map_err(|_| VaultError::Encryption { namespace: namespace.to_owned() })?;
        buf.extend_from_slice(tag.as_slice());

        Ok(buf)
    }

    /// Opens a sealed blob back into the envelope it wraps.
    ///
    /// Decryption is attempted with the current namespace key first, then
    /// with keys derived from each retired master in rotation order. Any
    /// tag mismatch (wrong key, wrong cache key in `aad`, or a flipped
    /// ciphertext bit) fails without returning plaintext.
    ///
    /// # Errors
    /// * [`VaultError::InvalidPayload`] if the blob cannot hold a nonce and tag.
    /// * [`VaultError::Decryption`] if no configured key authenticates it.
    pub fn open(&self, namespace: &str, sealed: &[u8], aad: &[u8]) -> Result<Vec<u8>, VaultError> {
        if sealed.len() < SEALED_OVERHEAD {
            return Err(VaultError::InvalidPayload {
                reason: format!(
                    "sealed payload of {} bytes cannot hold nonce and tag ({SEALED_OVERHEAD})",
                    sealed.len()
                )
                .into(),
            });
        }

        let (nonce_slice, rest) = sealed.split_at(NONCE_LEN);
        let (ciphertext, tag_slice) = rest.split_at(rest.len() - TAG_LEN);

        let nonce = Nonce::<Aes256Gcm>::try_from(nonce_slice).map_err(|_| {
            VaultError::InvalidPayload { reason: "invalid nonce length".into() }
        })?;
        let tag = tag_slice.try_into().map_err(|_| VaultError::InvalidPayload {
            reason: "invalid tag length".into(),
        })?;

        let ciphers = self.ciphers_for(namespace)?;
        for (index, cipher) in ciphers.iter().enumerate() {
            let mut buf = ciphertext.to_vec();
            let in_out = InOutBuf::from(&mut buf[..]);
            if cipher.decrypt_inout_detached(&nonce, aad, in_out, &tag).is_ok() {
                if index > 0 {
                    debug!(namespace, retired_index = index, "Payload opened with retired key");
                }
                return Ok(buf);
            }
        }

        Err(VaultError::Decryption {
            namespace: namespace.to_owned(),
            reason: "AEAD authentication failed under all configured keys".into(),
        })
    }

    /// Returns the cached per-namespace ciphers, deriving them on first use.
    fn ciphers_for(&self, namespace: &str) -> Result<Arc<Vec<Aes256Gcm>>, VaultError> {
        if let Some(ciphers) = self.inner.ciphers.read().get(namespace) {
            return Ok(Arc::clone(ciphers));
        }

        let mut derived = Vec::with_capacity(self.inner.masters.len());
        for master in &self.inner.masters {
            derived.push(derive_cipher(master, namespace)?);
        }

        let mut cache = self.inner.ciphers.write();
        let entry = cache
            .entry(namespace.to_owned())
            .or_insert_with(|| Arc::new(derived));
        Ok(Arc::clone(entry))
    }
}

fn derive_cipher(master: &[u8], namespace: &str) -> Result<Aes256Gcm, VaultError> {
    let (_, hk) = Hkdf::<Sha256>::extract(Some(HKDF_SALT), master);

    let mut info = Vec::with_capacity(KEY_INFO_PREFIX.len() + namespace.len());
    info.extend_from_slice(KEY_INFO_PREFIX);
    info.extend_from_slice(namespace.as_bytes());

    let mut key_bytes = Zeroizing::new([0u8; 32]);
    hk.expand(&info, key_bytes.as_mut()).map_err(|_| VaultError::InvalidConfiguration {
        reason: "HKDF expansion failed for namespace key".into(),
    })?;

    let key = Key::<Aes256Gcm>::try_from(&key_bytes[..]).map_err(|_| {
        VaultError::InvalidConfiguration { reason: "derived key has invalid length".into() }
    })?;
    Ok(Aes256Gcm::new(&key))
}
