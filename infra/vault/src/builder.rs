use crate::engine::{CacheVault, VaultInner};
use crate::error::VaultError;
use crate::nonce::NonceSequence;
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::sync::Arc;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

/// Minimum accepted master secret length in bytes.
pub const MIN_MASTER_KEY_LEN: usize = 32;

#[derive(Debug, Default, ZeroizeOnDrop)]
pub struct NoKey;

#[derive(Debug, Zeroize, ZeroizeOnDrop)]
pub struct WithKey {
    master: Vec<u8>,
    retired: Vec<Vec<u8>>,
}

mod private {
    pub(super) trait Sealed {}
}
use private::Sealed;
impl Sealed for NoKey {}
impl Sealed for WithKey {}

/// A builder for secure initialization of the [`CacheVault`].
///
/// The typestate guarantees a vault cannot be built without a master
/// secret, and `ZeroizeOnDrop` clears raw key material from memory as soon
/// as the builder is gone.
#[allow(private_bounds)]
#[derive(Debug, ZeroizeOnDrop)]
pub struct VaultBuilder<K: Sealed + ZeroizeOnDrop = NoKey> {
    keys: K,
}

impl Default for VaultBuilder {
    fn default() -> Self {
        Self { keys: NoKey }
    }
}

impl VaultBuilder {
    /// Creates a new empty builder.
    #[must_use = "builder must be given a master key before use"]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the master secret all per-namespace keys derive from.
    ///
    /// The secret is copied into zeroized storage; the caller should drop
    /// its own copy promptly.
    ///
    /// # Errors
    /// Returns [`VaultError::InvalidConfiguration`] if the secret is
    /// shorter than [`MIN_MASTER_KEY_LEN`] bytes.
    pub fn master_key(self, secret: impl AsRef<[u8]>) -> Result<VaultBuilder<WithKey>, VaultError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_MASTER_KEY_LEN {
            return Err(VaultError::InvalidConfiguration {
                reason: format!(
                    "master secret must be at least {MIN_MASTER_KEY_LEN} bytes, got {}",
                    secret.len()
                )
                .into(),
            });
        }
        Ok(VaultBuilder { keys: WithKey { master: secret.to_vec(), retired: Vec::new() } })
    }
}

impl VaultBuilder<WithKey> {
    /// Adds a retired master secret consulted on decryption only.
    ///
    /// Rotation is explicit, not automatic: new writes always use the
    /// current master; entries sealed under a retired master stay readable
    /// until they expire naturally.
    ///
    /// # Errors
    /// Returns [`VaultError::InvalidConfiguration`] if the secret is
    /// shorter than [`MIN_MASTER_KEY_LEN`] bytes.
    pub fn retired_key(mut self, secret: impl AsRef<[u8]>) -> Result<Self, VaultError> {
        let secret = secret.as_ref();
        if secret.len() < MIN_MASTER_KEY_LEN {
            return Err(VaultError::InvalidConfiguration {
                reason: format!(
                    "retired secret must be at least {MIN_MASTER_KEY_LEN} bytes, got {}",
                    secret.len()
                )
                .into(),
            });
        }
        self.keys.retired.push(secret.to_vec());
        Ok(self)
    }

    /// Finalizes vault construction and zeroizes the builder.
    ///
    /// # Errors
    /// Returns [`VaultError::InvalidConfiguration`] if the system RNG is
    /// unavailable for the nonce suffix.
    pub fn build(mut self) -> Result<CacheVault, VaultError> {
        let masters: Vec<Zeroizing<Vec<u8>>> = std::iter::once(&self.keys.master)
            .chain(self.keys.retired.iter())
            .map(|secret| Zeroizing::new(secret.clone()))
            .collect();

        let inner = VaultInner {
            masters,
            nonces: NonceSequence::new()?,
            ciphers: RwLock::new(FxHashMap::default()),
        };
        self.keys.zeroize();

        Ok(CacheVault { inner: Arc::new(inner) })
    }
}
