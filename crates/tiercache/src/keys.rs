//! Deterministic cache keys.
//!
//! A key names one (function, arguments, namespace) triple. The argument
//! fingerprint is a 128-bit truncation of SHA-256 over the canonical
//! type-tagged encoding from the codec crate, so it is bit-equal across
//! processes, runs, and architectures; no user-supplied hashing is ever
//! consulted. The composite form is human-readable for operability;
//! equality is byte-equality on the full string.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tiercache_codec::{Value, canonical_bytes};

/// Fingerprint length in hex characters (128 bits).
const FINGERPRINT_HEX_LEN: usize = 32;

/// A fully derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// `ns:{namespace}:func:{identity}:args:{fingerprint}`, the byte
    /// string both tiers are addressed by and the AAD under encryption.
    pub full: String,
    pub namespace: String,
}

impl CacheKey {
    /// Derives the key for one invocation.
    ///
    /// `identity` must be a stable name for the computation, provided by
    /// the caller; there is no reflection on the wrapped callable.
    #[must_use]
    pub fn generate(
        namespace: &str,
        identity: &str,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Self {
        let digest = fingerprint(namespace, identity, args, kwargs);
        Self {
            full: format!("ns:{namespace}:func:{identity}:args:{digest}"),
            namespace: namespace.to_owned(),
        }
    }

    /// The key's UTF-8 bytes, as fed to the AEAD associated data.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.full.as_bytes()
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.full)
    }
}

/// 32-hex-character fingerprint of one invocation.
#[must_use]
pub fn fingerprint(
    namespace: &str,
    identity: &str,
    args: &[Value],
    kwargs: &BTreeMap<String, Value>,
) -> String {
    let mut canonical = Vec::with_capacity(64);
    // Length-prefixed text fields; ambiguity here would merge distinct keys.
    canonical.extend_from_slice(&(namespace.len() as u32).to_le_bytes());
    canonical.extend_from_slice(namespace.as_bytes());
    canonical.extend_from_slice(&(identity.len() as u32).to_le_bytes());
    canonical.extend_from_slice(identity.as_bytes());
    canonical.extend_from_slice(&(args.len() as u32).to_le_bytes());
    for arg in args {
        canonical_bytes(arg, &mut canonical);
    }
    // BTreeMap iterates sorted, giving named arguments a canonical order.
    canonical.extend_from_slice(&(kwargs.len() as u32).to_le_bytes());
    for (name, value) in kwargs {
        canonical.extend_from_slice(&(name.len() as u32).to_le_bytes());
        canonical.extend_from_slice(name.as_bytes());
        canonical_bytes(value, &mut canonical);
    }

    let digest = Sha256::digest(&canonical);
    hex::encode(&digest[..FINGERPRINT_HEX_LEN / 2])
}
