//! Error types for the cache vault.

use std::borrow::Cow;

/// Failures of the encryption wrapper.
///
/// Messages carry the namespace and operation but never key material,
/// nonces, or plaintext.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// AEAD encryption failed. With a well-formed key this indicates an
    /// internal cipher fault, not bad input.
    #[error("encryption failed for namespace {namespace:?}")]
    Encryption { namespace: String },

    /// AEAD authentication failed: wrong key, wrong associated data
    /// (cache key), or tampered ciphertext. Plaintext is never returned.
    #[error("decryption failed for namespace {namespace:?}: {reason}")]
    Decryption { namespace: String, reason: Cow<'static, str> },

    /// The sealed blob is too short to contain a nonce and a tag.
    #[error("sealed payload malformed: {reason}")]
    InvalidPayload { reason: Cow<'static, str> },

    /// The vault or builder is misconfigured (short master secret,
    /// missing keys, RNG unavailable).
    #[error("invalid vault configuration: {reason}")]
    InvalidConfiguration { reason: Cow<'static, str> },
}
