//! Authenticated encryption for cache envelopes.
//!
//! This crate wraps finished byte envelopes in AES-256-GCM so that neither
//! the shared L2 store nor the in-process L1 ever holds plaintext. The
//! sealed layout is:
//!
//! ```text
//! [NONCE(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! with the full cache key supplied as associated data, binding every blob
//! to the exact key it was written under.
//!
//! ## Key Derivation
//!
//! Each namespace gets an independent key derived from the master secret
//! via HKDF-SHA256 with a versioned info string. The master secret must be
//! at least 32 bytes; it is held in zeroized storage, never logged, never
//! serialized, and never sent to the L2. Rotation is explicit: retired
//! masters are consulted on decryption only, and entries sealed under them
//! age out with their TTLs.
//!
//! ## Nonce Policy
//!
//! Nonces are counter-based: a 64-bit in-process counter plus 32 random
//! suffix bits drawn at startup. Within a process the counter guarantees
//! uniqueness; across restarts the fresh suffix keeps the collision
//! probability negligible without any persisted state.

mod builder;
mod engine;
mod error;
mod nonce;

pub use builder::{MIN_MASTER_KEY_LEN, NoKey, VaultBuilder, WithKey};
pub use engine::{CacheVault, SEALED_OVERHEAD};
pub use error::VaultError;
