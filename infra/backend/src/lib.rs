//! The L2 tier: a shared, out-of-process byte store behind a narrow
//! contract.
//!
//! The cache core addresses the L2 with the same composite keys as the L1
//! and stores the same opaque envelopes. Backends never interpret the
//! bytes; they own their connection pooling, pipelining, and transport
//! retries, while the core wraps every call in the reliability envelope.
//!
//! Two backends ship in-tree:
//! - [`MemoryBackend`]: process-local, for tests and single-process use.
//! - [`FilesystemBackend`]: a sandboxed on-disk store with atomic writes
//!   and sharded directories, for single-machine deployments.
//!
//! A remote K/V implementation lives outside the core; anything satisfying
//! [`CacheBackend`] plugs in, including its atomic-lock overrides.

mod error;
mod filesystem;
mod lock;
mod memory;

pub use error::{BackendError, BackendErrorKind, key_hint};
pub use filesystem::FilesystemBackend;
pub use lock::{FillLock, FillLockConfig, LockOutcome};
pub use memory::MemoryBackend;

use async_trait::async_trait;
use std::time::Duration;

/// A byte-keyed, byte-valued store with optional entry TTLs.
///
/// All operations are fallible with [`BackendError`]; the error's kind
/// drives circuit-breaker classification upstream.
///
/// The two lock primitives exist for fill coordination (§ single-flight).
/// Default implementations compose `get`/`set`/`delete` and are therefore
/// **not atomic** across processes; real backends should override them
/// with native compare-and-set operations (the in-tree backends do).
#[async_trait]
pub trait CacheBackend: Send + Sync + std::fmt::Debug {
    /// Fetches the bytes stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;

    /// Stores `value` under `key`. `ttl = None` means no expiry.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>)
    -> Result<(), BackendError>;

    /// Removes `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool, BackendError>;

    /// Checks for a live entry without fetching it.
    async fn exists(&self, key: &str) -> Result<bool, BackendError>;

    /// Attempts to take the lock named `key` for `ttl`, identifying the
    /// holder by `token`. Returns `false` when another holder has it.
    async fn acquire_lock(
        &self,
        key: &str,
        token: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        // Check-then-set fallback: subject to a small race window.
        if self.exists(key).await? {
            return Ok(false);
        }
        self.set(key, token, Some(ttl)).await?;
        Ok(true)
    }

    /// Releases the lock named `key` only if `token` still holds it, so a
    /// holder whose lock expired cannot delete a successor's lock.
    async fn release_lock(&self, key: &str, token: &[u8]) -> Result<bool, BackendError> {
        // Get-compare-delete fallback: subject to a small race window.
        match self.get(key).await? {
            Some(held) if held == token => self.delete(key).await,
            _ => Ok(false),
        }
    }
}
