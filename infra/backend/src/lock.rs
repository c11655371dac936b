//! Distributed single-fill coordination.

use crate::CacheBackend;
use crate::error::BackendError;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tuning for a [`FillLock`].
#[derive(Debug, Clone)]
pub struct FillLockConfig {
    /// Lock lifetime. Must exceed the expected computation time plus a
    /// safety margin; a crashed holder is fenced out after this long.
    pub ttl: Duration,
    /// How long a waiter polls before giving up and computing anyway.
    pub acquire_timeout: Duration,
    /// Poll backoff between acquisition attempts.
    pub poll_interval: Duration,
}

impl Default for FillLockConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(30),
            acquire_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
        }
    }
}

/// Result of a lock acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// This caller holds the lock and must fill, then release.
    Acquired,
    /// `acquire_timeout` elapsed while another holder kept the lock.
    ///
    /// The caller proceeds without coordination; a bounded stampede
    /// window is accepted rather than failing the request.
    TimedOut,
}

/// A single-holder lock derived from a cache key.
///
/// At most one process across the fleet holds a given lock at a time
/// (within the atomicity of the backend's lock primitives). The holder is
/// identified by a random token, so release only ever deletes the
/// holder's own lock, so a holder that outlived its TTL cannot release its
/// successor's.
#[derive(Debug)]
pub struct FillLock {
    backend: Arc<dyn CacheBackend>,
    name: String,
    token: [u8; 16],
    config: FillLockConfig,
}

impl FillLock {
    /// Creates the lock for `cache_key` without contacting the backend.
    ///
    /// # Errors
    /// Returns a [`BackendError`] if the system RNG cannot produce a
    /// holder token.
    pub fn new(
        backend: Arc<dyn CacheBackend>,
        cache_key: &str,
        config: FillLockConfig,
    ) -> Result<Self, BackendError> {
        let mut token = [0u8; 16];
        getrandom::fill(&mut token).map_err(|err| {
            BackendError::new(
                crate::BackendErrorKind::Io,
                "acquire_lock",
                cache_key,
                format!("holder token generation failed: {err}"),
            )
        })?;
        Ok(Self { backend, name: format!("fill:{cache_key}"), token, config })
    }

    /// Polls for the lock until acquired or `acquire_timeout` elapses.
    ///
    /// # Errors
    /// Backend failures are propagated; the caller decides whether they
    /// degrade to an uncoordinated fill.
    pub async fn acquire(&self) -> Result<LockOutcome, BackendError> {
        let deadline = tokio::time::Instant::now() + self.config.acquire_timeout;
        loop {
            if self.backend.acquire_lock(&self.name, &self.token, self.config.ttl).await? {
                debug!(lock = %self.name, "Fill lock acquired");
                return Ok(LockOutcome::Acquired);
            }
            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                debug!(lock = %self.name, "Fill lock wait timed out; proceeding uncoordinated");
                return Ok(LockOutcome::TimedOut);
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Releases the lock if this instance still holds it. Best-effort: a
    /// failed release is logged and left for the TTL to clean up.
    pub async fn release(&self) {
        match self.backend.release_lock(&self.name, &self.token).await {
            Ok(true) => debug!(lock = %self.name, "Fill lock released"),
            Ok(false) => debug!(lock = %self.name, "Fill lock already gone at release"),
            Err(err) => {
                warn!(lock = %self.name, error = %err, "Fill lock release failed; TTL will reap it");
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MemoryBackend;

    fn config(acquire_timeout_ms: u64) -> FillLockConfig {
        FillLockConfig {
            ttl: Duration::from_secs(5),
            acquire_timeout: Duration::from_millis(acquire_timeout_ms),
            poll_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        let lock = FillLock::new(Arc::clone(&backend), "ns:k", config(100)).unwrap();

        assert_eq!(lock.acquire().await.unwrap(), LockOutcome::Acquired);
        lock.release().await;

        let again = FillLock::new(backend, "ns:k", config(100)).unwrap();
        assert_eq!(again.acquire().await.unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_times_out_and_falls_through() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        let holder = FillLock::new(Arc::clone(&backend), "ns:k", config(200)).unwrap();
        assert_eq!(holder.acquire().await.unwrap(), LockOutcome::Acquired);

        let waiter = FillLock::new(backend, "ns:k", config(200)).unwrap();
        assert_eq!(waiter.acquire().await.unwrap(), LockOutcome::TimedOut);
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_proceeds_once_released() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        let holder = FillLock::new(Arc::clone(&backend), "ns:k", config(1_000)).unwrap();
        assert_eq!(holder.acquire().await.unwrap(), LockOutcome::Acquired);

        let waiter = FillLock::new(backend, "ns:k", config(1_000)).unwrap();
        let wait = tokio::spawn(async move { waiter.acquire().await });

        tokio::time::sleep(Duration::from_millis(30)).await;
        holder.release().await;

        assert_eq!(wait.await.unwrap().unwrap(), LockOutcome::Acquired);
    }

    #[tokio::test]
    async fn test_release_only_own_lock() {
        let backend: Arc<dyn CacheBackend> = Arc::new(MemoryBackend::new());
        let first = FillLock::new(Arc::clone(&backend), "ns:k", config(50)).unwrap();
        assert_eq!(first.acquire().await.unwrap(), LockOutcome::Acquired);

        // A stranger's release must not free the holder's lock.
        let stranger = FillLock::new(Arc::clone(&backend), "ns:k", config(50)).unwrap();
        stranger.release().await;

        let probe = FillLock::new(backend, "ns:k", config(50)).unwrap();
        assert_eq!(probe.acquire().await.unwrap(), LockOutcome::TimedOut);
    }
}
