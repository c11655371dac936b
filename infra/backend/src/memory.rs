//! Process-local backend for tests and single-process deployments.

use crate::error::BackendError;
use crate::CacheBackend;
use async_trait::async_trait;
use fxhash::FxHashMap;
use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Stored {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Stored {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now <= at)
    }
}

/// An in-memory [`CacheBackend`].
///
/// TTLs are honored lazily: expired entries are dropped when touched. The
/// lock primitives run under the map mutex and are genuinely atomic, which
/// makes this backend a faithful stand-in for a remote store in tests.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<FxHashMap<String, Stored>>,
}

impl MemoryBackend {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries (test helper).
    #[must_use]
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.lock().values().filter(|stored| stored.is_live(now)).count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(Some(stored.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            },
            None => Ok(None),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), BackendError> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .lock()
            .insert(key.to_owned(), Stored { value: value.to_vec(), expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.remove(key) {
            Some(stored) => Ok(stored.is_live(now)),
            None => Ok(false),
        }
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) => Ok(true),
            Some(_) => {
                entries.remove(key);
                Ok(false)
            },
            None => Ok(false),
        }
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|stored| stored.is_live(now)) {
            return Ok(false);
        }
        entries.insert(
            key.to_owned(),
            Stored { value: token.to_vec(), expires_at: Some(now + ttl) },
        );
        Ok(true)
    }

    async fn release_lock(&self, key: &str, token: &[u8]) -> Result<bool, BackendError> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(stored) if stored.is_live(now) && stored.value == token => {
                entries.remove(key);
                Ok(true)
            },
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete_exists() {
        let backend = MemoryBackend::new();
        assert!(backend.get("k").await.unwrap().is_none());

        backend.set("k", b"v", None).await.unwrap();
        assert!(backend.exists("k").await.unwrap());
        assert_eq!(backend.get("k").await.unwrap().unwrap(), b"v");

        assert!(backend.delete("k").await.unwrap());
        assert!(!backend.delete("k").await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiry() {
        let backend = MemoryBackend::new();
        backend.set("k", b"v", Some(Duration::from_secs(5))).await.unwrap();
        assert!(backend.exists("k").await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backend.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lock_single_holder() {
        let backend = MemoryBackend::new();
        assert!(backend.acquire_lock("lock", b"a", Duration::from_secs(30)).await.unwrap());
        assert!(!backend.acquire_lock("lock", b"b", Duration::from_secs(30)).await.unwrap());

        // Only the holder's token releases.
        assert!(!backend.release_lock("lock", b"b").await.unwrap());
        assert!(backend.release_lock("lock", b"a").await.unwrap());
        assert!(backend.acquire_lock("lock", b"b", Duration::from_secs(30)).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lock_is_reacquirable() {
        let backend = MemoryBackend::new();
        assert!(backend.acquire_lock("lock", b"a", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(backend.acquire_lock("lock", b"b", Duration::from_secs(5)).await.unwrap());
    }
}
