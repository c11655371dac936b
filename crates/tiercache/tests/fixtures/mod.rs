//! Shared test doubles.

// Each test binary uses a subset of these helpers.
#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiercache::{CacheLoader, Value};
use tiercache_backend::{BackendError, BackendErrorKind, CacheBackend, MemoryBackend};

/// A backend that fails the next N calls per operation with a chosen
/// error kind, then delegates to a real in-memory store.
#[derive(Debug)]
pub struct FlakyBackend {
    inner: MemoryBackend,
    fail_kind: BackendErrorKind,
    failing_gets: AtomicUsize,
    failing_sets: AtomicUsize,
    get_calls: AtomicUsize,
}

impl FlakyBackend {
    pub fn new(fail_kind: BackendErrorKind) -> Self {
        Self {
            inner: MemoryBackend::new(),
            fail_kind,
            failing_gets: AtomicUsize::new(0),
            failing_sets: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_next_gets(&self, count: usize) {
        self.failing_gets.store(count, Ordering::SeqCst);
    }

    pub fn fail_next_sets(&self, count: usize) {
        self.failing_sets.store(count, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    fn take_failure(&self, budget: &AtomicUsize, operation: &'static str, key: &str) -> Option<BackendError> {
        let remaining = budget.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        if budget
            .compare_exchange(remaining, remaining - 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            Some(BackendError::new(self.fail_kind, operation, key, "injected failure"))
        } else {
            self.take_failure(budget, operation, key)
        }
    }
}

#[async_trait]
impl CacheBackend for FlakyBackend {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.take_failure(&self.failing_gets, "get", key) {
            return Err(err);
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<(), BackendError> {
        if let Some(err) = self.take_failure(&self.failing_sets, "set", key) {
            return Err(err);
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, BackendError> {
        self.inner.exists(key).await
    }

    async fn acquire_lock(
        &self,
        key: &str,
        token: &[u8],
        ttl: Duration,
    ) -> Result<bool, BackendError> {
        self.inner.acquire_lock(key, token, ttl).await
    }

    async fn release_lock(&self, key: &str, token: &[u8]) -> Result<bool, BackendError> {
        self.inner.release_lock(key, token).await
    }
}

/// A loader returning a fixed value while counting invocations.
#[derive(Debug, Clone)]
pub struct CountingLoader {
    value: Arc<parking_lot::Mutex<Value>>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

impl CountingLoader {
    pub fn new(value: Value) -> Self {
        Self {
            value: Arc::new(parking_lot::Mutex::new(value)),
            calls: Arc::new(AtomicUsize::new(0)),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Changes what subsequent invocations produce.
    pub fn set_value(&self, value: Value) {
        *self.value.lock() = value;
    }
}

impl CacheLoader for CountingLoader {
    fn load(&self) -> futures::future::BoxFuture<'static, anyhow::Result<Value>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let value = self.value.lock().clone();
        let delay = self.delay;
        Box::pin(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Ok(value)
        })
    }
}

/// Installs a test subscriber once so `RUST_LOG=tiercache=trace` works in
/// `cargo test -- --nocapture` runs.
pub fn init_tracing() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// `{"id": <id>}` as a cache value.
pub fn id_map(id: i64) -> Value {
    let mut map = std::collections::BTreeMap::new();
    map.insert("id".to_owned(), Value::Int(id));
    Value::Map(map)
}
