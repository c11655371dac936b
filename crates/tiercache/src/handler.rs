//! The cache handler: read/write orchestration across both tiers.

use crate::config::{CacheConfig, FallbackPolicy};
use crate::error::CacheError;
use crate::keys::CacheKey;
use crate::metrics::{CacheMetrics, Tier};
use crate::pipeline::Pipeline;
use crate::runtime;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tiercache_backend::{CacheBackend, FillLock, FillLockConfig, LockOutcome};
use tiercache_codec::Value;
use tiercache_events::{InvalidationBus, InvalidationEvent, InvalidationScope};
use tiercache_guard::{
    BackpressureConfig, BreakerConfig, GuardError, OpClass, ReliabilityConfig, ReliabilitySet,
    TimeoutConfig,
};
use tiercache_memory::{Freshness, L1Hit, MemoryStore, MemoryStoreConfig};
use tiercache_vault::CacheVault;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// The user computation a cache entry memoizes.
///
/// Implemented for any `Fn() -> Future<Output = anyhow::Result<Value>>`
/// closure; the handler re-invokes it for background refreshes, so it must
/// be callable more than once. Errors pass through unchanged as
/// [`CacheError::Application`] and are never cached.
pub trait CacheLoader: Send + Sync {
    fn load(&self) -> BoxFuture<'static, anyhow::Result<Value>>;
}

impl<F, Fut> CacheLoader for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send + 'static,
{
    fn load(&self) -> BoxFuture<'static, anyhow::Result<Value>> {
        Box::pin(self())
    }
}

pub(crate) struct CacheInner {
    pub(crate) config: CacheConfig,
    pub(crate) pipeline: Pipeline,
    pub(crate) l1: Option<MemoryStore>,
    pub(crate) backend: Option<Arc<dyn CacheBackend>>,
    pub(crate) reliability: ReliabilitySet,
    pub(crate) bus: Option<Arc<dyn InvalidationBus>>,
    pub(crate) source_id: String,
    pub(crate) metrics: CacheMetrics,
    refresh_slots: Arc<Semaphore>,
    refresh_tasks: Mutex<Vec<JoinHandle<()>>>,
    bus_task: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for CacheInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheInner")
            .field("namespace", &self.config.namespace)
            .field("encrypted", &self.pipeline.encrypted())
            .field("l1", &self.l1.is_some())
            .field("l2", &self.backend.is_some())
            .finish_non_exhaustive()
    }
}

/// A handle to one configured cache.
///
/// Cheap to clone; every clone shares the L1 store, breaker state, metrics,
/// and refresh workers. Construction is side-effect free apart from the bus
/// subscription task; [`Cache::shutdown`] stops that task and drains
/// in-flight refreshes.
#[derive(Debug, Clone)]
pub struct Cache {
    inner: Arc<CacheInner>,
}

/// Builder wiring a [`CacheConfig`] to its collaborators.
#[derive(Debug, Default)]
#[must_use = "builders do nothing unless you call .build()"]
pub struct CacheBuilder {
    config: CacheConfig,
    backend: Option<Arc<dyn CacheBackend>>,
    bus: Option<Arc<dyn InvalidationBus>>,
}

impl CacheBuilder {
    pub fn config(mut self, config: CacheConfig) -> Self {
        self.config = config;
        self
    }

    /// Attaches the L2 store. Without one the cache is L1-only.
    pub fn backend(mut self, backend: Arc<dyn CacheBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Attaches the invalidation bus. Without one invalidation is
    /// local-only.
    pub fn bus(mut self, bus: Arc<dyn InvalidationBus>) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Validates the configuration and assembles the cache.
    ///
    /// # Errors
    /// Returns [`CacheError::Configuration`] on invalid settings (bad
    /// ratios, secure mode without a master key, malformed key hex).
    pub fn build(self) -> Result<Cache, CacheError> {
        self.config.validate()?;
        let config = self.config;

        let vault = build_vault(&config)?;
        let pipeline = Pipeline::new(config.serializer, vault);

        let l1 = config.l1.enabled.then(|| {
            MemoryStore::new(MemoryStoreConfig {
                max_bytes: config.l1.max_size_mb * 1024 * 1024,
                swr_ratio: config.l1.swr_threshold_ratio,
                jitter: config.l1.swr_jitter.then_some((0.9, 1.1)),
                namespace_index: config.l1.namespace_index,
            })
        });

        let reliability = ReliabilitySet::new(ReliabilityConfig {
            breaker: config.circuit_breaker.enabled.then(|| BreakerConfig {
                failure_threshold: config.circuit_breaker.failure_threshold,
                recovery_timeout: Duration::from_secs(config.circuit_breaker.recovery_timeout_secs),
                failure_window: Duration::from_secs(config.circuit_breaker.failure_window_secs),
            }),
            timeout: config.timeout.enabled.then(|| TimeoutConfig {
                base: Duration::from_millis(config.timeout.base_ms),
                multiplier: config.timeout.multiplier,
                max: Duration::from_millis(config.timeout.max_ms),
            }),
            backpressure: config.backpressure.enabled.then(|| BackpressureConfig {
                max_concurrent: config.backpressure.max_concurrent,
            }),
        });

        let mut source_id = [0u8; 8];
        getrandom::fill(&mut source_id).map_err(|err| CacheError::Configuration {
            reason: format!("system RNG unavailable for the bus source id: {err}").into(),
        })?;

        let refresh_slots = Arc::new(Semaphore::new(config.refresh_workers));
        let inner = Arc::new(CacheInner {
            refresh_slots,
            config,
            pipeline,
            l1,
            backend: self.backend,
            reliability,
            bus: self.bus,
            source_id: hex::encode(source_id),
            metrics: CacheMetrics::new()?,
            refresh_tasks: Mutex::new(Vec::new()),
            bus_task: Mutex::new(None),
        });

        *inner.bus_task.lock() = spawn_bus_listener(&inner);
        Ok(Cache { inner })
    }
}

fn build_vault(config: &CacheConfig) -> Result<Option<CacheVault>, CacheError> {
    let Some(master) = config.encryption.master_key.as_ref() else {
        return Ok(None);
    };
    let mut builder = CacheVault::builder().master_key(decode_key_hex(&master.0)?)?;
    for retired in &config.encryption.retired_keys {
        builder = builder.retired_key(decode_key_hex(&retired.0)?)?;
    }
    Ok(Some(builder.build()?))
}

fn decode_key_hex(encoded: &str) -> Result<Vec<u8>, CacheError> {
    hex::decode(encoded).map_err(|_| CacheError::Configuration {
        reason: "encryption keys must be hex-encoded".into(),
    })
}

fn spawn_bus_listener(inner: &Arc<CacheInner>) -> Option<JoinHandle<()>> {
    let bus = inner.bus.as_ref()?;
    if !inner.config.l1.invalidation_enabled || inner.l1.is_none() {
        return None;
    }

    let mut receiver = bus.subscribe();
    let inner = Arc::clone(inner);
    Some(runtime::spawn(async move {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    if event.source_id == inner.source_id {
                        continue;
                    }
                    let Some(l1) = inner.l1.as_ref() else { break };
                    match &event.scope {
                        InvalidationScope::Key(key) => {
                            l1.invalidate(key);
                        },
                        InvalidationScope::Namespace(namespace) => {
                            l1.invalidate_namespace(namespace);
                        },
                        InvalidationScope::All => {
                            l1.invalidate_all();
                        },
                    }
                    trace!(source = %event.source_id, "Remote invalidation applied");
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "Invalidation listener lagged; stale reads until expiry");
                },
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }))
}

impl Cache {
    pub fn builder() -> CacheBuilder {
        CacheBuilder::default()
    }

    #[must_use]
    pub fn config(&self) -> &CacheConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn metrics(&self) -> &CacheMetrics {
        &self.inner.metrics
    }

    /// Derives the cache key for one invocation under this cache's
    /// namespace.
    #[must_use]
    pub fn key(
        &self,
        identity: &str,
        args: &[Value],
        kwargs: &std::collections::BTreeMap<String, Value>,
    ) -> CacheKey {
        CacheKey::generate(&self.inner.config.namespace, identity, args, kwargs)
    }

    /// The memoizing read: serve from L1, then L2, then compute exactly
    /// once under the fill lock.
    ///
    /// Stale L1 entries are served immediately while one background
    /// refresh runs (when SWR is enabled). Cache-layer availability
    /// failures follow the configured [`FallbackPolicy`]; loader errors
    /// always propagate unchanged.
    pub async fn read_or_fill(
        &self,
        key: &CacheKey,
        ttl_override: Option<Duration>,
        loader: Arc<dyn CacheLoader>,
    ) -> Result<Value, CacheError> {
        let ttl = ttl_override.unwrap_or_else(|| self.inner.config.ttl());
        let mut stale_payload: Option<Vec<u8>> = None;

        if let Some(l1) = self.inner.l1.as_ref() {
            let started = Instant::now();
            let lookup = l1.get(&key.full);
            self.inner.metrics.observe_op(Tier::L1, "get", started.elapsed().as_secs_f64());

            if let Some(hit) = lookup {
                match self.inner.pipeline.decode(key, &hit.payload) {
                    Ok(value) => match hit.freshness {
                        Freshness::Fresh => {
                            self.inner.metrics.record_hit(Tier::L1, &key.namespace);
                            return Ok(value);
                        },
                        Freshness::Stale if self.inner.config.l1.swr_enabled => {
                            self.inner.metrics.record_hit(Tier::L1, &key.namespace);
                            if l1.mark_refreshing(&key.full, hit.version) {
                                self.spawn_refresh(key.clone(), &hit, Arc::clone(&loader));
                            }
                            return Ok(value);
                        },
                        Freshness::Stale => {
                            // SWR disabled: stale reads as a miss, but the
                            // payload stays available for stale_on_error.
                            stale_payload = Some(hit.payload);
                        },
                    },
                    Err(err) => {
                        warn!(key = %key, error = %err, "Undecodable L1 entry dropped");
                        self.inner.metrics.record_error(err.kind_label());
                        l1.invalidate(&key.full);
                    },
                }
            } else {
                self.inner.metrics.record_miss(Tier::L1, &key.namespace);
            }
        }

        let result = if self.inner.backend.is_some() {
            match self.inner.guarded_get(key).await {
                Ok(Some(bytes)) => match self.inner.pipeline.decode(key, &bytes) {
                    Ok(value) => {
                        self.inner.metrics.record_hit(Tier::L2, &key.namespace);
                        self.l1_put(key, bytes, ttl);
                        Ok(value)
                    },
                    Err(err) => {
                        // Tampered, truncated, or foreign-format entry:
                        // a miss on this path, recomputed below.
                        warn!(key = %key, error = %err, "Undecodable L2 entry treated as miss");
                        self.inner.metrics.record_error(err.kind_label());
                        self.fill_with_lock(key, ttl, loader).await
                    },
                },
                Ok(None) => {
                    self.inner.metrics.record_miss(Tier::L2, &key.namespace);
                    self.fill_with_lock(key, ttl, loader).await
                },
                Err(err) => {
                    self.inner.metrics.record_error(guard_kind(&err));
                    self.fallback(key, err.into(), stale_payload, &loader).await
                },
            }
        } else {
            self.fill_local(key, ttl, loader).await
        };

        self.touch_l1_gauges();
        result
    }

    /// Drops one entry from both tiers and announces it on the bus.
    ///
    /// # Errors
    /// Propagates guarded L2 failures; the L1 side and the bus publish are
    /// never the cause.
    pub async fn invalidate(&self, key: &CacheKey) -> Result<bool, CacheError> {
        let mut existed = false;
        if let Some(l1) = self.inner.l1.as_ref() {
            existed |= l1.invalidate(&key.full);
        }
        if self.inner.backend.is_some() {
            existed |= self.inner.guarded_delete(key).await?;
        }
        self.publish(InvalidationScope::Key(key.full.clone()));
        self.touch_l1_gauges();
        Ok(existed)
    }

    /// Drops every L1 entry in a namespace and fans the invalidation out.
    ///
    /// L2 entries cannot be enumerated through the backend contract; they
    /// age out at their TTLs. Returns the local count removed.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let removed = self.inner.l1.as_ref().map_or(0, |l1| l1.invalidate_namespace(namespace));
        self.publish(InvalidationScope::Namespace(namespace.to_owned()));
        self.touch_l1_gauges();
        removed
    }

    /// Clears the local L1 and broadcasts a full invalidation.
    pub fn clear(&self) -> usize {
        let removed = self.inner.l1.as_ref().map_or(0, MemoryStore::invalidate_all);
        self.publish(InvalidationScope::All);
        self.touch_l1_gauges();
        removed
    }

    /// Whether either tier holds a live entry for `key`.
    ///
    /// # Errors
    /// Propagates guarded L2 failures.
    pub async fn contains(&self, key: &CacheKey) -> Result<bool, CacheError> {
        if self.inner.l1.as_ref().is_some_and(|l1| l1.get(&key.full).is_some()) {
            return Ok(true);
        }
        match self.inner.backend.as_ref() {
            Some(_) => Ok(self.inner.guarded_exists(key).await?),
            None => Ok(false),
        }
    }

    /// Stops the bus listener and waits for in-flight background
    /// refreshes to settle.
    pub async fn shutdown(&self) {
        if let Some(task) = self.inner.bus_task.lock().take() {
            task.abort();
        }
        let tasks: Vec<JoinHandle<()>> = std::mem::take(&mut *self.inner.refresh_tasks.lock());
        for task in tasks {
            let _ = task.await;
        }
        debug!(namespace = %self.inner.config.namespace, "Cache shut down");
    }

    async fn fill_with_lock(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: Arc<dyn CacheLoader>,
    ) -> Result<Value, CacheError> {
        let backend = self
            .inner
            .backend
            .as_ref()
            .map(Arc::clone)
            .expect("fill_with_lock requires a backend");

        let lock_config = FillLockConfig {
            ttl: Duration::from_secs(self.inner.config.lock.ttl_secs),
            acquire_timeout: Duration::from_secs(self.inner.config.lock.acquire_timeout_secs),
            poll_interval: Duration::from_millis(self.inner.config.lock.poll_interval_ms),
        };
        let lock = match FillLock::new(backend, &key.full, lock_config) {
            Ok(lock) => Some(lock),
            Err(err) => {
                warn!(key = %key, error = %err, "Fill lock unavailable; proceeding uncoordinated");
                None
            },
        };

        let held = match lock.as_ref() {
            Some(lock) => match lock.acquire().await {
                Ok(LockOutcome::Acquired) => {
                    self.inner.metrics.record_lock_acquired();
                    true
                },
                Ok(LockOutcome::TimedOut) => {
                    self.inner.metrics.record_lock_timeout();
                    false
                },
                Err(err) => {
                    // Lock coordination is best-effort: a stampede window
                    // beats failing the request.
                    warn!(key = %key, error = %err, "Fill lock acquire failed; proceeding uncoordinated");
                    false
                },
            },
            None => false,
        };

        if held && let Some(value) = self.double_check(key, ttl).await {
            if let Some(lock) = lock.as_ref() {
                lock.release().await;
            }
            return Ok(value);
        }

        let outcome = self.compute_and_store(key, ttl, &loader).await;
        if held && let Some(lock) = lock.as_ref() {
            lock.release().await;
        }
        outcome
    }

    /// Another holder may have filled the cache while we waited.
    async fn double_check(&self, key: &CacheKey, ttl: Duration) -> Option<Value> {
        if let Some(l1) = self.inner.l1.as_ref()
            && let Some(hit) = l1.get(&key.full)
            && let Ok(value) = self.inner.pipeline.decode(key, &hit.payload)
        {
            self.inner.metrics.record_hit(Tier::L1, &key.namespace);
            return Some(value);
        }
        if let Ok(Some(bytes)) = self.inner.guarded_get(key).await
            && let Ok(value) = self.inner.pipeline.decode(key, &bytes)
        {
            self.inner.metrics.record_hit(Tier::L2, &key.namespace);
            self.l1_put(key, bytes, ttl);
            return Some(value);
        }
        None
    }

    async fn compute_and_store(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: &Arc<dyn CacheLoader>,
    ) -> Result<Value, CacheError> {
        let value = self.run_loader(loader).await?;

        let blob = match self.inner.pipeline.encode(key, &value) {
            Ok(blob) => blob,
            Err(err) => {
                // The value exists; only caching failed. Fail-open callers
                // still get their result.
                warn!(key = %key, error = %err, "Encode failed; value not cached");
                self.inner.metrics.record_error(err.kind_label());
                return match self.inner.config.fallback {
                    FallbackPolicy::FailClosed => Err(err),
                    _ => Ok(value),
                };
            },
        };

        if self.inner.backend.is_some()
            && let Err(err) = self.inner.guarded_set(key, &blob, ttl).await
        {
            self.inner.metrics.record_error(guard_kind(&err));
            return match self.inner.config.fallback {
                FallbackPolicy::FailClosed => Err(err.into()),
                _ => {
                    debug!(key = %key, "L2 set failed; returning uncached value");
                    Ok(value)
                },
            };
        }

        self.l1_put(key, blob, ttl);
        Ok(value)
    }

    async fn fill_local(
        &self,
        key: &CacheKey,
        ttl: Duration,
        loader: Arc<dyn CacheLoader>,
    ) -> Result<Value, CacheError> {
        let value = self.run_loader(&loader).await?;
        match self.inner.pipeline.encode(key, &value) {
            Ok(blob) => {
                self.l1_put(key, blob, ttl);
                Ok(value)
            },
            Err(err) => {
                self.inner.metrics.record_error(err.kind_label());
                match self.inner.config.fallback {
                    FallbackPolicy::FailClosed => Err(err),
                    _ => Ok(value),
                }
            },
        }
    }

    async fn fallback(
        &self,
        key: &CacheKey,
        err: CacheError,
        stale_payload: Option<Vec<u8>>,
        loader: &Arc<dyn CacheLoader>,
    ) -> Result<Value, CacheError> {
        match self.inner.config.fallback {
            FallbackPolicy::FailClosed => Err(err),
            FallbackPolicy::StaleOnError => {
                if let Some(bytes) = stale_payload
                    && let Ok(value) = self.inner.pipeline.decode(key, &bytes)
                {
                    warn!(key = %key, error = %err, "Serving stale L1 data during L2 outage");
                    return Ok(value);
                }
                debug!(key = %key, error = %err, "No stale data; computing uncached");
                self.run_loader(loader).await
            },
            FallbackPolicy::FailOpen => {
                debug!(key = %key, error = %err, "Cache unavailable; computing uncached");
                self.run_loader(loader).await
            },
        }
    }

    async fn run_loader(&self, loader: &Arc<dyn CacheLoader>) -> Result<Value, CacheError> {
        let started = Instant::now();
        let outcome = loader.load().await;
        self.inner.metrics.observe_loader(started.elapsed().as_secs_f64());
        outcome.map_err(|source| CacheError::Application { source })
    }

    fn l1_put(&self, key: &CacheKey, blob: Vec<u8>, ttl: Duration) {
        if let Some(l1) = self.inner.l1.as_ref() {
            l1.put(&key.full, &key.namespace, blob, ttl);
        }
    }

    fn spawn_refresh(&self, key: CacheKey, hit: &L1Hit, loader: Arc<dyn CacheLoader>) {
        let Ok(permit) = Arc::clone(&self.inner.refresh_slots).try_acquire_owned() else {
            // Saturated pool: skip, the stale read stands until retried.
            self.inner.metrics.record_refresh_skip();
            if let Some(l1) = self.inner.l1.as_ref() {
                l1.clear_refreshing(&key.full);
            }
            return;
        };

        let inner = Arc::clone(&self.inner);
        let version = hit.version;
        let remaining = hit.ttl_remaining;
        let task = runtime::spawn(async move {
            let _permit = permit;
            refresh_entry(&inner, &key, version, remaining, loader).await;
        });

        let mut tasks = self.inner.refresh_tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(task);
    }

    fn publish(&self, scope: InvalidationScope) {
        if !self.inner.config.l1.invalidation_enabled {
            return;
        }
        if let Some(bus) = self.inner.bus.as_ref() {
            let event =
                InvalidationEvent { scope, source_id: self.inner.source_id.clone() };
            if let Err(err) = bus.publish(event) {
                // Best-effort: peers converge at TTL expiry.
                warn!(error = %err, "Invalidation publish failed");
            }
        }
    }

    fn touch_l1_gauges(&self) {
        if let Some(l1) = self.inner.l1.as_ref() {
            let stats = l1.stats();
            self.inner.metrics.set_l1_usage(stats.resident_bytes, stats.evictions);
        }
    }
}

/// Body of a background SWR refresh task.
async fn refresh_entry(
    inner: &Arc<CacheInner>,
    key: &CacheKey,
    version: u64,
    remaining_ttl: Duration,
    loader: Arc<dyn CacheLoader>,
) {
    let value = match loader.load().await {
        Ok(value) => value,
        Err(err) => {
            debug!(key = %key, error = %err, "Background refresh loader failed");
            inner.metrics.record_error("application");
            if let Some(l1) = inner.l1.as_ref() {
                l1.clear_refreshing(&key.full);
            }
            return;
        },
    };

    let blob = match inner.pipeline.encode(key, &value) {
        Ok(blob) => blob,
        Err(err) => {
            debug!(key = %key, error = %err, "Background refresh encode failed");
            inner.metrics.record_error(err.kind_label());
            if let Some(l1) = inner.l1.as_ref() {
                l1.clear_refreshing(&key.full);
            }
            return;
        },
    };

    // Refresh renews content, not lifetime: the L2 write carries the
    // entry's remaining TTL, so both tiers still expire on schedule.
    if inner.backend.is_some() && !remaining_ttl.is_zero() {
        if let Err(err) = inner.guarded_set(key, &blob, remaining_ttl).await {
            debug!(key = %key, error = %err, "Background refresh L2 write failed");
            inner.metrics.record_error(guard_kind(&err));
        }
    }

    if let Some(l1) = inner.l1.as_ref() {
        if l1.refresh_payload(&key.full, blob, version) {
            inner.metrics.record_refresh();
            trace!(key = %key, "Background refresh applied");
        } else {
            inner.metrics.record_refresh_discard();
        }
    }
}

impl CacheInner {
    pub(crate) async fn guarded_get(
        &self,
        key: &CacheKey,
    ) -> Result<Option<Vec<u8>>, GuardError> {
        self.guarded(key, OpClass::Get, |backend, key| async move {
            backend.get(&key).await
        })
        .await
    }

    pub(crate) async fn guarded_set(
        &self,
        key: &CacheKey,
        blob: &[u8],
        ttl: Duration,
    ) -> Result<(), GuardError> {
        let blob = blob.to_vec();
        self.guarded(key, OpClass::Set, move |backend, key| async move {
            backend.set(&key, &blob, Some(ttl)).await
        })
        .await
    }

    pub(crate) async fn guarded_delete(&self, key: &CacheKey) -> Result<bool, GuardError> {
        self.guarded(key, OpClass::Delete, |backend, key| async move {
            backend.delete(&key).await
        })
        .await
    }

    pub(crate) async fn guarded_exists(&self, key: &CacheKey) -> Result<bool, GuardError> {
        self.guarded(key, OpClass::Exists, |backend, key| async move {
            backend.exists(&key).await
        })
        .await
    }

    async fn guarded<T, F, Fut>(
        &self,
        key: &CacheKey,
        op: OpClass,
        call: F,
    ) -> Result<T, GuardError>
    where
        F: FnOnce(Arc<dyn CacheBackend>, String) -> Fut,
        Fut: Future<Output = Result<T, tiercache_backend::BackendError>>,
    {
        let backend =
            self.backend.as_ref().map(Arc::clone).expect("guarded call requires a backend");
        let started = Instant::now();
        let result = self
            .reliability
            .call(&key.namespace, op, call(backend, key.full.clone()))
            .await;

        if result.is_ok() {
            self.metrics.observe_op(Tier::L2, op.as_str(), started.elapsed().as_secs_f64());
        }
        self.metrics.set_circuit_state(
            &key.namespace,
            op.as_str(),
            self.reliability.breaker_state(&key.namespace, op),
        );
        result
    }
}

fn guard_kind(err: &GuardError) -> &'static str {
    match err {
        GuardError::CircuitOpen { .. } => "circuit_open",
        GuardError::BackpressureRejected { .. } => "backpressure",
        GuardError::Timeout { .. } => "timeout",
        GuardError::Backend(_) => "backend",
    }
}
