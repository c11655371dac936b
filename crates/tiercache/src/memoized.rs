//! The decorator shape: bind one computation to the cache.
//!
//! There is no reflection on the wrapped callable: the caller supplies a
//! stable identity string, and the binding pairs it with the cache's
//! namespace, an optional TTL override, and the loader for each call.

use crate::error::CacheError;
use crate::handler::{Cache, CacheLoader};
use crate::keys::CacheKey;
use crate::runtime;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tiercache_codec::Value;

/// A memoized computation.
///
/// ```rust
/// use tiercache::{Cache, CacheConfig, Memoized, Value};
///
/// # fn main() -> Result<(), tiercache::CacheError> {
/// let cache = Cache::builder().config(CacheConfig::test()).build()?;
/// let profile = Memoized::new(&cache, "user_profile").ttl(Duration::from_secs(60));
///
/// let value = profile.call_blocking(&[Value::Int(7)], &Default::default(), || async {
///     Ok(Value::Text("ada".into()))
/// })?;
/// assert_eq!(value, Value::Text("ada".into()));
/// # Ok(())
/// # }
/// # use std::time::Duration;
/// ```
#[derive(Debug, Clone)]
pub struct Memoized {
    cache: Cache,
    identity: String,
    ttl_override: Option<Duration>,
}

impl Memoized {
    /// Binds `identity` to `cache`. The identity must be stable across
    /// runs and deployments; it is part of every derived key.
    pub fn new(cache: &Cache, identity: impl Into<String>) -> Self {
        Self { cache: cache.clone(), identity: identity.into(), ttl_override: None }
    }

    /// Overrides the cache-wide TTL for this computation.
    #[must_use]
    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// The key this binding derives for a set of arguments.
    #[must_use]
    pub fn key(&self, args: &[Value], kwargs: &BTreeMap<String, Value>) -> CacheKey {
        self.cache.key(&self.identity, args, kwargs)
    }

    /// Memoized invocation: cached value when live, `loader` otherwise.
    ///
    /// # Errors
    /// Loader failures surface as [`CacheError::Application`]; cache-layer
    /// failures follow the configured fallback policy.
    pub async fn call<L>(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
        loader: L,
    ) -> Result<Value, CacheError>
    where
        L: CacheLoader + 'static,
    {
        let key = self.key(args, kwargs);
        self.cache.read_or_fill(&key, self.ttl_override, Arc::new(loader)).await
    }

    /// [`Memoized::call`] for synchronous callers, dispatched on the
    /// shared runtime.
    ///
    /// # Errors
    /// Additionally returns [`CacheError::Configuration`] when invoked
    /// from inside an async context; use [`Memoized::call`] there.
    pub fn call_blocking<L>(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
        loader: L,
    ) -> Result<Value, CacheError>
    where
        L: CacheLoader + 'static,
    {
        runtime::block_on(self.call(args, kwargs, loader)).ok_or_else(|| {
            CacheError::Configuration {
                reason: "call_blocking invoked inside an async context; use call() instead".into(),
            }
        })?
    }

    /// Drops the cached entry for one set of arguments.
    ///
    /// # Errors
    /// Propagates guarded L2 failures.
    pub async fn invalidate(
        &self,
        args: &[Value],
        kwargs: &BTreeMap<String, Value>,
    ) -> Result<bool, CacheError> {
        let key = self.key(args, kwargs);
        self.cache.invalidate(&key).await
    }
}
