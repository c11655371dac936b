//! Two-tier memoization cache.
//!
//! TierCache memoizes the result of a user-supplied computation under a
//! stable key, storing encoded bytes in a two-tier hierarchy: an
//! in-process L1 (byte-bounded, TTL-aware, LRU) and a pluggable L2 byte
//! store. The runtime guarantees at-most-one concurrent recomputation of a
//! key across a fleet, degrades gracefully when the L2 is unavailable, and
//! can store only authenticated ciphertext so the L2 never observes
//! plaintext.
//!
//! # Read path
//!
//! key → L1 → (miss) reliability envelope → L2 get → decrypt → decompress →
//! verify checksum → deserialize. On a full miss: fill lock → double-check
//! → user loader → serialize → compress → checksum → encrypt → L2 set →
//! L1 put → release.
//!
//! # Quick start
//!
//! ```rust
//! use std::sync::Arc;
//! use tiercache::{Cache, CacheConfig, Memoized, Value};
//! use tiercache_backend::MemoryBackend;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), tiercache::CacheError> {
//! let cache = Cache::builder()
//!     .config(CacheConfig::test())
//!     .backend(Arc::new(MemoryBackend::new()))
//!     .build()?;
//!
//! let lookup = Memoized::new(&cache, "user_by_id");
//! let value = lookup
//!     .call(&[Value::Int(7)], &Default::default(), || async {
//!         // Stand-in for the expensive computation.
//!         Ok(Value::Text("ada".into()))
//!     })
//!     .await?;
//! assert_eq!(value, Value::Text("ada".into()));
//!
//! cache.shutdown().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration
//!
//! [`CacheConfig`] carries every knob; the presets
//! ([`CacheConfig::minimal`], [`CacheConfig::dev`],
//! [`CacheConfig::production`], [`CacheConfig::secure`],
//! [`CacheConfig::test`]) are named constructors returning coherent
//! combinations. Process-wide defaults load from a file plus
//! `TIERCACHE__*` environment overrides via [`CacheConfig::load`].

mod config;
mod error;
mod handler;
mod keys;
mod memoized;
mod metrics;
mod pipeline;
mod runtime;

pub use config::{
    BackendSettings, BackpressureSettings, BreakerSettings, CacheConfig, EncryptionSettings,
    FallbackPolicy, L1Config, LockSettings, SecretHex, SerializerKind, TimeoutSettings,
};
pub use error::CacheError;
pub use handler::{Cache, CacheBuilder, CacheLoader};
pub use keys::{CacheKey, fingerprint};
pub use memoized::Memoized;
pub use metrics::{CacheMetrics, Tier};

pub use tiercache_codec::Value;

/// Convenience re-exports for embedders.
pub mod prelude {
    pub use crate::{Cache, CacheConfig, CacheError, CacheKey, FallbackPolicy, Memoized, Value};
    pub use tiercache_backend::{CacheBackend, FilesystemBackend, MemoryBackend};
    pub use tiercache_events::{InvalidationBus, LocalBus};
}
