//! Cache configuration: one struct, named-constructor presets, layered
//! file + environment loading.
//!
//! The orchestrator consumes only [`CacheConfig`]; presets are plain
//! functions returning a fully formed, valid configuration. Process-wide
//! defaults come from an optional file overlaid with
//! `TIERCACHE__`-prefixed environment variables (double underscore for
//! nesting, e.g. `TIERCACHE__L1__MAX_SIZE_MB=64`).

use crate::error::CacheError;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Which serializer strategy encodes values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SerializerKind {
    /// General binary (postcard): admits every value.
    #[default]
    Binary,
    /// UTF-8 JSON fast path; rejects raw bytes.
    Json,
    /// Columnar tables; rejects non-table shapes.
    Columnar,
    /// Raw numeric arrays; skips compression.
    RawNumeric,
}

/// What the handler does when the cache layer itself fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Compute and return the value without caching. Cache failures never
    /// break callers. The default.
    #[default]
    FailOpen,
    /// Propagate the cache error.
    FailClosed,
    /// Serve stale L1 data when any is present, else behave like
    /// `FailOpen`.
    StaleOnError,
}

/// L1 tier tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct L1Config {
    pub enabled: bool,
    pub max_size_mb: usize,
    pub swr_enabled: bool,
    /// Fraction of the TTL after which an entry turns stale (0.1..=1.0).
    pub swr_threshold_ratio: f64,
    /// Jitter the freshness deadline by ±10% to spread refreshes.
    /// Disable for deterministic tests.
    pub swr_jitter: bool,
    /// Publish and apply invalidation events on the bus.
    pub invalidation_enabled: bool,
    /// Secondary index for O(|namespace|) invalidation.
    pub namespace_index: bool,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            enabled: true,
            max_size_mb: 100,
            swr_enabled: true,
            swr_threshold_ratio: 0.8,
            swr_jitter: true,
            invalidation_enabled: true,
            namespace_index: true,
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BreakerSettings {
    pub enabled: bool,
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub failure_window_secs: u64,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            failure_threshold: 5,
            recovery_timeout_secs: 30,
            failure_window_secs: 60,
        }
    }
}

/// Adaptive timeout tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub enabled: bool,
    pub base_ms: u64,
    pub multiplier: f64,
    pub max_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self { enabled: true, base_ms: 200, multiplier: 2.0, max_ms: 5_000 }
    }
}

/// Admission control tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackpressureSettings {
    pub enabled: bool,
    pub max_concurrent: usize,
}

impl Default for BackpressureSettings {
    fn default() -> Self {
        Self { enabled: true, max_concurrent: 64 }
    }
}

/// Distributed fill-lock tuning.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LockSettings {
    /// Lock TTL; must exceed expected loader latency plus margin.
    pub ttl_secs: u64,
    /// How long waiters poll before computing uncoordinated.
    pub acquire_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for LockSettings {
    fn default() -> Self {
        Self { ttl_secs: 30, acquire_timeout_secs: 10, poll_interval_ms: 50 }
    }
}

/// Encryption settings. The master key is hex-encoded in configuration
/// sources and decoded once at construction; it never appears in logs or
/// `Debug` output.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EncryptionSettings {
    pub master_key: Option<SecretHex>,
    pub retired_keys: Vec<SecretHex>,
    /// Refuse to build without a master key (set by the `secure` preset).
    pub required: bool,
}

/// A hex-encoded secret that redacts itself from `Debug`.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretHex(pub String);

impl std::fmt::Debug for SecretHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretHex(****)")
    }
}

impl From<&str> for SecretHex {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

/// Connection defaults handed to whatever L2 client the application wires
/// in. The core never opens connections itself.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BackendSettings {
    pub url: Option<String>,
    pub pool_size: usize,
    pub socket_timeout_ms: u64,
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self { url: None, pool_size: 8, socket_timeout_ms: 3_000 }
    }
}

/// The complete cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key prefix and invalidation scope.
    pub namespace: String,
    /// Default TTL in seconds; L2 expiry and basis for L1 deadlines.
    pub ttl_secs: u64,
    pub serializer: SerializerKind,
    pub fallback: FallbackPolicy,
    pub l1: L1Config,
    pub circuit_breaker: BreakerSettings,
    pub timeout: TimeoutSettings,
    pub backpressure: BackpressureSettings,
    pub lock: LockSettings,
    pub encryption: EncryptionSettings,
    pub backend: BackendSettings,
    /// Bounded worker pool for SWR background refreshes; a saturated pool
    /// skips the refresh and the stale read stands.
    pub refresh_workers: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_owned(),
            ttl_secs: 300,
            serializer: SerializerKind::default(),
            fallback: FallbackPolicy::default(),
            l1: L1Config::default(),
            circuit_breaker: BreakerSettings::default(),
            timeout: TimeoutSettings::default(),
            backpressure: BackpressureSettings::default(),
            lock: LockSettings::default(),
            encryption: EncryptionSettings::default(),
            backend: BackendSettings::default(),
            refresh_workers: 4,
        }
    }
}

impl CacheConfig {
    /// Bare two-tier lookup: no SWR, no breaker, no timeout, no
    /// backpressure, no bus. The smallest thing that is still a cache.
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            l1: L1Config {
                swr_enabled: false,
                invalidation_enabled: false,
                namespace_index: false,
                ..L1Config::default()
            },
            circuit_breaker: BreakerSettings { enabled: false, ..BreakerSettings::default() },
            timeout: TimeoutSettings { enabled: false, ..TimeoutSettings::default() },
            backpressure: BackpressureSettings { enabled: false, ..BackpressureSettings::default() },
            ..Self::default()
        }
    }

    /// Local development: short TTLs, small L1, everything observable.
    #[must_use]
    pub fn dev() -> Self {
        Self {
            ttl_secs: 60,
            l1: L1Config { max_size_mb: 16, ..L1Config::default() },
            ..Self::default()
        }
    }

    /// Production defaults: the full reliability envelope, SWR, and
    /// cross-process invalidation.
    #[must_use]
    pub fn production() -> Self {
        Self::default()
    }

    /// Production plus mandatory encryption: building without a master
    /// key is a configuration error.
    #[must_use]
    pub fn secure() -> Self {
        Self {
            encryption: EncryptionSettings { required: true, ..EncryptionSettings::default() },
            ..Self::default()
        }
    }

    /// Deterministic testing: tiny L1, jitter off, single refresh worker,
    /// lock polling tightened.
    #[must_use]
    pub fn test() -> Self {
        Self {
            ttl_secs: 60,
            l1: L1Config { max_size_mb: 4, swr_jitter: false, ..L1Config::default() },
            lock: LockSettings { ttl_secs: 5, acquire_timeout_secs: 2, poll_interval_ms: 10 },
            refresh_workers: 1,
            ..Self::default()
        }
    }

    /// Loads process-wide defaults: optional file, then `TIERCACHE__*`
    /// environment overrides.
    ///
    /// # Errors
    /// Returns [`CacheError::Configuration`] when the file is missing or
    /// a value does not deserialize.
    pub fn load(path: Option<impl AsRef<Path>>) -> Result<Self, CacheError> {
        let mut builder = Config::builder();
        if let Some(path) = path.as_ref() {
            info!("Loading cache config from {}", path.as_ref().display());
            builder = builder.add_source(File::from(path.as_ref()).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("TIERCACHE")
                .separator("__")
                .convert_case(config::Case::Snake),
        );

        let loaded: Self = builder
            .build()
            .map_err(|err| CacheError::Configuration { reason: err.to_string().into() })?
            .try_deserialize()
            .map_err(|err| CacheError::Configuration { reason: err.to_string().into() })?;
        loaded.validate()?;
        Ok(loaded)
    }

    /// Checks cross-field rules the type system cannot.
    ///
    /// # Errors
    /// Returns [`CacheError::Configuration`] on the first violation.
    pub fn validate(&self) -> Result<(), CacheError> {
        if self.namespace.is_empty() {
            return Err(invalid("namespace must not be empty"));
        }
        if self.ttl_secs == 0 {
            return Err(invalid("ttl_secs must be positive"));
        }
        if !(0.1..=1.0).contains(&self.l1.swr_threshold_ratio) {
            return Err(invalid("l1.swr_threshold_ratio must be within 0.1..=1.0"));
        }
        if self.l1.enabled && self.l1.max_size_mb == 0 {
            return Err(invalid("l1.max_size_mb must be positive when the L1 is enabled"));
        }
        if self.encryption.required && self.encryption.master_key.is_none() {
            return Err(invalid("secure mode requires encryption.master_key"));
        }
        if self.timeout.enabled && (self.timeout.base_ms == 0 || self.timeout.multiplier < 1.0) {
            return Err(invalid("timeout.base_ms must be positive and multiplier >= 1.0"));
        }
        if self.backpressure.enabled && self.backpressure.max_concurrent == 0 {
            return Err(invalid("backpressure.max_concurrent must be positive"));
        }
        if self.circuit_breaker.enabled && self.circuit_breaker.failure_threshold == 0 {
            return Err(invalid("circuit_breaker.failure_threshold must be positive"));
        }
        if self.lock.ttl_secs == 0 || self.lock.poll_interval_ms == 0 {
            return Err(invalid("lock.ttl_secs and lock.poll_interval_ms must be positive"));
        }
        if self.refresh_workers == 0 {
            return Err(invalid("refresh_workers must be positive"));
        }
        Ok(())
    }

    pub(crate) fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

fn invalid(reason: &'static str) -> CacheError {
    CacheError::Configuration { reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_are_valid() {
        for (name, config) in [
            ("minimal", CacheConfig::minimal()),
            ("dev", CacheConfig::dev()),
            ("production", CacheConfig::production()),
            ("test", CacheConfig::test()),
        ] {
            assert!(config.validate().is_ok(), "{name} preset must validate");
        }
    }

    #[test]
    fn test_secure_without_key_fails() {
        let config = CacheConfig::secure();
        assert!(matches!(config.validate(), Err(CacheError::Configuration { .. })));

        let mut keyed = CacheConfig::secure();
        keyed.encryption.master_key = Some("00".repeat(32).as_str().into());
        assert!(keyed.validate().is_ok());
    }

    #[test]
    fn test_ratio_bounds_enforced() {
        let mut config = CacheConfig::default();
        config.l1.swr_threshold_ratio = 0.05;
        assert!(config.validate().is_err());
        config.l1.swr_threshold_ratio = 1.5;
        assert!(config.validate().is_err());
        config.l1.swr_threshold_ratio = 1.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");
        std::fs::write(
            &path,
            "ttl_secs = 42\nfallback = \"stale_on_error\"\n\n[l1]\nmax_size_mb = 7\nswr_jitter = false\n",
        )
        .unwrap();

        let config = CacheConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ttl_secs, 42);
        assert_eq!(config.fallback, FallbackPolicy::StaleOnError);
        assert_eq!(config.l1.max_size_mb, 7);
        assert!(!config.l1.swr_jitter);
        // Untouched fields keep their defaults.
        assert_eq!(config.namespace, "default");
    }

    #[test]
    fn test_missing_file_is_configuration_error() {
        let result = CacheConfig::load(Some("/nonexistent/cache.toml"));
        assert!(matches!(result, Err(CacheError::Configuration { .. })));
    }

    #[test]
    fn test_secret_debug_is_redacted() {
        let secret = SecretHex("deadbeef".into());
        assert_eq!(format!("{secret:?}"), "SecretHex(****)");
    }
}
