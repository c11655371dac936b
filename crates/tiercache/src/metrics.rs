//! Observable side effects: counters, histograms, gauges.
//!
//! The cache owns a private [`Registry`]; how (or whether) it is exposed
//! is the embedding application's business. Only presence is guaranteed.

use crate::error::CacheError;
use prometheus::{
    Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    Opts, Registry,
};
use tiercache_guard::CircuitState;

/// Which tier served or failed an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    L1,
    L2,
}

impl Tier {
    const fn as_str(self) -> &'static str {
        match self {
            Self::L1 => "l1",
            Self::L2 => "l2",
        }
    }
}

#[derive(Debug)]
pub struct CacheMetrics {
    registry: Registry,
    hits: IntCounterVec,
    misses: IntCounterVec,
    errors: IntCounterVec,
    op_latency: HistogramVec,
    loader_latency: Histogram,
    circuit_state: IntGaugeVec,
    lock_acquisitions: IntCounter,
    lock_timeouts: IntCounter,
    refreshes: IntCounter,
    refresh_discards: IntCounter,
    refresh_skips: IntCounter,
    l1_resident_bytes: IntGauge,
    l1_evictions: IntGauge,
}

impl CacheMetrics {
    /// Builds and registers every instrument in a fresh registry.
    ///
    /// # Errors
    /// Returns [`CacheError::Configuration`] if registration fails
    /// (duplicate names cannot happen inside one registry).
    pub fn new() -> Result<Self, CacheError> {
        let registry = Registry::new();

        let hits = IntCounterVec::new(
            Opts::new("tiercache_hits_total", "Cache hits by tier and namespace"),
            &["tier", "namespace"],
        )
        .map_err(metric_err)?;
        let misses = IntCounterVec::new(
            Opts::new("tiercache_misses_total", "Cache misses by tier and namespace"),
            &["tier", "namespace"],
        )
        .map_err(metric_err)?;
        let errors = IntCounterVec::new(
            Opts::new("tiercache_errors_total", "Cache-layer errors by kind"),
            &["kind"],
        )
        .map_err(metric_err)?;
        let op_latency = HistogramVec::new(
            HistogramOpts::new("tiercache_op_seconds", "Cache operation latency")
                .buckets(vec![0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]),
            &["tier", "op"],
        )
        .map_err(metric_err)?;
        let loader_latency = Histogram::with_opts(
            HistogramOpts::new("tiercache_loader_seconds", "User computation latency")
                .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0]),
        )
        .map_err(metric_err)?;
        let circuit_state = IntGaugeVec::new(
            Opts::new(
                "tiercache_circuit_state",
                "Breaker state (0=closed, 1=half-open, 2=open)",
            ),
            &["namespace", "op"],
        )
        .map_err(metric_err)?;
        let lock_acquisitions =
            IntCounter::new("tiercache_lock_acquisitions_total", "Fill locks acquired")
                .map_err(metric_err)?;
        let lock_timeouts = IntCounter::new(
            "tiercache_lock_timeouts_total",
            "Fill-lock waits that timed out into uncoordinated fills",
        )
        .map_err(metric_err)?;
        let refreshes =
            IntCounter::new("tiercache_refreshes_total", "Background refreshes completed")
                .map_err(metric_err)?;
        let refresh_discards = IntCounter::new(
            "tiercache_refresh_discards_total",
            "Refresh results discarded after a version race",
        )
        .map_err(metric_err)?;
        let refresh_skips = IntCounter::new(
            "tiercache_refresh_skips_total",
            "Refreshes skipped because the worker pool was saturated",
        )
        .map_err(metric_err)?;
        let l1_resident_bytes =
            IntGauge::new("tiercache_l1_resident_bytes", "Live L1 payload bytes")
                .map_err(metric_err)?;
        let l1_evictions =
            IntGauge::new("tiercache_l1_evictions_total", "L1 LRU victims evicted")
                .map_err(metric_err)?;

        for collector in [
            Box::new(hits.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(misses.clone()),
            Box::new(errors.clone()),
            Box::new(op_latency.clone()),
            Box::new(loader_latency.clone()),
            Box::new(circuit_state.clone()),
            Box::new(lock_acquisitions.clone()),
            Box::new(lock_timeouts.clone()),
            Box::new(refreshes.clone()),
            Box::new(refresh_discards.clone()),
            Box::new(refresh_skips.clone()),
            Box::new(l1_resident_bytes.clone()),
            Box::new(l1_evictions.clone()),
        ] {
            registry.register(collector).map_err(metric_err)?;
        }

        Ok(Self {
            registry,
            hits,
            misses,
            errors,
            op_latency,
            loader_latency,
            circuit_state,
            lock_acquisitions,
            lock_timeouts,
            refreshes,
            refresh_discards,
            refresh_skips,
            l1_resident_bytes,
            l1_evictions,
        })
    }

    /// The registry backing every instrument, for exposition wiring.
    #[must_use]
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub(crate) fn record_hit(&self, tier: Tier, namespace: &str) {
        self.hits.with_label_values(&[tier.as_str(), namespace]).inc();
    }

    pub(crate) fn record_miss(&self, tier: Tier, namespace: &str) {
        self.misses.with_label_values(&[tier.as_str(), namespace]).inc();
    }

    pub(crate) fn record_error(&self, kind: &str) {
        self.errors.with_label_values(&[kind]).inc();
    }

    pub(crate) fn observe_op(&self, tier: Tier, op: &str, seconds: f64) {
        self.op_latency.with_label_values(&[tier.as_str(), op]).observe(seconds);
    }

    pub(crate) fn observe_loader(&self, seconds: f64) {
        self.loader_latency.observe(seconds);
    }

    pub(crate) fn set_circuit_state(&self, namespace: &str, op: &str, state: CircuitState) {
        let value = match state {
            CircuitState::Closed => 0,
            CircuitState::HalfOpen => 1,
            CircuitState::Open => 2,
        };
        self.circuit_state.with_label_values(&[namespace, op]).set(value);
    }

    pub(crate) fn record_lock_acquired(&self) {
        self.lock_acquisitions.inc();
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.inc();
    }

    pub(crate) fn record_refresh(&self) {
        self.refreshes.inc();
    }

    pub(crate) fn record_refresh_discard(&self) {
        self.refresh_discards.inc();
    }

    pub(crate) fn record_refresh_skip(&self) {
        self.refresh_skips.inc();
    }

    pub(crate) fn set_l1_usage(&self, resident_bytes: usize, evictions: u64) {
        self.l1_resident_bytes.set(resident_bytes as i64);
        self.l1_evictions.set(evictions as i64);
    }
}

fn metric_err(err: prometheus::Error) -> CacheError {
    CacheError::Configuration { reason: format!("metrics registration failed: {err}").into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_instruments_register() {
        let metrics = CacheMetrics::new().unwrap();
        metrics.record_hit(Tier::L1, "ns");
        metrics.record_miss(Tier::L2, "ns");
        metrics.record_error("timeout");
        metrics.observe_op(Tier::L2, "get", 0.02);
        metrics.set_circuit_state("ns", "get", CircuitState::Open);
        metrics.set_l1_usage(1024, 3);

        let families = metrics.registry().gather();
        assert!(families.iter().any(|f| f.get_name() == "tiercache_hits_total"));
        assert!(families.iter().any(|f| f.get_name() == "tiercache_circuit_state"));
    }
}
