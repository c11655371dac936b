//! Admission control: bounded in-flight calls, fail-fast on saturation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Backpressure tuning.
#[derive(Debug, Clone)]
pub struct BackpressureConfig {
    /// In-flight ceiling per (namespace, operation-class).
    pub max_concurrent: usize,
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self { max_concurrent: 64 }
    }
}

/// Counts in-flight calls; callers over the ceiling are rejected
/// immediately instead of queued.
#[derive(Debug)]
pub struct Admission {
    max_concurrent: usize,
    in_flight: Arc<AtomicUsize>,
}

/// RAII slot; dropping it frees the in-flight count, including on panic
/// or cancellation.
#[derive(Debug)]
pub struct AdmissionPermit {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

impl Admission {
    #[must_use]
    pub fn new(config: &BackpressureConfig) -> Self {
        Self {
            max_concurrent: config.max_concurrent.max(1),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Takes a slot, or `None` when the ceiling is reached.
    #[must_use]
    pub fn try_acquire(&self) -> Option<AdmissionPermit> {
        let previous = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if previous >= self.max_concurrent {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return None;
        }
        Some(AdmissionPermit { in_flight: Arc::clone(&self.in_flight) })
    }

    #[must_use]
    pub const fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }
}
