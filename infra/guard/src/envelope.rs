//! Composition of admission, breaker, and timeout around one L2 call.

use crate::admission::{Admission, BackpressureConfig};
use crate::breaker::{self, BreakerConfig, CircuitBreaker, CircuitState};
use crate::error::GuardError;
use crate::timeout::{AdaptiveTimeout, TimeoutConfig};
use fxhash::FxHashMap;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::Arc;
use tiercache_backend::BackendError;
use tokio::time::Instant;
use tracing::trace;

/// Operation classes with independent breaker and timeout state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpClass {
    Get,
    Set,
    Delete,
    Exists,
}

impl OpClass {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Delete => "delete",
            Self::Exists => "exists",
        }
    }
}

/// Envelope tuning; each stage may be disabled independently.
#[derive(Debug, Clone, Default)]
pub struct ReliabilityConfig {
    pub breaker: Option<BreakerConfig>,
    pub timeout: Option<TimeoutConfig>,
    pub backpressure: Option<BackpressureConfig>,
}

impl ReliabilityConfig {
    /// Everything enabled with default tuning.
    #[must_use]
    pub fn standard() -> Self {
        Self {
            breaker: Some(BreakerConfig::default()),
            timeout: Some(TimeoutConfig::default()),
            backpressure: Some(BackpressureConfig::default()),
        }
    }
}

#[derive(Debug)]
struct Cell {
    breaker: Option<CircuitBreaker>,
    timeout: Option<AdaptiveTimeout>,
    admission: Option<Admission>,
}

impl Cell {
    fn new(config: &ReliabilityConfig) -> Self {
        Self {
            breaker: config.breaker.clone().map(CircuitBreaker::new),
            timeout: config.timeout.clone().map(AdaptiveTimeout::new),
            admission: config.backpressure.as_ref().map(Admission::new),
        }
    }
}

/// Shared registry of reliability cells, one per (namespace, op-class).
///
/// Every caller of a namespace shares its breaker state and latency
/// window, so one caller's failures protect all of them.
#[derive(Debug)]
pub struct ReliabilitySet {
    config: ReliabilityConfig,
    cells: RwLock<FxHashMap<(String, OpClass), Arc<Cell>>>,
}

impl ReliabilitySet {
    #[must_use]
    pub fn new(config: ReliabilityConfig) -> Self {
        Self { config, cells: RwLock::new(FxHashMap::default()) }
    }

    /// Runs `operation` under the envelope for (namespace, op).
    ///
    /// Stage order is fixed: admission, breaker, timeout, invoke,
    /// classify. Success records latency and heals the breaker; transient
    /// failures and timeouts advance it; permanent failures pass through
    /// untouched.
    pub async fn call<T, F>(
        &self,
        namespace: &str,
        op: OpClass,
        operation: F,
    ) -> Result<T, GuardError>
    where
        F: Future<Output = Result<T, BackendError>>,
    {
        let cell = self.cell(namespace, op);

        let _permit = match cell.admission.as_ref() {
            Some(admission) => match admission.try_acquire() {
                Some(permit) => Some(permit),
                None => {
                    return Err(GuardError::BackpressureRejected {
                        namespace: namespace.to_owned(),
                        operation: op.as_str(),
                        max_concurrent: admission.max_concurrent(),
                    });
                },
            },
            None => None,
        };

        let now = Instant::now();
        if let Some(breaker) = cell.breaker.as_ref()
            && let breaker::Admission::ShortCircuit { retry_after } = breaker.admit(now)
        {
            return Err(GuardError::CircuitOpen {
                namespace: namespace.to_owned(),
                operation: op.as_str(),
                retry_after,
            });
        }

        let started = Instant::now();
        let outcome = match cell.timeout.as_ref() {
            Some(timeout) => {
                let limit = timeout.effective();
                match tokio::time::timeout(limit, operation).await {
                    Ok(outcome) => outcome,
                    Err(_) => {
                        if let Some(breaker) = cell.breaker.as_ref() {
                            breaker.record_transient_failure(Instant::now());
                        }
                        return Err(GuardError::Timeout {
                            namespace: namespace.to_owned(),
                            operation: op.as_str(),
                            timeout: limit,
                        });
                    },
                }
            },
            None => operation.await,
        };

        match outcome {
            Ok(value) => {
                let elapsed = started.elapsed();
                if let Some(timeout) = cell.timeout.as_ref() {
                    timeout.record(elapsed);
                }
                if let Some(breaker) = cell.breaker.as_ref() {
                    breaker.record_success();
                }
                trace!(namespace, op = op.as_str(), ?elapsed, "Guarded call succeeded");
                Ok(value)
            },
            Err(err) => {
                if let Some(breaker) = cell.breaker.as_ref() {
                    if err.is_transient() {
                        breaker.record_transient_failure(Instant::now());
                    } else {
                        breaker.record_permanent_failure();
                    }
                }
                Err(GuardError::Backend(err))
            },
        }
    }

    /// Breaker state for metrics; `Closed` when the breaker is disabled.
    #[must_use]
    pub fn breaker_state(&self, namespace: &str, op: OpClass) -> CircuitState {
        self.cell(namespace, op)
            .breaker
            .as_ref()
            .map_or(CircuitState::Closed, CircuitBreaker::state)
    }

    fn cell(&self, namespace: &str, op: OpClass) -> Arc<Cell> {
        if let Some(cell) = self.cells.read().get(&(namespace.to_owned(), op)) {
            return Arc::clone(cell);
        }
        let mut cells = self.cells.write();
        let cell = cells
            .entry((namespace.to_owned(), op))
            .or_insert_with(|| Arc::new(Cell::new(&self.config)));
        Arc::clone(cell)
    }
}
