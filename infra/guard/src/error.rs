//! Errors produced by the reliability envelope.

use std::time::Duration;
use tiercache_backend::BackendError;

/// Outcome of a guarded L2 call that did not reach the backend, or that
/// the backend failed.
#[derive(Debug, thiserror::Error)]
pub enum GuardError {
    /// The breaker is open; the call was short-circuited without touching
    /// the backend. Does not feed the breaker.
    #[error("circuit open for {namespace}/{operation}; probe in {retry_after:?}")]
    CircuitOpen { namespace: String, operation: &'static str, retry_after: Duration },

    /// Too many calls already in flight; rejected instead of queued.
    /// A rejection, not a failure; does not feed the breaker.
    #[error(
        "backpressure rejected {namespace}/{operation}: {max_concurrent} calls already in flight"
    )]
    BackpressureRejected { namespace: String, operation: &'static str, max_concurrent: usize },

    /// The call exceeded the adaptive timeout. Transient; feeds the breaker.
    #[error("{namespace}/{operation} timed out after {timeout:?}")]
    Timeout { namespace: String, operation: &'static str, timeout: Duration },

    /// The backend itself failed; see [`BackendError::kind`] for the
    /// transient/permanent split.
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl GuardError {
    /// Whether the reliability layer (not the caller's input) caused the
    /// failure; these are the errors the cache handler's fallback policy
    /// applies to.
    #[must_use]
    pub const fn is_availability(&self) -> bool {
        match self {
            Self::CircuitOpen { .. } | Self::BackpressureRejected { .. } | Self::Timeout { .. } => {
                true
            },
            Self::Backend(err) => err.is_transient(),
        }
    }
}
