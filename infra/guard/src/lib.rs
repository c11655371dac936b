//! Reliability envelope around L2 backend calls.
//!
//! Every call to the shared store passes through three independent stages,
//! each disable-able on its own:
//!
//! 1. **Admission**: bounded in-flight calls per (namespace, op-class);
//!    saturation rejects immediately with `BackpressureRejected` rather
//!    than queueing behind a slow backend.
//! 2. **Circuit breaker**: `CLOSED -> OPEN` after a run of consecutive
//!    transient failures, `OPEN → HALF_OPEN` after a cooldown, one probe
//!    decides the rest. Permanent errors (auth, protocol) pass through
//!    without feeding the breaker, and user-computation errors never reach
//!    this layer at all.
//! 3. **Adaptive timeout**: p99 of a rolling latency window times a
//!    headroom multiplier, clamped to configured bounds.
//!
//! Cells are shared per (namespace, operation-class): every caller of a
//! namespace benefits from, and contributes to, the same failure
//! history.

mod admission;
mod breaker;
mod envelope;
mod error;
mod timeout;

pub use admission::{Admission, AdmissionPermit, BackpressureConfig};
pub use breaker::{BreakerConfig, CircuitBreaker, CircuitState};
pub use envelope::{OpClass, ReliabilityConfig, ReliabilitySet};
pub use error::GuardError;
pub use timeout::{AdaptiveTimeout, TimeoutConfig};
