//! Circuit breaker state machine.

use parking_lot::Mutex;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive transient failures that trip the breaker.
    pub failure_threshold: u32,
    /// Cooldown before a single probe is admitted.
    pub recovery_timeout: Duration,
    /// Failures further apart than this restart the consecutive count.
    pub failure_window: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }
    }
}

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
enum State {
    Closed { consecutive: u32, last_failure: Option<Instant> },
    Open { since: Instant },
    HalfOpen { probe_in_flight: bool },
}

/// Per-(namespace, operation-class) circuit breaker.
///
/// Only transient failures advance the count; permanent backend errors and
/// the envelope's own rejections never trip it. One probe is admitted per
/// cooldown lapse; its outcome decides between `CLOSED` and another full
/// cooldown.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: Mutex<State>,
}

/// Admission decision for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allowed,
    /// Call must short-circuit; retry no sooner than this.
    ShortCircuit { retry_after: Duration },
}

impl CircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: Mutex::new(State::Closed { consecutive: 0, last_failure: None }),
        }
    }

    /// Decides whether a call may proceed at `now`.
    pub fn admit(&self, now: Instant) -> Admission {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { .. } => Admission::Allowed,
            State::Open { since } => {
                let elapsed = now.saturating_duration_since(*since);
                if elapsed >= self.config.recovery_timeout {
                    debug!("Circuit half-open; admitting one probe");
                    *state = State::HalfOpen { probe_in_flight: true };
                    Admission::Allowed
                } else {
                    Admission::ShortCircuit {
                        retry_after: self.config.recovery_timeout - elapsed,
                    }
                }
            },
            State::HalfOpen { probe_in_flight } => {
                if *probe_in_flight {
                    // The probe is still out; everyone else keeps failing fast.
                    Admission::ShortCircuit { retry_after: self.config.recovery_timeout }
                } else {
                    *probe_in_flight = true;
                    Admission::Allowed
                }
            },
        }
    }

    /// Records a successful call.
    pub fn record_success(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { consecutive, last_failure } => {
                *consecutive = 0;
                *last_failure = None;
            },
            State::HalfOpen { .. } => {
                debug!("Probe succeeded; circuit closed");
                *state = State::Closed { consecutive: 0, last_failure: None };
            },
            State::Open { .. } => {},
        }
    }

    /// Records a transient failure at `now`; may trip the breaker.
    pub fn record_transient_failure(&self, now: Instant) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { consecutive, last_failure } => {
                let within_window = last_failure
                    .is_some_and(|at| now.saturating_duration_since(at) <= self.config.failure_window);
                *consecutive = if within_window { *consecutive + 1 } else { 1 };
                *last_failure = Some(now);
                if *consecutive >= self.config.failure_threshold {
                    warn!(
                        consecutive = *consecutive,
                        "Failure threshold reached; circuit opened"
                    );
                    *state = State::Open { since: now };
                }
            },
            State::HalfOpen { .. } => {
                debug!("Probe failed; circuit re-opened");
                *state = State::Open { since: now };
            },
            State::Open { .. } => {},
        }
    }

    /// Records a permanent failure. It never advances the count, but a
    /// permanent answer from the backend is still an answer: a probe that
    /// reached the server closes the circuit.
    pub fn record_permanent_failure(&self) {
        let mut state = self.state.lock();
        if matches!(&*state, State::HalfOpen { .. }) {
            debug!("Probe reached the backend (permanent error); circuit closed");
            *state = State::Closed { consecutive: 0, last_failure: None };
        }
    }

    /// Current state, for metrics and tests.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        match &*self.state.lock() {
            State::Closed { .. } => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }
}
