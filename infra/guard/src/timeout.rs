//! Adaptive timeout from observed latencies.

use parking_lot::Mutex;
use std::time::Duration;

/// Number of latency samples the rolling window retains.
const WINDOW_CAPACITY: usize = 1000;

/// How often (in samples) the effective timeout is recomputed.
const RECOMPUTE_EVERY: usize = 100;

/// Percentile the timeout tracks.
const PERCENTILE: f64 = 0.99;

/// Adaptive timeout tuning.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Seed and floor: used until the window has data, and as the minimum
    /// effective timeout afterwards.
    pub base: Duration,
    /// Headroom multiplier over the observed p99.
    pub multiplier: f64,
    /// Hard ceiling on the effective timeout.
    pub max: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self { base: Duration::from_millis(200), multiplier: 2.0, max: Duration::from_secs(5) }
    }
}

#[derive(Debug)]
struct Window {
    samples: Vec<Duration>,
    cursor: usize,
    since_recompute: usize,
}

/// Per-operation-class rolling latency window.
///
/// Effective timeout = `clamp(p99(window) × multiplier, base, max)`,
/// re-evaluated every [`RECOMPUTE_EVERY`] samples. Only successful calls
/// feed the window; timeouts and failures would otherwise drag the
/// estimate toward the very ceiling that caused them.
#[derive(Debug)]
pub struct AdaptiveTimeout {
    config: TimeoutConfig,
    window: Mutex<Window>,
    effective: Mutex<Duration>,
}

impl AdaptiveTimeout {
    #[must_use]
    pub fn new(config: TimeoutConfig) -> Self {
        let seed = seed_timeout(&config);
        Self {
            config,
            window: Mutex::new(Window {
                samples: Vec::with_capacity(WINDOW_CAPACITY),
                cursor: 0,
                since_recompute: 0,
            }),
            effective: Mutex::new(seed),
        }
    }

    /// The timeout to enforce on the next call.
    #[must_use]
    pub fn effective(&self) -> Duration {
        *self.effective.lock()
    }

    /// Feeds one observed success latency.
    pub fn record(&self, latency: Duration) {
        let recompute = {
            let mut window = self.window.lock();
            if window.samples.len() < WINDOW_CAPACITY {
                window.samples.push(latency);
            } else {
                let cursor = window.cursor;
                window.samples[cursor] = latency;
                window.cursor = (cursor + 1) % WINDOW_CAPACITY;
            }
            window.since_recompute += 1;
            if window.since_recompute >= RECOMPUTE_EVERY {
                window.since_recompute = 0;
                let mut sorted = window.samples.clone();
                sorted.sort_unstable();
                Some(percentile(&sorted, PERCENTILE))
            } else {
                None
            }
        };

        if let Some(p99) = recompute {
            let scaled = p99.mul_f64(self.config.multiplier.max(1.0));
            *self.effective.lock() = scaled.clamp(self.config.base, self.config.max);
        }
    }
}

fn seed_timeout(config: &TimeoutConfig) -> Duration {
    config.base.mul_f64(config.multiplier.max(1.0)).clamp(config.base, config.max)
}

/// Nearest-rank percentile over sorted samples.
fn percentile(sorted: &[Duration], q: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let rank = ((sorted.len() as f64) * q).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}
