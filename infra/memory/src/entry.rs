//! L1 entry state.

use std::time::{Duration, Instant};

/// Whether a hit is inside its freshness window or being served stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    /// Past `fresh_until` but before `expires_at`: servable, refresh due.
    Stale,
}

/// A successful L1 read.
#[derive(Debug, Clone)]
pub struct L1Hit {
    /// The stored envelope bytes, always exactly what the L2 holds.
    pub payload: Vec<u8>,
    pub freshness: Freshness,
    /// Entry version at read time; background refreshers use it to detect
    /// concurrent writes.
    pub version: u64,
    /// Time left until the hard expiry, as of the read. Background
    /// refreshes re-write the L2 with this bound so a refresh never
    /// extends lifetime.
    pub ttl_remaining: Duration,
}

#[derive(Debug)]
pub(crate) struct Entry {
    pub(crate) payload: Vec<u8>,
    pub(crate) namespace: String,
    pub(crate) ttl: Duration,
    pub(crate) expires_at: Instant,
    pub(crate) fresh_until: Instant,
    pub(crate) refreshing: bool,
    pub(crate) version: u64,
}

impl Entry {
    pub(crate) fn new(
        payload: Vec<u8>,
        namespace: String,
        now: Instant,
        ttl: Duration,
        swr_ratio: f64,
        jitter: Option<(f64, f64)>,
        version: u64,
    ) -> Self {
        let expires_at = now + ttl;
        let fresh_until = fresh_deadline(now, ttl, swr_ratio, jitter).min(expires_at);
        Self { payload, namespace, ttl, expires_at, fresh_until, refreshing: false, version }
    }

    pub(crate) fn size_bytes(&self) -> usize {
        self.payload.len()
    }

    /// Replaces the payload in place after a background refresh.
    ///
    /// `expires_at` is deliberately untouched: a refresh renews content,
    /// never lifetime. The freshness window restarts from `now`, capped at
    /// the original expiry.
    pub(crate) fn refresh(
        &mut self,
        payload: Vec<u8>,
        now: Instant,
        swr_ratio: f64,
        jitter: Option<(f64, f64)>,
        version: u64,
    ) {
        self.payload = payload;
        self.fresh_until = fresh_deadline(now, self.ttl, swr_ratio, jitter).min(self.expires_at);
        self.refreshing = false;
        self.version = version;
    }
}

fn fresh_deadline(
    now: Instant,
    ttl: Duration,
    swr_ratio: f64,
    jitter: Option<(f64, f64)>,
) -> Instant {
    let factor = jitter.map_or(1.0, |(lo, hi)| sample_uniform(lo, hi));
    now + ttl.mul_f64((swr_ratio * factor).clamp(0.0, 1.0))
}

/// Uniform sample in `[lo, hi)` from the system RNG.
///
/// Falls back to the midpoint if the RNG is unavailable; jitter is a
/// thundering-herd hedge, not a security boundary.
fn sample_uniform(lo: f64, hi: f64) -> f64 {
    let mut bytes = [0u8; 8];
    if getrandom::fill(&mut bytes).is_err() {
        return f64::midpoint(lo, hi);
    }
    let unit = (u64::from_le_bytes(bytes) >> 11) as f64 / (1u64 << 53) as f64;
    lo + (hi - lo) * unit
}
