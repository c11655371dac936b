//! The L1 store engine.

use crate::entry::{Entry, Freshness, L1Hit};
use crate::lru::LruList;
use fxhash::{FxHashMap, FxHashSet};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Default byte budget (100 MiB).
pub const DEFAULT_MAX_BYTES: usize = 100 * 1024 * 1024;

/// Eviction drains down to this fraction of the budget, so a single
/// overflowing put does not evict on every subsequent write.
const LOW_WATER_RATIO: f64 = 0.7;

/// Tuning for a [`MemoryStore`].
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Byte budget for live payloads.
    pub max_bytes: usize,
    /// Fraction of the TTL after which an entry turns stale (0.1..=1.0).
    pub swr_ratio: f64,
    /// Multiplicative jitter range applied to the freshness deadline;
    /// `None` disables jitter (tests, deterministic deployments).
    pub jitter: Option<(f64, f64)>,
    /// Maintain the namespace → keys index for O(|namespace|) invalidation.
    /// Disabling it trades invalidation speed for memory.
    pub namespace_index: bool,
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_BYTES,
            swr_ratio: 0.8,
            jitter: Some((0.9, 1.1)),
            namespace_index: true,
        }
    }
}

impl MemoryStoreConfig {
    fn normalize(mut self) -> Self {
        self.max_bytes = self.max_bytes.max(1);
        self.swr_ratio = self.swr_ratio.clamp(0.1, 1.0);
        if let Some((lo, hi)) = self.jitter {
            let lo = lo.clamp(0.5, 1.5);
            let hi = hi.clamp(lo, 1.5);
            self.jitter = Some((lo, hi));
        }
        self
    }
}

/// Point-in-time counters for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryStats {
    pub entries: usize,
    pub resident_bytes: usize,
    pub evictions: u64,
    pub expirations: u64,
}

#[derive(Debug)]
struct StoreInner {
    lru: LruList,
    slots: FxHashMap<String, usize>,
    by_namespace: Option<FxHashMap<String, FxHashSet<String>>>,
    /// Min-heap of hard expiries; reaped lazily on every write.
    expiries: BinaryHeap<Reverse<(Instant, String)>>,
    total_bytes: usize,
    next_version: u64,
    evictions: u64,
    expirations: u64,
    config: MemoryStoreConfig,
}

/// Per-process byte cache with TTL, LRU eviction, and SWR freshness state.
///
/// All operations serialize through one mutex and never touch I/O, so every
/// call completes in bounded time. Byte accounting is O(1) per entry;
/// eviction is O(k) in the number of victims.
///
/// The stored payloads are opaque envelopes: the store never sees decoded
/// values, and when encryption is enabled it holds ciphertext.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreInner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(MemoryStoreConfig::default())
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new(config: MemoryStoreConfig) -> Self {
        let config = config.normalize();
        let by_namespace = config.namespace_index.then(FxHashMap::default);
        Self {
            inner: Arc::new(Mutex::new(StoreInner {
                lru: LruList::new(),
                slots: FxHashMap::default(),
                by_namespace,
                expiries: BinaryHeap::new(),
                total_bytes: 0,
                next_version: 0,
                evictions: 0,
                expirations: 0,
                config,
            })),
        }
    }

    /// Reads an entry, treating anything past its hard expiry as absent.
    pub fn get(&self, key: &str) -> Option<L1Hit> {
        self.get_at(key, Instant::now())
    }

    /// Reads an entry at an explicit instant.
    ///
    /// An expired entry is removed on the spot and reported as a miss; the
    /// hit marks the entry most-recently used.
    pub fn get_at(&self, key: &str, now: Instant) -> Option<L1Hit> {
        let mut inner = self.inner.lock();
        let slot = *inner.slots.get(key)?;

        let (expired, hit) = {
            let entry = inner.lru.entry(slot)?;
            if now > entry.expires_at {
                (true, None)
            } else {
                let freshness = if now > entry.fresh_until {
                    Freshness::Stale
                } else {
                    Freshness::Fresh
                };
                (
                    false,
                    Some(L1Hit {
                        payload: entry.payload.clone(),
                        freshness,
                        version: entry.version,
                        ttl_remaining: entry.expires_at - now,
                    }),
                )
            }
        };

        if expired {
            inner.remove_key(key);
            inner.expirations += 1;
            trace!(key, "Expired entry removed on read");
            return None;
        }
        inner.lru.touch(slot);
        hit
    }

    /// Stores an envelope under `key`, evicting LRU victims as needed.
    ///
    /// Returns `false` when the payload alone exceeds the byte budget and
    /// cannot be admitted. Expired entries are reaped before the write
    /// completes.
    pub fn put(&self, key: &str, namespace: &str, payload: Vec<u8>, ttl: Duration) -> bool {
        self.put_at(key, namespace, payload, ttl, Instant::now())
    }

    /// [`MemoryStore::put`] at an explicit instant.
    pub fn put_at(
        &self,
        key: &str,
        namespace: &str,
        payload: Vec<u8>,
        ttl: Duration,
        now: Instant,
    ) -> bool {
        let mut inner = self.inner.lock();
        inner.reap_expired(now);

        if payload.len() > inner.config.max_bytes {
            warn!(
                key,
                size = payload.len(),
                budget = inner.config.max_bytes,
                "Payload exceeds the L1 byte budget; not admitted"
            );
            return false;
        }

        inner.remove_key(key);

        inner.next_version += 1;
        let version = inner.next_version;
        let entry = Entry::new(
            payload,
            namespace.to_owned(),
            now,
            ttl,
            inner.config.swr_ratio,
            inner.config.jitter,
            version,
        );

        inner.total_bytes += entry.size_bytes();
        inner.expiries.push(Reverse((entry.expires_at, key.to_owned())));
        let slot = inner.lru.push_front(key.to_owned(), entry);
        inner.slots.insert(key.to_owned(), slot);
        if let Some(index) = inner.by_namespace.as_mut() {
            index.entry(namespace.to_owned()).or_default().insert(key.to_owned());
        }

        inner.evict_to_budget();
        true
    }

    /// Admits exactly one refresher per (key, version).
    ///
    /// The compare-and-set succeeds only when the entry still exists, its
    /// version matches the one the caller observed, and no refresh is
    /// already running.
    pub fn mark_refreshing(&self, key: &str, version: u64) -> bool {
        let mut inner = self.inner.lock();
        let Some(&slot) = inner.slots.get(key) else { return false };
        let Some(entry) = inner.lru.entry_mut(slot) else { return false };
        if entry.refreshing || entry.version != version {
            return false;
        }
        entry.refreshing = true;
        true
    }

    /// Releases the refresh claim without writing (refresh failed or was
    /// skipped), so a later stale read can try again.
    pub fn clear_refreshing(&self, key: &str) {
        let mut inner = self.inner.lock();
        let Some(&slot) = inner.slots.get(key) else { return };
        if let Some(entry) = inner.lru.entry_mut(slot) {
            entry.refreshing = false;
        }
    }

    /// Completes a background refresh: replaces the payload if the entry's
    /// version still matches the one captured at [`Self::mark_refreshing`].
    ///
    /// The entry keeps its `expires_at`; only the freshness window restarts.
    /// Returns `false` (and discards the refresh result) when a concurrent
    /// write or invalidation got there first.
    pub fn refresh_payload(&self, key: &str, payload: Vec<u8>, expected_version: u64) -> bool {
        self.refresh_payload_at(key, payload, expected_version, Instant::now())
    }

    /// [`MemoryStore::refresh_payload`] at an explicit instant.
    pub fn refresh_payload_at(
        &self,
        key: &str,
        payload: Vec<u8>,
        expected_version: u64,
        now: Instant,
    ) -> bool {
        let mut inner = self.inner.lock();
        let Some(&slot) = inner.slots.get(key) else { return false };

        let Some(entry) = inner.lru.entry(slot) else { return false };
        if entry.version != expected_version {
            debug!(
                key,
                expected = expected_version,
                actual = entry.version,
                "Refresh result discarded: entry was rewritten"
            );
            return false;
        }

        if payload.len() > inner.config.max_bytes {
            // The refreshed payload outgrew the whole budget; drop the entry
            // rather than hold a stale one forever.
            inner.remove_key(key);
            return false;
        }

        inner.next_version += 1;
        let version = inner.next_version;
        let old_size;
        let new_size = payload.len();
        {
            let (swr_ratio, jitter) = (inner.config.swr_ratio, inner.config.jitter);
            let Some(entry) = inner.lru.entry_mut(slot) else { return false };
            old_size = entry.size_bytes();
            entry.refresh(payload, now, swr_ratio, jitter, version);
        }
        inner.total_bytes = inner.total_bytes - old_size + new_size;
        inner.evict_to_budget();
        true
    }

    /// Drops one entry. Returns whether it existed.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let existed = inner.remove_key(key);
        if existed {
            trace!(key, "Entry invalidated");
        }
        existed
    }

    /// Drops every entry in a namespace; returns the count removed.
    ///
    /// O(|namespace|) with the index enabled, O(|cache|) without.
    pub fn invalidate_namespace(&self, namespace: &str) -> usize {
        let mut inner = self.inner.lock();
        let keys: Vec<String> = if let Some(index) = inner.by_namespace.as_ref() {
            index.get(namespace).map(|keys| keys.iter().cloned().collect()).unwrap_or_default()
        } else {
            inner
                .slots
                .iter()
                .filter(|&(_, &slot)| {
                    inner.lru.entry(slot).is_some_and(|entry| entry.namespace == namespace)
                })
                .map(|(key, _)| key.clone())
                .collect()
        };

        let mut removed = 0;
        for key in keys {
            if inner.remove_key(&key) {
                removed += 1;
            }
        }
        debug!(namespace, removed, "Namespace invalidated");
        removed
    }

    /// Drops everything; returns the count removed.
    pub fn invalidate_all(&self) -> usize {
        let mut inner = self.inner.lock();
        let removed = inner.slots.len();
        inner.lru.clear();
        inner.slots.clear();
        if let Some(index) = inner.by_namespace.as_mut() {
            index.clear();
        }
        inner.expiries.clear();
        inner.total_bytes = 0;
        debug!(removed, "L1 cleared");
        removed
    }

    /// Live-entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current counters snapshot.
    #[must_use]
    pub fn stats(&self) -> MemoryStats {
        let inner = self.inner.lock();
        MemoryStats {
            entries: inner.slots.len(),
            resident_bytes: inner.total_bytes,
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

impl StoreInner {
    /// Removes a key from every structure. Returns whether it existed.
    fn remove_key(&mut self, key: &str) -> bool {
        let Some(slot) = self.slots.remove(key) else { return false };
        if let Some((_, entry)) = self.lru.remove(slot) {
            self.total_bytes -= entry.size_bytes();
            if let Some(index) = self.by_namespace.as_mut()
                && let Some(keys) = index.get_mut(&entry.namespace)
            {
                keys.remove(key);
                if keys.is_empty() {
                    index.remove(&entry.namespace);
                }
            }
        }
        true
    }

    /// Pops every heap record whose deadline passed and removes entries
    /// that are genuinely expired (re-puts push fresh records, so a record
    /// may be stale for a still-live entry).
    fn reap_expired(&mut self, now: Instant) {
        while let Some(Reverse((at, _))) = self.expiries.peek() {
            if *at > now {
                break;
            }
            let Some(Reverse((_, key))) = self.expiries.pop() else { break };
            let expired = self
                .slots
                .get(&key)
                .and_then(|&slot| self.lru.entry(slot))
                .is_some_and(|entry| now > entry.expires_at);
            if expired {
                self.remove_key(&key);
                self.expirations += 1;
                trace!(key, "Expired entry reaped");
            }
        }
    }

    /// Evicts LRU victims until resident bytes drop to the low-water mark.
    fn evict_to_budget(&mut self) {
        if self.total_bytes <= self.config.max_bytes {
            return;
        }
        let low_water = (self.config.max_bytes as f64 * LOW_WATER_RATIO) as usize;
        while self.total_bytes > low_water {
            let Some(tail) = self.lru.tail() else { break };
            let Some(key) = self.lru.key(tail).map(str::to_owned) else { break };
            self.remove_key(&key);
            self.evictions += 1;
            trace!(key, "LRU victim evicted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(max_bytes: usize) -> MemoryStore {
        MemoryStore::new(MemoryStoreConfig {
            max_bytes,
            swr_ratio: 0.5,
            jitter: None,
            namespace_index: true,
        })
    }

    #[test]
    fn test_put_get_roundtrip() {
        let store = store(1024);
        assert!(store.put("k", "ns", vec![1, 2, 3], Duration::from_secs(60)));

        let hit = store.get("k").expect("hit");
        assert_eq!(hit.payload, vec![1, 2, 3]);
        assert_eq!(hit.freshness, Freshness::Fresh);
    }

    #[test]
    fn test_expired_entry_is_miss_and_removed() {
        let store = store(1024);
        let now = Instant::now();
        store.put_at("k", "ns", vec![1], Duration::from_secs(10), now);

        assert!(store.get_at("k", now + Duration::from_secs(11)).is_none());
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_stale_window() {
        let store = store(1024);
        let now = Instant::now();
        store.put_at("k", "ns", vec![1], Duration::from_secs(60), now);

        let fresh = store.get_at("k", now + Duration::from_secs(29)).unwrap();
        assert_eq!(fresh.freshness, Freshness::Fresh);

        let stale = store.get_at("k", now + Duration::from_secs(31)).unwrap();
        assert_eq!(stale.freshness, Freshness::Stale);
    }

    #[test]
    fn test_capacity_bound_holds() {
        let store = store(100);
        for i in 0..50 {
            store.put(&format!("k{i}"), "ns", vec![0u8; 10], Duration::from_secs(60));
            assert!(store.stats().resident_bytes <= 100);
        }
    }

    #[test]
    fn test_lru_victim_is_oldest_access() {
        let store = store(30);
        let now = Instant::now();
        store.put_at("a", "ns", vec![0u8; 10], Duration::from_secs(60), now);
        store.put_at("b", "ns", vec![0u8; 10], Duration::from_secs(60), now);
        store.put_at("c", "ns", vec![0u8; 10], Duration::from_secs(60), now);

        // Touch "a" so "b" is the LRU victim.
        store.get_at("a", now);
        store.put_at("d", "ns", vec![0u8; 10], Duration::from_secs(60), now);

        assert!(store.get_at("b", now).is_none(), "LRU victim must be the oldest access");
        assert!(store.get_at("a", now).is_some());
    }

    #[test]
    fn test_eviction_drains_to_low_water() {
        let store = store(100);
        for i in 0..10 {
            store.put(&format!("k{i}"), "ns", vec![0u8; 10], Duration::from_secs(60));
        }
        // One more put overflows; eviction settles at ≤ 70 bytes.
        store.put("k10", "ns", vec![0u8; 10], Duration::from_secs(60));
        assert!(store.stats().resident_bytes <= 70);
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let store = store(16);
        assert!(!store.put("k", "ns", vec![0u8; 17], Duration::from_secs(60)));
        assert_eq!(store.len(), 0);
    }

    #[test]
    fn test_namespace_invalidation_with_and_without_index() {
        for indexed in [true, false] {
            let store = MemoryStore::new(MemoryStoreConfig {
                max_bytes: 1024,
                swr_ratio: 0.5,
                jitter: None,
                namespace_index: indexed,
            });
            store.put("a1", "alpha", vec![1], Duration::from_secs(60));
            store.put("a2", "alpha", vec![2], Duration::from_secs(60));
            store.put("b1", "beta", vec![3], Duration::from_secs(60));

            assert_eq!(store.invalidate_namespace("alpha"), 2);
            assert!(store.get("a1").is_none());
            assert!(store.get("b1").is_some());
        }
    }

    #[test]
    fn test_mark_refreshing_admits_exactly_one() {
        let store = store(1024);
        store.put("k", "ns", vec![1], Duration::from_secs(60));
        let version = store.get("k").unwrap().version;

        assert!(store.mark_refreshing("k", version));
        assert!(!store.mark_refreshing("k", version), "second claim must lose");

        store.clear_refreshing("k");
        assert!(store.mark_refreshing("k", version), "claim reopens after clear");
    }

    #[test]
    fn test_refresh_discarded_after_concurrent_write() {
        let store = store(1024);
        store.put("k", "ns", vec![1], Duration::from_secs(60));
        let version = store.get("k").unwrap().version;
        assert!(store.mark_refreshing("k", version));

        // A concurrent writer replaces the entry before the refresh lands.
        store.put("k", "ns", vec![9], Duration::from_secs(60));
        assert!(!store.refresh_payload("k", vec![2], version));
        assert_eq!(store.get("k").unwrap().payload, vec![9]);
    }

    #[test]
    fn test_refresh_keeps_expiry_and_updates_content() {
        let store = store(1024);
        let now = Instant::now();
        store.put_at("k", "ns", vec![1], Duration::from_secs(60), now);
        let version = store.get_at("k", now).unwrap().version;
        assert!(store.mark_refreshing("k", version));

        let at = now + Duration::from_secs(45);
        assert!(store.refresh_payload_at("k", vec![2], version, at));

        // New content, same hard expiry: present at 59s, gone at 61s.
        let hit = store.get_at("k", now + Duration::from_secs(59)).unwrap();
        assert_eq!(hit.payload, vec![2]);
        assert!(store.get_at("k", now + Duration::from_secs(61)).is_none());
    }

    #[test]
    fn test_expired_entries_reaped_on_write() {
        let store = store(1024);
        let now = Instant::now();
        store.put_at("old", "ns", vec![1], Duration::from_secs(5), now);
        store.put_at("new", "ns", vec![2], Duration::from_secs(60), now + Duration::from_secs(6));

        assert_eq!(store.len(), 1, "expired entry must be gone before the write completes");
    }

    #[test]
    fn test_version_increases_on_rewrite() {
        let store = store(1024);
        store.put("k", "ns", vec![1], Duration::from_secs(60));
        let first = store.get("k").unwrap().version;
        store.put("k", "ns", vec![2], Duration::from_secs(60));
        let second = store.get("k").unwrap().version;
        assert!(second > first);
    }
}
