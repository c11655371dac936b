//! In-process L1 cache tier.
//!
//! A bytes-bounded map of opaque envelopes with TTL, O(1) LRU eviction, and
//! stale-while-revalidate freshness state. The store is the fast tier of
//! the cache hierarchy: everything it holds is exactly what the L2 holds
//! (encrypted or not), never a decoded value.
//!
//! # Core Features
//!
//! - **Byte budget**: the sum of live payload sizes never exceeds the
//!   configured bound; overflow evicts LRU victims down to a 70% low-water
//!   mark.
//! - **Two deadlines per entry**: `fresh_until` (jittered) marks the start
//!   of the stale-but-servable window, `expires_at` is the hard cutoff
//!   after which the entry reads as absent and is reaped before the next
//!   write completes.
//! - **Refresh coordination**: `mark_refreshing` is a compare-and-set that
//!   admits exactly one background refresher per entry version, and
//!   `refresh_payload` discards results that lost a race with a newer
//!   write.
//! - **Namespace invalidation**: O(|namespace|) through an optional
//!   secondary index.
//!
//! Operations never block on I/O; everything runs under one process-local
//! mutex in bounded time.

mod entry;
mod lru;
mod store;

pub use entry::{Freshness, L1Hit};
pub use store::{DEFAULT_MAX_BYTES, MemoryStats, MemoryStore, MemoryStoreConfig};
