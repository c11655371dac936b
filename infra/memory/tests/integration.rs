use std::time::{Duration, Instant};
use tiercache_memory::*;

fn store() -> MemoryStore {
    MemoryStore::new(MemoryStoreConfig {
        max_bytes: 1000,
        swr_ratio: 0.5,
        jitter: None,
        namespace_index: true,
    })
}

#[test]
fn test_capacity_invariant_under_churn() {
    let store = MemoryStore::new(MemoryStoreConfig {
        max_bytes: 4096,
        ..MemoryStoreConfig::default()
    });

    for round in 0..20 {
        for i in 0..64 {
            let size = (i * 7 + round * 13) % 200 + 1;
            store.put(&format!("ns{}:k{i}", round % 3), "ns", vec![0u8; size], Duration::from_secs(60));
            assert!(store.stats().resident_bytes <= 4096, "budget exceeded mid-churn");
        }
    }
}

#[test]
fn test_concurrent_readers_and_writers() {
    let store = MemoryStore::new(MemoryStoreConfig {
        max_bytes: 64 * 1024,
        ..MemoryStoreConfig::default()
    });

    let handles: Vec<_> = (0..8)
        .map(|worker| {
            let store = store.clone();
            std::thread::spawn(move || {
                for i in 0..500 {
                    let key = format!("k{}", i % 32);
                    if worker % 2 == 0 {
                        store.put(&key, "ns", vec![worker as u8; 64], Duration::from_secs(60));
                    } else {
                        let _ = store.get(&key);
                    }
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(store.stats().resident_bytes <= 64 * 1024);
}

#[test]
fn test_swr_single_refresher_across_threads() {
    let store = store();
    store.put("k", "ns", vec![1], Duration::from_secs(60));
    let version = store.get("k").unwrap().version;

    let winners: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|_| {
                let store = store.clone();
                scope.spawn(move || usize::from(store.mark_refreshing("k", version)))
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).sum()
    });

    assert_eq!(winners, 1, "exactly one thread may claim the refresh");
}

#[test]
fn test_invalidate_then_get_is_miss() {
    let store = store();
    store.put("k", "ns", vec![1], Duration::from_secs(60));
    assert!(store.invalidate("k"));
    assert!(store.get("k").is_none());
    assert!(!store.invalidate("k"), "second invalidation is a no-op");
}

#[test]
fn test_refresher_with_stale_version_is_discarded_after_invalidate() {
    let store = store();
    store.put("k", "ns", vec![1], Duration::from_secs(60));
    let version = store.get("k").unwrap().version;
    assert!(store.mark_refreshing("k", version));

    store.invalidate("k");
    assert!(!store.refresh_payload("k", vec![2], version));
    assert!(store.get("k").is_none(), "discarded refresh must not resurrect the entry");
}

#[test]
fn test_ttl_boundary_is_inclusive() {
    let store = store();
    let now = Instant::now();
    store.put_at("k", "ns", vec![1], Duration::from_secs(10), now);

    // Exactly at expiry the entry is still visible; past it, gone.
    assert!(store.get_at("k", now + Duration::from_secs(10)).is_some());
    assert!(store.get_at("k", now + Duration::from_secs(10) + Duration::from_millis(1)).is_none());
}

#[test]
fn test_invalidate_all() {
    let store = store();
    for i in 0..10 {
        store.put(&format!("k{i}"), "ns", vec![1], Duration::from_secs(60));
    }
    assert_eq!(store.invalidate_all(), 10);
    assert!(store.is_empty());
    assert_eq!(store.stats().resident_bytes, 0);
}
