use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tiercache_backend::{BackendError, BackendErrorKind};
use tiercache_guard::*;

fn transient() -> BackendError {
    BackendError::new(BackendErrorKind::Connection, "get", "ns:k", "connection refused")
}

fn permanent() -> BackendError {
    BackendError::new(BackendErrorKind::Auth, "get", "ns:k", "NOAUTH")
}

fn set(breaker_threshold: u32) -> ReliabilitySet {
    ReliabilitySet::new(ReliabilityConfig {
        breaker: Some(BreakerConfig {
            failure_threshold: breaker_threshold,
            recovery_timeout: Duration::from_secs(30),
            failure_window: Duration::from_secs(60),
        }),
        timeout: Some(TimeoutConfig {
            base: Duration::from_millis(100),
            multiplier: 2.0,
            max: Duration::from_secs(1),
        }),
        backpressure: Some(BackpressureConfig { max_concurrent: 4 }),
    })
}

#[tokio::test]
async fn test_success_passes_through() {
    let set = set(5);
    let value = set.call("ns", OpClass::Get, async { Ok::<_, BackendError>(41 + 1) }).await;
    assert_eq!(value.unwrap(), 42);
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Closed);
}

#[tokio::test]
async fn test_breaker_trips_then_short_circuits() {
    let set = set(5);

    for _ in 0..5 {
        let result = set.call("ns", OpClass::Get, async { Err::<(), _>(transient()) }).await;
        assert!(matches!(result, Err(GuardError::Backend(_))));
    }
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Open);

    // 6th call must not reach the backend.
    let reached = Arc::new(AtomicUsize::new(0));
    let observer = Arc::clone(&reached);
    let result = set
        .call("ns", OpClass::Get, async move {
            observer.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BackendError>(())
        })
        .await;
    assert!(matches!(result, Err(GuardError::CircuitOpen { .. })));
    assert_eq!(reached.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_breaker_recovers_through_probe() {
    let set = set(3);
    for _ in 0..3 {
        let _ = set.call("ns", OpClass::Get, async { Err::<(), _>(transient()) }).await;
    }
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Open);

    tokio::time::advance(Duration::from_secs(31)).await;

    // The probe succeeds and the circuit closes.
    let result = set.call("ns", OpClass::Get, async { Ok::<_, BackendError>(7) }).await;
    assert_eq!(result.unwrap(), 7);
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Closed);

    let result = set.call("ns", OpClass::Get, async { Ok::<_, BackendError>(8) }).await;
    assert_eq!(result.unwrap(), 8);
}

#[tokio::test]
async fn test_permanent_errors_do_not_trip() {
    let set = set(3);
    for _ in 0..10 {
        let result = set.call("ns", OpClass::Get, async { Err::<(), _>(permanent()) }).await;
        assert!(matches!(result, Err(GuardError::Backend(_))));
    }
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Closed);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_enforced_and_feeds_breaker() {
    let set = set(2);

    for _ in 0..2 {
        let result = set
            .call("ns", OpClass::Get, async {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok::<_, BackendError>(())
            })
            .await;
        assert!(matches!(result, Err(GuardError::Timeout { .. })));
    }
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Open);
}

#[tokio::test]
async fn test_backpressure_rejects_at_ceiling() {
    let set = Arc::new(set(5));
    let (unblock_tx, _) = tokio::sync::watch::channel(false);

    let mut slow_tasks = Vec::new();
    for _ in 0..4 {
        let set = Arc::clone(&set);
        let mut unblock = unblock_tx.subscribe();
        slow_tasks.push(tokio::spawn(async move {
            set.call("ns", OpClass::Set, async move {
                let _ = unblock.wait_for(|&go| go).await;
                Ok::<_, BackendError>(())
            })
            .await
        }));
    }
    // Give the four slow calls time to occupy every slot.
    tokio::time::sleep(Duration::from_millis(50)).await;

    let result = set.call("ns", OpClass::Set, async { Ok::<_, BackendError>(()) }).await;
    assert!(matches!(result, Err(GuardError::BackpressureRejected { .. })));

    unblock_tx.send(true).unwrap();
    for task in slow_tasks {
        assert!(task.await.unwrap().is_ok());
    }

    // Slots freed; calls flow again.
    assert!(set.call("ns", OpClass::Set, async { Ok::<_, BackendError>(()) }).await.is_ok());
}

#[tokio::test]
async fn test_namespaces_are_isolated() {
    let set = set(2);
    for _ in 0..2 {
        let _ = set.call("flaky", OpClass::Get, async { Err::<(), _>(transient()) }).await;
    }
    assert_eq!(set.breaker_state("flaky", OpClass::Get), CircuitState::Open);
    assert_eq!(set.breaker_state("healthy", OpClass::Get), CircuitState::Closed);

    let result = set.call("healthy", OpClass::Get, async { Ok::<_, BackendError>(()) }).await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_disabled_stages_pass_everything() {
    let set = ReliabilitySet::new(ReliabilityConfig::default());
    for _ in 0..50 {
        let _ = set.call("ns", OpClass::Get, async { Err::<(), _>(transient()) }).await;
    }
    // No breaker configured: still closed, still invoking.
    assert_eq!(set.breaker_state("ns", OpClass::Get), CircuitState::Closed);
    let result = set.call("ns", OpClass::Get, async { Ok::<_, BackendError>(1) }).await;
    assert_eq!(result.unwrap(), 1);
}
