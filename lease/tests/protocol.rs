// Acquire/release protocol properties against the in-memory store

use lease::{
    test_utils::{LatencyMeasurement, LatencySimulator, SimulatedStore},
    Error, InMemoryStore, LeaseState, LeaseStore, LockManager, LockOptions, ReleaseOutcome,
};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

type Simulated = SimulatedStore<InMemoryStore>;

fn simulated(round_trip: Duration) -> Arc<Simulated> {
    Arc::new(SimulatedStore::with_latency(
        InMemoryStore::new(),
        LatencySimulator::new(round_trip),
    ))
}

fn manager(store: &Arc<Simulated>, options: LockOptions) -> LockManager {
    let store: Arc<dyn LeaseStore> = store.clone();
    LockManager::new(store, options).unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_mutual_exclusion_under_contention() {
    let store = simulated(Duration::from_millis(2));
    let options = LockOptions::for_ttl(Duration::from_secs(5));
    let counter = Arc::new(AtomicU64::new(0));
    let inside = Arc::new(AtomicUsize::new(0));
    let max_inside = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let locks = manager(&store, options);
        let counter = counter.clone();
        let inside = inside.clone();
        let max_inside = max_inside.clone();
        tasks.push(tokio::spawn(async move {
            locks
                .run_exclusive("shared-counter", async {
                    let now_inside = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now_inside, Ordering::SeqCst);

                    // Deliberately racy read-modify-write: only the lease
                    // keeps updates from being lost.
                    let seen = counter.load(Ordering::SeqCst);
                    sleep(Duration::from_millis(50)).await;
                    counter.store(seen + 1, Ordering::SeqCst);

                    inside.fetch_sub(1, Ordering::SeqCst);
                })
                .await
        }));
    }

    for task in tasks {
        let ((), released) = task.await.unwrap().unwrap();
        assert_eq!(released.unwrap(), ReleaseOutcome::Released);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 8);
    assert_eq!(max_inside.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn test_crashed_holder_lease_expires() {
    let store = simulated(Duration::ZERO);
    let ttl = Duration::from_secs(1);
    let options = LockOptions::for_ttl(ttl);
    let locks = manager(&store, options);

    // The holder never releases, as if its process died.
    let crashed = locks.acquire("resource").await.unwrap();
    assert!(crashed.is_acquired());

    let mut measurement = LatencyMeasurement::start("acquire after crash");
    let successor = locks.acquire("resource").await.unwrap();
    measurement.stop();

    measurement.assert_within(ttl, ttl + options.poll_interval);
    assert_eq!(store.inner().holder("resource"), Some(*successor.token()));
}

#[tokio::test(start_paused = true)]
async fn test_release_is_idempotent() {
    let store = simulated(Duration::ZERO);
    let locks = manager(&store, LockOptions::for_ttl(Duration::from_secs(5)));

    let mut handle = locks.acquire("resource").await.unwrap();
    assert_eq!(locks.release(&mut handle).await.unwrap(), ReleaseOutcome::Released);
    assert_eq!(store.release_calls(), 1);

    assert_eq!(locks.release(&mut handle).await.unwrap(), ReleaseOutcome::NoOp);
    assert_eq!(store.release_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_waiter_leaves_holder_intact() {
    let store = simulated(Duration::ZERO);
    let options = LockOptions::for_ttl(Duration::from_secs(60)).with_max_wait(Duration::from_millis(500));
    let locks = manager(&store, options);
    let mut holder = locks.acquire("resource").await.unwrap();

    let err = locks.acquire("resource").await.unwrap_err();
    assert!(matches!(err, Error::AcquisitionTimeout { ref key, .. } if key == "resource"));
    assert_eq!(store.release_calls(), 0);
    assert_eq!(store.inner().holder("resource"), Some(*holder.token()));

    assert_eq!(locks.release(&mut holder).await.unwrap(), ReleaseOutcome::Released);
    assert_eq!(holder.state(), LeaseState::Released);
}

#[tokio::test(start_paused = true)]
async fn test_timeout_bound() {
    let store = simulated(Duration::ZERO);
    let forever = LockOptions::for_ttl(Duration::from_secs(3_600));
    let locks = manager(&store, forever);
    let _holder = locks.acquire("resource").await.unwrap();

    let options = LockOptions::for_ttl(Duration::from_secs(5))
        .with_max_wait(Duration::from_secs(1))
        .with_poll_interval(Duration::from_millis(100));

    let mut measurement = LatencyMeasurement::start("acquire held key");
    let err = locks.acquire_with("resource", options).await.unwrap_err();
    measurement.stop();

    match err {
        Error::AcquisitionTimeout { waited, .. } => assert!(waited >= options.max_wait),
        other => panic!("expected AcquisitionTimeout, got {other:?}"),
    }
    measurement.assert_within(options.max_wait, options.max_wait + options.poll_interval);
    // The holder's call, then the waiter's attempts at t=0, 100ms, ..., 1s.
    assert_eq!(store.acquire_calls(), 1 + 11);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_acquire_leaves_no_lease() {
    let store = simulated(Duration::ZERO);
    let locks = manager(&store, LockOptions::for_ttl(Duration::from_secs(5)));
    let mut holder = locks.acquire("resource").await.unwrap();

    let mut measurement = LatencyMeasurement::start("cancelled acquire");
    let err = locks
        .acquire_until("resource", locks.defaults(), sleep(Duration::from_millis(300)))
        .await
        .unwrap_err();
    measurement.stop();

    assert!(matches!(err, Error::Cancelled { .. }));
    measurement.assert_within(Duration::from_millis(300), Duration::from_millis(300));
    assert_eq!(store.inner().holder("resource"), Some(*holder.token()));

    locks.release(&mut holder).await.unwrap();
    assert_eq!(store.inner().holder("resource"), None);
}

#[tokio::test(start_paused = true)]
async fn test_store_outage_is_not_a_timeout() {
    let store = simulated(Duration::from_millis(1));
    let locks = manager(&store, LockOptions::for_ttl(Duration::from_secs(5)));
    let _holder = locks.acquire("resource").await.unwrap();

    let partitioner = {
        let store = store.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(250)).await;
            store.partition();
        })
    };

    let err = locks.acquire("resource").await.unwrap_err();
    partitioner.await.unwrap();
    assert!(err.is_store_unavailable(), "unexpected error: {err:?}");
    assert!(!err.is_busy());
}

#[tokio::test(start_paused = true)]
async fn test_waiters_all_eventually_acquire() {
    let store = simulated(Duration::from_millis(1));
    let options = LockOptions::for_ttl(Duration::from_secs(1));
    let acquired = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let locks = manager(&store, options);
        let acquired = acquired.clone();
        tasks.push(tokio::spawn(async move {
            let mut handle = locks.acquire("resource").await?;
            acquired.fetch_add(1, Ordering::SeqCst);
            sleep(Duration::from_millis(200)).await;
            locks.release(&mut handle).await
        }));
    }

    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), ReleaseOutcome::Released);
    }
    assert_eq!(acquired.load(Ordering::SeqCst), 4);
}
