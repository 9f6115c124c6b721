use crate::{storage::LeaseStore, Error, Result, Token};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::sleep;

/// Round-trip delay injected in front of every store call
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencySimulator {
    pub round_trip: Duration,
}

impl LatencySimulator {
    pub fn new(round_trip: Duration) -> Self {
        Self { round_trip }
    }

    pub async fn simulate(&self) {
        if !self.round_trip.is_zero() {
            sleep(self.round_trip).await;
        }
    }
}

/// Wraps a store with network effects: latency, partitions, and a count of
/// the calls that actually reached the inner store.
#[derive(Debug)]
pub struct SimulatedStore<S> {
    inner: S,
    latency: LatencySimulator,
    partitioned: AtomicBool,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
}

impl<S: LeaseStore> SimulatedStore<S> {
    pub fn new(inner: S) -> Self {
        Self::with_latency(inner, LatencySimulator::default())
    }

    pub fn with_latency(inner: S, latency: LatencySimulator) -> Self {
        Self {
            inner,
            latency,
            partitioned: AtomicBool::new(false),
            acquire_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Cut this client off from the store until [`heal`](Self::heal).
    pub fn partition(&self) {
        self.partitioned.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.partitioned.store(false, Ordering::SeqCst);
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    async fn round_trip(&self) -> Result<()> {
        self.latency.simulate().await;
        if self.partitioned.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable("network partition".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl<S: LeaseStore> LeaseStore for SimulatedStore<S> {
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool> {
        self.round_trip().await?;
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.try_acquire(key, token, ttl).await
    }

    async fn try_release(&self, key: &str, token: &Token) -> Result<bool> {
        self.round_trip().await?;
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.try_release(key, token).await
    }
}

/// Wall-clock span of an operation, measured on the tokio clock
#[derive(Debug)]
pub struct LatencyMeasurement {
    pub operation: String,
    pub start_time: tokio::time::Instant,
    pub elapsed: Duration,
}

impl LatencyMeasurement {
    pub fn start(operation: &str) -> Self {
        Self {
            operation: operation.to_string(),
            start_time: tokio::time::Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn stop(&mut self) -> Duration {
        self.elapsed = self.start_time.elapsed();
        self.elapsed
    }

    pub fn assert_within(&self, min: Duration, max: Duration) {
        assert!(
            self.elapsed >= min && self.elapsed <= max,
            "{} took {:?}, expected between {:?} and {:?}",
            self.operation,
            self.elapsed,
            min,
            max
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryStore;

    #[tokio::test(start_paused = true)]
    async fn test_partition_blocks_calls() {
        let store = SimulatedStore::new(InMemoryStore::new());
        let token = Token::generate();

        store.partition();
        let err = store
            .try_acquire("k", &token, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(err.is_store_unavailable());
        assert_eq!(store.acquire_calls(), 0);

        store.heal();
        assert!(store.try_acquire("k", &token, Duration::from_secs(1)).await.unwrap());
        assert_eq!(store.acquire_calls(), 1);
        assert_eq!(store.inner().holder("k"), Some(token));
    }

    #[tokio::test(start_paused = true)]
    async fn test_latency_is_applied() {
        let store = SimulatedStore::with_latency(
            InMemoryStore::new(),
            LatencySimulator::new(Duration::from_millis(5)),
        );
        let mut measurement = LatencyMeasurement::start("try_acquire");
        store
            .try_acquire("k", &Token::generate(), Duration::from_secs(1))
            .await
            .unwrap();
        measurement.stop();
        measurement.assert_within(Duration::from_millis(5), Duration::from_millis(6));
    }
}
