// Lock manager - bounded polling acquisition and token-checked release

use crate::{
    config::{LockConfig, LockOptions},
    guard::LeaseGuard,
    handle::{LockHandle, ReleaseOutcome},
    storage::LeaseStore,
    Error, Result,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Acquires and releases leases against one explicitly supplied store.
///
/// Cloning is cheap and clones share the store connection. Nothing is cached
/// between calls: every acquire and release goes to the store.
#[derive(Debug, Clone)]
pub struct LockManager {
    store: Arc<dyn LeaseStore>,
    defaults: LockOptions,
}

impl LockManager {
    /// Create a manager whose plain `acquire`/`lock` calls use `defaults`.
    pub fn new(store: Arc<dyn LeaseStore>, defaults: LockOptions) -> Result<Self> {
        defaults.validate()?;
        Ok(Self { store, defaults })
    }

    pub fn from_config(store: Arc<dyn LeaseStore>, config: &LockConfig) -> Result<Self> {
        Self::new(store, config.options()?)
    }

    pub fn defaults(&self) -> LockOptions {
        self.defaults
    }

    pub fn store(&self) -> &Arc<dyn LeaseStore> {
        &self.store
    }

    /// Acquire `key` with the manager's default timing.
    pub async fn acquire(&self, key: &str) -> Result<LockHandle> {
        self.acquire_with(key, self.defaults).await
    }

    /// Acquire `key`, polling until success or until `options.max_wait` has
    /// elapsed.
    pub async fn acquire_with(&self, key: &str, options: LockOptions) -> Result<LockHandle> {
        self.acquire_until(key, options, std::future::pending::<()>())
            .await
    }

    /// Like [`acquire_with`](Self::acquire_with), but gives up with
    /// `Error::Cancelled` as soon as `cancel` resolves while waiting between
    /// attempts. An abandoned attempt never leaves a lease behind.
    pub async fn acquire_until<F>(
        &self,
        key: &str,
        options: LockOptions,
        cancel: F,
    ) -> Result<LockHandle>
    where
        F: Future<Output = ()>,
    {
        options.validate()?;
        tokio::pin!(cancel);

        let mut handle = LockHandle::new(key, options.ttl);
        let started = Instant::now();
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;
            // A stalled round trip may not push the caller past its deadline.
            let budget = options
                .max_wait
                .saturating_sub(started.elapsed())
                .max(options.poll_interval);
            let attempt = timeout(
                budget,
                self.store.try_acquire(key, handle.token(), options.ttl),
            )
            .await
            .unwrap_or_else(|_| {
                Err(Error::StoreUnavailable(format!(
                    "no reply from lease store within {budget:?}"
                )))
            });
            let acquired = attempt.inspect_err(|err| {
                warn!(key, attempts, error = %err, "lease store call failed during acquire");
            })?;

            if acquired {
                handle.mark_acquired();
                info!(
                    key,
                    token = %handle.token(),
                    attempts,
                    waited_ms = millis(started.elapsed()),
                    "lease acquired"
                );
                return Ok(handle);
            }

            let waited = started.elapsed();
            if waited >= options.max_wait {
                handle.mark_timed_out();
                warn!(
                    key,
                    attempts,
                    waited_ms = millis(waited),
                    "gave up waiting for lease"
                );
                return Err(Error::AcquisitionTimeout {
                    key: key.to_string(),
                    waited,
                });
            }

            tokio::select! {
                biased;
                () = &mut cancel => {
                    debug!(key, attempts, "lease acquisition cancelled");
                    return Err(Error::Cancelled { key: key.to_string() });
                }
                () = sleep(options.poll_interval) => {}
            }
        }
    }

    /// Give the lease back if this handle still owns it.
    ///
    /// Safe to call on a handle that timed out or was already released; those
    /// return `NoOp` without touching the store. The handle is terminal
    /// afterwards even if the store call fails.
    pub async fn release(&self, handle: &mut LockHandle) -> Result<ReleaseOutcome> {
        release_handle(self.store.as_ref(), handle).await
    }

    /// Scoped acquisition with the default timing.
    pub async fn lock(&self, key: &str) -> Result<LeaseGuard> {
        self.lock_with(key, self.defaults).await
    }

    pub async fn lock_with(&self, key: &str, options: LockOptions) -> Result<LeaseGuard> {
        let handle = self.acquire_with(key, options).await?;
        Ok(LeaseGuard::new(Arc::clone(&self.store), handle))
    }

    /// Run `critical_section` while holding `key`.
    ///
    /// The outer error means the section never ran. Once it has run, its
    /// value is always returned next to the release result, which carries
    /// any store failure during release. The lease is released however the
    /// section ends: on return here, or from the guard's drop if the section
    /// panics or this future is dropped.
    pub async fn run_exclusive<F, T>(
        &self,
        key: &str,
        critical_section: F,
    ) -> Result<(T, Result<ReleaseOutcome>)>
    where
        F: Future<Output = T>,
    {
        self.run_exclusive_with(key, self.defaults, critical_section)
            .await
    }

    pub async fn run_exclusive_with<F, T>(
        &self,
        key: &str,
        options: LockOptions,
        critical_section: F,
    ) -> Result<(T, Result<ReleaseOutcome>)>
    where
        F: Future<Output = T>,
    {
        let guard = self.lock_with(key, options).await?;
        let value = critical_section.await;
        let released = guard.release().await;
        Ok((value, released))
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) async fn release_handle(
    store: &dyn LeaseStore,
    handle: &mut LockHandle,
) -> Result<ReleaseOutcome> {
    if !handle.is_acquired() {
        debug!(key = handle.key(), state = ?handle.state(), "release skipped, lease not held");
        return Ok(ReleaseOutcome::NoOp);
    }

    let held_ms = handle
        .acquired_at()
        .map(|at| millis(at.elapsed()))
        .unwrap_or_default();
    let deleted = store.try_release(handle.key(), handle.token()).await;
    handle.mark_released();

    match deleted {
        Ok(true) => {
            info!(key = handle.key(), token = %handle.token(), held_ms, "lease released");
            Ok(ReleaseOutcome::Released)
        }
        Ok(false) => {
            warn!(
                key = handle.key(),
                token = %handle.token(),
                held_ms,
                ttl_ms = millis(handle.ttl()),
                "lease was already gone at release; exclusivity may have been lost"
            );
            Ok(ReleaseOutcome::AlreadyGone)
        }
        Err(err) => {
            warn!(key = handle.key(), error = %err, "lease store call failed during release");
            Err(err)
        }
    }
}
