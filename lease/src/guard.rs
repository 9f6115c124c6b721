use crate::{
    handle::{LockHandle, ReleaseOutcome},
    manager::release_handle,
    storage::LeaseStore,
    Result,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// A held lease that is given back on every exit path.
///
/// Prefer [`LeaseGuard::release`], which reports what the store saw. If the
/// guard is dropped while still holding the lease (early return, panic,
/// cancelled future) the release is spawned onto the current tokio runtime
/// and its outcome only logged. Without a runtime the lease is left to expire.
#[derive(Debug)]
pub struct LeaseGuard {
    store: Arc<dyn LeaseStore>,
    handle: LockHandle,
}

impl LeaseGuard {
    pub(crate) fn new(store: Arc<dyn LeaseStore>, handle: LockHandle) -> Self {
        Self { store, handle }
    }

    pub fn handle(&self) -> &LockHandle {
        &self.handle
    }

    pub fn key(&self) -> &str {
        self.handle.key()
    }

    pub async fn release(mut self) -> Result<ReleaseOutcome> {
        release_handle(self.store.as_ref(), &mut self.handle).await
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        if !self.handle.is_acquired() {
            return;
        }

        let mut handle = self.handle.detach();
        let store = Arc::clone(&self.store);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                debug!(key = handle.key(), "lease guard dropped while held, releasing");
                runtime.spawn(async move {
                    if let Err(err) = release_handle(store.as_ref(), &mut handle).await {
                        warn!(key = handle.key(), error = %err, "release from dropped guard failed");
                    }
                });
            }
            Err(_) => {
                warn!(
                    key = handle.key(),
                    "lease guard dropped outside a tokio runtime; lease will expire after its ttl"
                );
            }
        }
    }
}
