pub mod prelude;
use prelude::*;

pub mod backend;
pub mod cli;
pub mod harness;
pub mod util;

pub use backend::Backend;
pub use cli::{Cli, Commands};
pub use harness::{ContentionHarness, HarnessConfig, HarnessReport, WorkerOutcome};

use lease::LockHandle;

/// A lease store plus lock defaults, resolved from the command line
pub struct Leasehold {
    pub backend: Backend,
    pub locks: LockManager,
}

impl Leasehold {
    pub async fn connect(address: &str, options: LockOptions) -> Result<Self> {
        let backend = Backend::connect(address).await?;
        let locks = LockManager::new(backend.store(), options)?;
        Ok(Self { backend, locks })
    }

    /// Run the contention harness with a fresh counter.
    pub async fn contend(&self, config: HarnessConfig, reset: bool) -> Result<HarnessReport> {
        if reset {
            self.backend.clear(&config.key).await?;
        }
        let harness = ContentionHarness::new(self.locks.clone(), config)?;
        let counter = Arc::new(AtomicU64::new(0));
        harness.run(counter).await
    }

    /// Acquire `key`, sit on it for `hold`, give it back.
    pub async fn hold(&self, key: &str, hold: Duration) -> Result<ReleaseOutcome> {
        let mut handle: LockHandle = self.locks.acquire(key).await?;
        info!(key, token = %handle.token(), hold_ms = util::duration_ms(hold), "holding lease");
        tokio::time::sleep(hold).await;
        Ok(self.locks.release(&mut handle).await?)
    }
}
