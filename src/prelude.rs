pub use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

pub use anyhow::{anyhow, bail, Context, Result};
#[allow(unused)]
pub use tracing::{debug, error, info, warn};
pub use serde::Serialize;

pub use lease::{LeaseStore, LockManager, LockOptions, ReleaseOutcome};

/// Key contended on when none is given
pub const DEFAULT_KEY: &str = "global_resource_lock";
pub const DEFAULT_STORE: &str = "redis://127.0.0.1:6379";
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_HOLD_MS: u64 = 1_000;
