use lease::{InMemoryStore, RedisStore};

use crate::prelude::*;

/// Address that selects the process-local store instead of a server
pub const MEMORY_ADDRESS: &str = "memory";

/// The lease store a command runs against, picked from its address.
#[derive(Debug, Clone)]
pub enum Backend {
    Memory(Arc<InMemoryStore>),
    Redis(Arc<RedisStore>),
}

impl Backend {
    /// `memory` for an in-process store, otherwise a `redis://` URL.
    pub async fn connect(address: &str) -> Result<Self> {
        if address == MEMORY_ADDRESS {
            debug!("using in-memory lease store");
            return Ok(Backend::Memory(Arc::new(InMemoryStore::new())));
        }
        let store = RedisStore::connect(address)
            .await
            .with_context(|| format!("connecting to lease store at {address}"))?;
        Ok(Backend::Redis(Arc::new(store)))
    }

    pub fn store(&self) -> Arc<dyn LeaseStore> {
        match self {
            Backend::Memory(store) => store.clone(),
            Backend::Redis(store) => store.clone(),
        }
    }

    /// Drop a stale lease left on `key` by an earlier run.
    pub async fn clear(&self, key: &str) -> Result<bool> {
        let removed = match self {
            Backend::Memory(store) => store.clear(key),
            Backend::Redis(store) => store.clear(key).await?,
        };
        if removed {
            info!(key, "cleaned up old lease");
        }
        Ok(removed)
    }
}
