use crate::{storage::LeaseStore, Error, Result, Token};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
struct StoredLease {
    token: Token,
    expires_at: Instant,
}

impl StoredLease {
    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Process-local lease store with the same contract as the remote stores.
///
/// Each key's check-and-write happens under its DashMap shard lock, and
/// expired entries are treated as absent. Time comes from the tokio clock so
/// tests can pause and advance it.
#[derive(Debug)]
pub struct InMemoryStore {
    leases: DashMap<String, StoredLease>,
    online: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            leases: DashMap::new(),
            online: AtomicBool::new(true),
        }
    }

    /// Simulate losing (or regaining) the connection to the store.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Token of the live lease on `key`, if any.
    pub fn holder(&self, key: &str) -> Option<Token> {
        let now = Instant::now();
        self.leases
            .get(key)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.token)
    }

    /// Remaining lifetime of the live lease on `key`.
    pub fn time_remaining(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.leases
            .get(key)
            .filter(|lease| lease.is_live(now))
            .map(|lease| lease.expires_at - now)
    }

    /// Unconditionally drop whatever lease `key` has.
    pub fn clear(&self, key: &str) -> bool {
        self.leases.remove(key).is_some()
    }

    fn ensure_online(&self) -> Result<()> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::StoreUnavailable("in-memory store is offline".into()))
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LeaseStore for InMemoryStore {
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool> {
        self.ensure_online()?;
        let now = Instant::now();
        let expires_at = now
            .checked_add(ttl)
            .ok_or_else(|| Error::InvalidConfig(format!("ttl {ttl:?} is out of range")))?;
        let fresh = StoredLease {
            token: *token,
            expires_at,
        };

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if entry.get().is_live(now) {
                    return Ok(false);
                }
                entry.insert(fresh);
                Ok(true)
            }
            Entry::Vacant(entry) => {
                entry.insert(fresh);
                Ok(true)
            }
        }
    }

    async fn try_release(&self, key: &str, token: &Token) -> Result<bool> {
        self.ensure_online()?;
        let now = Instant::now();
        // An expired lease with our token is removed but reported as gone,
        // matching a store that evicts on expiry.
        Ok(self
            .leases
            .remove_if(key, |_, lease| lease.token == *token)
            .is_some_and(|(_, lease)| lease.is_live(now)))
    }
}
