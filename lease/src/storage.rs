use crate::{Result, Token};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The two atomic primitives the lock protocol needs from a shared store.
///
/// Both calls are single round-trips. A connectivity failure must come back
/// as `Error::StoreUnavailable` and never as `Ok(false)`.
#[async_trait]
pub trait LeaseStore: Send + Sync + std::fmt::Debug {
    /// Create the lease for `key` holding `token`, expiring after `ttl`, only
    /// if no live lease exists. Returns `true` iff this call created it.
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool>;

    /// Delete the lease for `key` only if it still holds `token`. Returns
    /// `true` iff a lease was deleted.
    async fn try_release(&self, key: &str, token: &Token) -> Result<bool>;
}

#[async_trait]
impl<S: LeaseStore + ?Sized> LeaseStore for Arc<S> {
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool> {
        (**self).try_acquire(key, token, ttl).await
    }

    async fn try_release(&self, key: &str, token: &Token) -> Result<bool> {
        (**self).try_release(key, token).await
    }
}

#[async_trait]
impl<S: LeaseStore + ?Sized> LeaseStore for Box<S> {
    async fn try_acquire(&self, key: &str, token: &Token, ttl: Duration) -> Result<bool> {
        (**self).try_acquire(key, token, ttl).await
    }

    async fn try_release(&self, key: &str, token: &Token) -> Result<bool> {
        (**self).try_release(key, token).await
    }
}
