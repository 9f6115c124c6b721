#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

//! Lease-based mutual exclusion over a shared key-value store.
//!
//! Contenders never talk to each other. Each one races to create a lease
//! entry with `set-if-absent-with-expiry` and gives it back with an atomic
//! `compare-token-and-delete`. A holder that dies simply lets its lease
//! expire.

pub mod config;
pub mod error;
pub mod guard;
pub mod handle;
pub mod manager;
pub mod memory;
pub mod redis_store;
pub mod storage;

pub mod test_utils;

pub use config::{LockConfig, LockOptions};
pub use error::{Error, Result};
pub use guard::LeaseGuard;
pub use handle::{LeaseState, LockHandle, ReleaseOutcome};
pub use manager::LockManager;
pub use memory::InMemoryStore;
pub use redis_store::RedisStore;
pub use storage::LeaseStore;

use std::fmt;

/// Proof of ownership written into the store alongside a lease.
///
/// 128 bits drawn from the thread-local CSPRNG, so two live handles never
/// share a token in practice.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Token([u8; 16]);

impl Token {
    pub fn generate() -> Self {
        Self(rand::random())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Token({self})")
    }
}
