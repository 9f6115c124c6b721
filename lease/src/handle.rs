// Per-acquisition lock state

use crate::Token;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Lifecycle of a single acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    /// Token generated, no lease created yet
    Unacquired,
    /// `try_acquire` succeeded for this token
    Acquired,
    /// Release ran (whatever the store said)
    Released,
    /// `max_wait` elapsed without acquiring
    TimedOut,
}

impl LeaseState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LeaseState::Released | LeaseState::TimedOut)
    }
}

/// What a release call observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseOutcome {
    /// Our own, still-valid lease was deleted
    Released,
    /// The lease had expired or belonged to another token; exclusivity may
    /// have been lost during the critical section
    AlreadyGone,
    /// Nothing to release
    NoOp,
}

impl fmt::Display for ReleaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReleaseOutcome::Released => "released",
            ReleaseOutcome::AlreadyGone => "already gone",
            ReleaseOutcome::NoOp => "no-op",
        };
        f.write_str(s)
    }
}

/// One caller's claim on a key.
///
/// The in-process state only decides whether a store call is needed at all;
/// ownership itself is always re-checked by the store on release.
#[derive(Debug)]
pub struct LockHandle {
    key: String,
    token: Token,
    ttl: Duration,
    state: LeaseState,
    acquired_at: Option<Instant>,
}

impl LockHandle {
    pub(crate) fn new(key: &str, ttl: Duration) -> Self {
        Self {
            key: key.to_string(),
            token: Token::generate(),
            ttl,
            state: LeaseState::Unacquired,
            acquired_at: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &Token {
        &self.token
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn state(&self) -> LeaseState {
        self.state
    }

    pub fn is_acquired(&self) -> bool {
        self.state == LeaseState::Acquired
    }

    pub fn acquired_at(&self) -> Option<Instant> {
        self.acquired_at
    }

    /// Time until the store drops the lease on its own, judged by the local
    /// clock. `None` once it has lapsed or if it was never acquired.
    pub fn time_remaining(&self) -> Option<Duration> {
        let acquired_at = self.acquired_at.filter(|_| self.is_acquired())?;
        self.ttl.checked_sub(acquired_at.elapsed()).filter(|d| !d.is_zero())
    }

    pub(crate) fn mark_acquired(&mut self) {
        self.state = LeaseState::Acquired;
        self.acquired_at = Some(Instant::now());
    }

    pub(crate) fn mark_timed_out(&mut self) {
        self.state = LeaseState::TimedOut;
    }

    /// Move the live claim into a new handle, leaving this one released.
    pub(crate) fn detach(&mut self) -> LockHandle {
        let detached = LockHandle {
            key: self.key.clone(),
            token: self.token,
            ttl: self.ttl,
            state: self.state,
            acquired_at: self.acquired_at,
        };
        self.mark_released();
        detached
    }

    pub(crate) fn mark_released(&mut self) {
        if self.state == LeaseState::Acquired {
            self.state = LeaseState::Released;
        }
    }
}
