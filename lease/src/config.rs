// Lock timing configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Lease duration used when nothing else is configured
pub const DEFAULT_TTL: Duration = Duration::from_secs(5);

/// Waiters give up after this many lease durations
pub const MAX_WAIT_TTL_MULTIPLE: u32 = 2;

/// Poll interval is derived as `ttl / POLL_DIVISOR`
pub const POLL_DIVISOR: u32 = 50;

/// Floor for the poll interval so waiters don't hammer the store
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Longest lease a store is asked to keep
pub const MAX_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Timing for a single acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long the store keeps the lease without a release
    pub ttl: Duration,
    /// Upper bound on time spent polling before `AcquisitionTimeout`
    pub max_wait: Duration,
    /// Sleep between failed attempts
    pub poll_interval: Duration,
}

impl LockOptions {
    /// Options for `ttl` with `max_wait` and `poll_interval` derived from it.
    pub fn for_ttl(ttl: Duration) -> Self {
        Self {
            ttl,
            max_wait: ttl.saturating_mul(MAX_WAIT_TTL_MULTIPLE),
            poll_interval: derive_poll_interval(ttl),
        }
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.ttl.is_zero() {
            return Err(Error::InvalidConfig("ttl must be greater than zero".into()));
        }
        if self.ttl > MAX_TTL {
            return Err(Error::InvalidConfig(format!(
                "ttl {:?} exceeds the {MAX_TTL:?} limit",
                self.ttl
            )));
        }
        if self.max_wait.is_zero() {
            return Err(Error::InvalidConfig(
                "max_wait must be greater than zero".into(),
            ));
        }
        if self.poll_interval.is_zero() || self.poll_interval > self.ttl {
            return Err(Error::InvalidConfig(format!(
                "poll_interval {:?} must be within (0, ttl={:?}]",
                self.poll_interval, self.ttl
            )));
        }
        // Leases shorter than the floor may poll at their own ttl.
        if self.poll_interval < MIN_POLL_INTERVAL.min(self.ttl) {
            return Err(Error::InvalidConfig(format!(
                "poll_interval {:?} is below the {MIN_POLL_INTERVAL:?} floor",
                self.poll_interval
            )));
        }
        Ok(())
    }
}

impl Default for LockOptions {
    fn default() -> Self {
        Self::for_ttl(DEFAULT_TTL)
    }
}

fn derive_poll_interval(ttl: Duration) -> Duration {
    (ttl / POLL_DIVISOR).max(MIN_POLL_INTERVAL).min(ttl)
}

/// Serializable configuration surface for lock defaults.
///
/// Unset optional fields fall back to values derived from `ttl_secs`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub ttl_secs: u64,
    pub max_wait_secs: Option<u64>,
    pub poll_ms: Option<u64>,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            ttl_secs: DEFAULT_TTL.as_secs(),
            max_wait_secs: None,
            poll_ms: None,
        }
    }
}

impl LockConfig {
    /// Resolve into validated `LockOptions`.
    pub fn options(&self) -> Result<LockOptions> {
        let mut options = LockOptions::for_ttl(Duration::from_secs(self.ttl_secs));
        if let Some(secs) = self.max_wait_secs {
            options.max_wait = Duration::from_secs(secs);
        }
        if let Some(ms) = self.poll_ms {
            options.poll_interval = Duration::from_millis(ms);
        }
        options.validate()?;
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults_follow_ttl() {
        let options = LockOptions::for_ttl(Duration::from_secs(5));
        assert_eq!(options.max_wait, Duration::from_secs(10));
        assert_eq!(options.poll_interval, Duration::from_millis(100));
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_short_ttl_uses_poll_floor() {
        let options = LockOptions::for_ttl(Duration::from_millis(500));
        assert_eq!(options.poll_interval, MIN_POLL_INTERVAL);
    }

    #[test]
    fn test_config_overrides() {
        let config = LockConfig {
            ttl_secs: 1,
            max_wait_secs: Some(10),
            poll_ms: Some(50),
        };
        let options = config.options().unwrap();
        assert_eq!(options.ttl, Duration::from_secs(1));
        assert_eq!(options.max_wait, Duration::from_secs(10));
        assert_eq!(options.poll_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_invalid_configs_rejected() {
        let zero_ttl = LockConfig {
            ttl_secs: 0,
            ..LockConfig::default()
        };
        assert!(matches!(zero_ttl.options(), Err(Error::InvalidConfig(_))));

        let zero_wait = LockConfig {
            max_wait_secs: Some(0),
            ..LockConfig::default()
        };
        assert!(matches!(zero_wait.options(), Err(Error::InvalidConfig(_))));

        let slow_poll = LockConfig {
            ttl_secs: 1,
            poll_ms: Some(1_500),
            ..LockConfig::default()
        };
        assert!(matches!(slow_poll.options(), Err(Error::InvalidConfig(_))));

        let busy_poll = LockConfig {
            poll_ms: Some(1),
            ..LockConfig::default()
        };
        assert!(matches!(busy_poll.options(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_huge_ttl_rejected_without_overflow() {
        let huge = LockConfig {
            ttl_secs: u64::MAX,
            ..LockConfig::default()
        };
        assert!(matches!(huge.options(), Err(Error::InvalidConfig(_))));

        let options = LockOptions::for_ttl(Duration::MAX);
        assert_eq!(options.max_wait, Duration::MAX);
        assert!(options.validate().is_err());

        assert!(LockOptions::for_ttl(MAX_TTL).validate().is_ok());
    }

    #[test]
    fn test_sub_floor_ttl_may_poll_at_ttl() {
        let options = LockOptions::for_ttl(Duration::from_millis(5));
        assert_eq!(options.poll_interval, Duration::from_millis(5));
        assert!(options.validate().is_ok());
    }

    proptest! {
        #[test]
        fn prop_derived_options_are_valid(ttl_ms in 1u64..600_000) {
            let ttl = Duration::from_millis(ttl_ms);
            let options = LockOptions::for_ttl(ttl);
            prop_assert!(options.validate().is_ok());
            prop_assert!(options.poll_interval <= ttl);
            prop_assert!(options.max_wait >= ttl);
            if ttl >= MIN_POLL_INTERVAL {
                prop_assert!(options.poll_interval >= MIN_POLL_INTERVAL);
            }
        }
    }
}
