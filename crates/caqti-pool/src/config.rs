use std::{
    env, fmt,
    sync::{Arc, OnceLock},
    time::Duration,
};

use crate::{
    alarm::{Alarm, TokioAlarm},
    manage::Manage,
    pool::Pool,
};

/// Environment variable overriding the default [`max_size`][PoolConfig::max_size]
/// when the configuration does not set one. Malformed or zero values fall
/// back to the built-in default of 8.
pub const MAX_SIZE_ENV: &str = "CAQTI_POOL_MAX_SIZE";

const DEFAULT_MAX_SIZE: u32 = 8;
const DEFAULT_MAX_USE_COUNT: u64 = 100;

fn parse_max_size(raw: Option<&str>) -> u32 {
    raw.and_then(|value| value.trim().parse::<u32>().ok())
        .filter(|&size| size >= 1)
        .unwrap_or(DEFAULT_MAX_SIZE)
}

/// The process environment is consulted once; later changes to the variable
/// have no effect on pools created afterwards.
fn env_default_max_size() -> u32 {
    static DEFAULT: OnceLock<u32> = OnceLock::new();
    *DEFAULT.get_or_init(|| parse_max_size(env::var(MAX_SIZE_ENV).ok().as_deref()))
}

/// Configuration options for a [`Pool`].
///
/// ```no_run
/// use std::time::Duration;
/// use caqti_pool::PoolConfig;
///
/// # fn demo<M: caqti_pool::Manage>(manager: M) {
/// let pool = PoolConfig::new()
///     .max_size(16)
///     .max_idle_size(4)
///     .max_idle_age(Duration::from_secs(60))
///     .open(manager);
/// # }
/// ```
#[derive(Clone)]
pub struct PoolConfig {
    pub(crate) max_size: u32,
    pub(crate) max_idle_size: Option<u32>,
    pub(crate) max_use_count: Option<u64>,
    pub(crate) max_idle_age: Option<Duration>,
    pub(crate) acquire_timeout: Option<Duration>,
    pub(crate) alarm: Arc<dyn Alarm>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl PoolConfig {
    /// Construct `Self` with default options.
    ///
    /// See the source of this method for the current defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_size: env_default_max_size(),
            max_idle_size: None,
            max_use_count: Some(DEFAULT_MAX_USE_COUNT),
            max_idle_age: None,
            acquire_timeout: None,
            alarm: Arc::new(TokioAlarm),
        }
    }

    /// Set the maximum number of resources the pool is accountable for at
    /// once: idle, checked out, and being opened.
    ///
    /// Be mindful of the connection limits of your database server as well
    /// as other applications which may want to connect to it.
    ///
    /// Defaults to 8, or the value of the `CAQTI_POOL_MAX_SIZE` environment
    /// variable when it is set to a positive integer.
    #[must_use]
    pub fn max_size(mut self, max: u32) -> Self {
        self.max_size = max;
        self
    }

    /// Get the maximum number of resources the pool maintains.
    pub fn get_max_size(&self) -> u32 {
        self.max_size
    }

    /// Set the maximum number of resources kept alive while unused.
    ///
    /// Whenever a release would leave the pool holding more than this many
    /// resources, the released resource is freed instead of repooled. A
    /// value of zero means every release frees its resource;
    /// [`max_size`][Self::max_size] still bounds concurrent checkouts.
    ///
    /// Defaults to [`max_size`][Self::max_size].
    #[must_use]
    pub fn max_idle_size(mut self, max: u32) -> Self {
        self.max_idle_size = Some(max);
        self
    }

    /// Get the configured idle cap, if one was set explicitly.
    pub fn get_max_idle_size(&self) -> Option<u32> {
        self.max_idle_size
    }

    /// Set the number of checkouts after which a resource is retired.
    ///
    /// Retiring resources periodically gives the database server a chance to
    /// clean up the session state that accumulates behind long-lived
    /// connections. `None` disables the limit.
    ///
    /// Defaults to 100. Must be positive when set.
    #[must_use]
    pub fn max_use_count(mut self, count: impl Into<Option<u64>>) -> Self {
        self.max_use_count = count.into();
        self
    }

    /// Get the per-resource checkout limit.
    pub fn get_max_use_count(&self) -> Option<u64> {
        self.max_use_count
    }

    /// Set a maximum idle duration for individual resources.
    ///
    /// Any resource that sits in the idle queue longer than this is freed,
    /// proactively when the configured [`alarm`][Self::alarm] fires and
    /// opportunistically on release. For usage-based database billing, this
    /// can be a cost saver.
    ///
    /// Defaults to `None`: idle resources live until reused or drained.
    #[must_use]
    pub fn max_idle_age(mut self, age: impl Into<Option<Duration>>) -> Self {
        self.max_idle_age = age.into();
        self
    }

    /// Get the maximum idle duration for individual resources.
    pub fn get_max_idle_age(&self) -> Option<Duration> {
        self.max_idle_age
    }

    /// Set the maximum amount of time to spend waiting in
    /// [`Pool::acquire`].
    ///
    /// Caps the total time an acquisition may spend waiting for a slot,
    /// opening a new resource, and validating an idle one. When the timeout
    /// elapses the acquisition fails with
    /// [`PoolError::Timeout`](crate::PoolError::Timeout).
    ///
    /// Defaults to `None`: acquisitions wait indefinitely.
    #[must_use]
    pub fn acquire_timeout(mut self, timeout: impl Into<Option<Duration>>) -> Self {
        self.acquire_timeout = timeout.into();
        self
    }

    /// Get the acquire timeout.
    pub fn get_acquire_timeout(&self) -> Option<Duration> {
        self.acquire_timeout
    }

    /// Install the timer used for proactive idle-age expiry.
    ///
    /// Defaults to [`TokioAlarm`]. Runtimes without a usable timer can
    /// install [`NoopAlarm`](crate::NoopAlarm), trading proactive expiry for
    /// opportunistic expiry on release.
    #[must_use]
    pub fn alarm(mut self, alarm: Arc<dyn Alarm>) -> Self {
        self.alarm = alarm;
        self
    }

    /// The idle cap actually enforced: the configured
    /// [`max_idle_size`][Self::max_idle_size], falling back to
    /// [`max_size`][Self::max_size].
    pub(crate) fn idle_capacity(&self) -> u32 {
        self.max_idle_size.unwrap_or(self.max_size)
    }

    /// Create a [`Pool`] from this configuration.
    ///
    /// Resources are opened lazily, on first demand.
    ///
    /// # Panics
    ///
    /// Panics if `max_size` is zero, `max_idle_size` exceeds `max_size`, or
    /// `max_use_count` is set to zero.
    pub fn open<M: Manage>(self, manager: M) -> Pool<M> {
        assert!(self.max_size >= 1, "max_size must be at least 1");
        if let Some(max_idle) = self.max_idle_size {
            assert!(
                max_idle <= self.max_size,
                "max_idle_size ({max_idle}) must not exceed max_size ({})",
                self.max_size,
            );
        }
        assert!(
            self.max_use_count != Some(0),
            "max_use_count must be positive when set",
        );
        Pool::with_config(self, manager)
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_size", &self.max_size)
            .field("max_idle_size", &self.max_idle_size)
            .field("max_use_count", &self.max_use_count)
            .field("max_idle_age", &self.max_idle_age)
            .field("acquire_timeout", &self.acquire_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn max_size_parsing_falls_back_to_default() {
        assert_eq!(parse_max_size(None), 8);
        assert_eq!(parse_max_size(Some("")), 8);
        assert_eq!(parse_max_size(Some("banana")), 8);
        assert_eq!(parse_max_size(Some("-3")), 8);
        assert_eq!(parse_max_size(Some("0")), 8);
    }

    #[test]
    fn max_size_parsing_accepts_positive_integers() {
        assert_eq!(parse_max_size(Some("1")), 1);
        assert_eq!(parse_max_size(Some("12")), 12);
        assert_eq!(parse_max_size(Some(" 64 ")), 64);
    }

    #[test]
    fn idle_capacity_follows_max_size_unless_set() {
        let config = PoolConfig::new().max_size(5);
        assert_eq!(config.idle_capacity(), 5);
        let config = config.max_idle_size(2);
        assert_eq!(config.idle_capacity(), 2);
    }
}
