//! A bounded, priority-aware pool of reusable resources for asynchronous
//! database clients.

/// Pluggable timers for idle-age expiry.
pub mod alarm;
/// Pool configuration.
mod config;
/// Error types.
pub mod error;
/// The factory/destructor contract for pooled resources.
mod manage;
/// The resource pool implementation.
mod pool;

pub use crate::{
    alarm::{Alarm, AlarmCallback, AlarmHandle, NoopAlarm, TokioAlarm},
    config::{MAX_SIZE_ENV, PoolConfig},
    error::PoolError,
    manage::Manage,
    pool::{CloseEvent, Pool, Pooled},
};
