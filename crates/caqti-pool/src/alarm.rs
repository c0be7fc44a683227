//! Pluggable timers for idle-age expiry.
//!
//! The pool does not own a timer wheel. When it needs to be woken at a
//! deadline to evict resources that have sat idle too long, it delegates to
//! an [`Alarm`] supplied through
//! [`PoolConfig::alarm`](crate::PoolConfig::alarm). At most one alarm is in
//! flight per pool at any time.

use std::time::Instant;

/// The callback handed to [`Alarm::schedule`].
pub type AlarmCallback = Box<dyn FnOnce() + Send>;

/// A single-shot, cancellable timer.
pub trait Alarm: Send + Sync {
    /// Arrange for `callback` to run once, at or after `deadline`.
    ///
    /// The callback re-enters the pool, so it must be dispatched to a task
    /// context rather than invoked from inside `schedule` itself.
    fn schedule(&self, deadline: Instant, callback: AlarmCallback) -> Box<dyn AlarmHandle>;
}

/// Cancellation handle for a scheduled alarm.
pub trait AlarmHandle: Send {
    /// Cancel the alarm.
    ///
    /// If the callback has already started running this does not interrupt
    /// it, but the alarm has no further observable effect once `unschedule`
    /// returns.
    fn unschedule(self: Box<Self>);
}

/// The default [`Alarm`], backed by the tokio timer.
///
/// Each scheduled alarm is a spawned task sleeping until the deadline;
/// unscheduling aborts the task.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioAlarm;

impl Alarm for TokioAlarm {
    fn schedule(&self, deadline: Instant, callback: AlarmCallback) -> Box<dyn AlarmHandle> {
        let task = tokio::task::spawn(async move {
            tokio::time::sleep_until(deadline.into()).await;
            callback();
        });
        Box::new(TokioAlarmHandle { task })
    }
}

struct TokioAlarmHandle {
    task: tokio::task::JoinHandle<()>,
}

impl AlarmHandle for TokioAlarmHandle {
    fn unschedule(self: Box<Self>) {
        self.task.abort();
    }
}

/// An [`Alarm`] that never fires, for runtimes without a usable timer.
///
/// With this alarm installed, idle-age expiry degrades to opportunistic:
/// expired resources are only evicted when a release next examines the idle
/// queue.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopAlarm;

impl Alarm for NoopAlarm {
    fn schedule(&self, _deadline: Instant, callback: AlarmCallback) -> Box<dyn AlarmHandle> {
        drop(callback);
        Box::new(NoopAlarmHandle)
    }
}

struct NoopAlarmHandle;

impl AlarmHandle for NoopAlarmHandle {
    fn unschedule(self: Box<Self>) {}
}
