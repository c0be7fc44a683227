use std::{
    collections::VecDeque,
    sync::{
        Arc, Mutex, MutexGuard, PoisonError,
        atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering},
    },
    time::Instant,
};

use tokio::{sync::oneshot, time::timeout};

use super::{
    CloseEvent,
    entry::{Entry, Floating, Pooled},
    waiters::WaiterQueue,
};
use crate::{
    alarm::AlarmHandle,
    config::PoolConfig,
    error::PoolError,
    manage::Manage,
};

/// Shared pool state.
pub(crate) struct PoolInner<M: Manage> {
    pub(super) config: PoolConfig,
    pub(super) manager: M,
    /// Mutable state. Never held across a factory call, a probe, `free`, or
    /// a user function; only across the short accounting segments below.
    state: Mutex<PoolState<M::Resource>>,
    /// Total resources the pool is accountable for: idle, checked out, and
    /// being opened. Mutated only while `state` is locked; loaded freely for
    /// advisory reads.
    size: AtomicU32,
    /// Idle-queue length, mirrored for advisory reads.
    num_idle: AtomicUsize,
    /// Whether `drain` has begun.
    is_draining: AtomicBool,
    /// Event fired when `drain` begins.
    on_closed: event_listener::Event,
}

struct PoolState<R> {
    /// Released resources awaiting their next checkout, longest idle first.
    idle: VecDeque<Entry<R>>,
    waiters: WaiterQueue,
    /// The pending idle-expiry alarm, if one is scheduled.
    alarm: Option<Box<dyn AlarmHandle>>,
}

impl<R> PoolState<R> {
    fn wake_one(&mut self) {
        self.waiters.wake_one();
    }
}

/// What an acquisition decided to do while it held the lock.
enum Acquire<R> {
    Checkout(Entry<R>),
    Open,
    Wait(oneshot::Receiver<()>),
}

/// One step of the drain loop, decided while the lock was held.
enum Drain<R> {
    Done,
    Free(R),
    Wait(oneshot::Receiver<()>),
}

impl<M: Manage> PoolInner<M> {
    pub(super) fn new_arc(config: PoolConfig, manager: M) -> Arc<Self> {
        Arc::new(Self {
            config,
            manager,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                waiters: WaiterQueue::default(),
                alarm: None,
            }),
            size: AtomicU32::new(0),
            num_idle: AtomicUsize::new(0),
            is_draining: AtomicBool::new(false),
            on_closed: event_listener::Event::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, PoolState<M::Resource>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Return the current number of resources, idle and in use.
    pub(super) fn size(&self) -> u32 {
        self.size.load(Ordering::Acquire)
    }

    /// Return the number of idle resources.
    pub(super) fn num_idle(&self) -> usize {
        self.num_idle.load(Ordering::Acquire)
    }

    /// Returns `true` once `drain` has begun.
    pub(super) fn is_draining(&self) -> bool {
        self.is_draining.load(Ordering::Acquire)
    }

    fn mark_draining(&self) {
        if !self.is_draining.swap(true, Ordering::AcqRel) {
            self.on_closed.notify(usize::MAX);
        }
    }

    /// Future that resolves when the pool starts draining.
    pub(super) fn close_event(&self) -> CloseEvent {
        CloseEvent {
            listener: (!self.is_draining()).then(|| self.on_closed.listen()),
        }
    }

    /// Give a reserved slot back and hand it to a waiter.
    pub(super) fn release_slot(&self) {
        let mut state = self.lock();
        self.size.fetch_sub(1, Ordering::AcqRel);
        state.wake_one();
    }

    /// Free a resource on a task of its own.
    ///
    /// Used where the caller cannot suspend: drop handlers and the expiry
    /// sweep, which decides under the lock.
    pub(super) fn free_detached(self: &Arc<Self>, resource: M::Resource) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                let pool = Arc::clone(self);
                handle.spawn(async move {
                    pool.manager.free(resource).await;
                });
            }
            // No runtime to ride; run the destructor right here so the
            // resource is still freed exactly once.
            Err(_) => futures_executor::block_on(self.manager.free(resource)),
        }
    }

    /// Acquire a resource, waiting until one is available.
    pub(super) async fn acquire(
        self: &Arc<Self>,
        priority: f64,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        match self.config.acquire_timeout {
            Some(limit) => timeout(limit, self.acquire_inner(priority))
                .await
                .map_err(|_| PoolError::Timeout)?,
            None => self.acquire_inner(priority).await,
        }
    }

    async fn acquire_inner(
        self: &Arc<Self>,
        priority: f64,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        loop {
            let step = {
                let mut state = self.lock();
                if self.is_draining() {
                    return Err(PoolError::Draining);
                }
                if let Some(entry) = state.idle.pop_front() {
                    self.num_idle.fetch_sub(1, Ordering::AcqRel);
                    Acquire::Checkout(entry)
                } else if self.size() < self.config.max_size {
                    self.size.fetch_add(1, Ordering::AcqRel);
                    Acquire::Open
                } else {
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(priority, tx);
                    Acquire::Wait(rx)
                }
            };

            match step {
                Acquire::Checkout(entry) => {
                    let mut floating = Floating::new(Arc::clone(self), entry);
                    if self.manager.validate(floating.resource_mut()).await {
                        return Ok(floating.attach());
                    }
                    tracing::warn!("pooled resource failed validation; discarding it");
                    // The dropped entry already owed a slot, so open the
                    // replacement against the same reservation.
                    let (resource, slot) = floating.discard();
                    self.manager.free(resource).await;
                    return self.open(slot).await;
                }
                Acquire::Open => return self.open(SlotGuard::new(Arc::clone(self))).await,
                Acquire::Wait(rx) => {
                    // Spurious wakes are fine: we re-check everything above.
                    let _ = rx.await;
                }
            }
        }
    }

    /// Attempt to acquire an idle resource without waiting.
    ///
    /// Skips the validation probe; the resource is handed out as it was
    /// returned.
    pub(super) fn try_acquire(self: &Arc<Self>) -> Option<Pooled<M>> {
        if self.is_draining() {
            return None;
        }
        let entry = {
            let mut state = self.lock();
            match state.idle.pop_front() {
                Some(entry) => {
                    self.num_idle.fetch_sub(1, Ordering::AcqRel);
                    entry
                }
                None => return None,
            }
        };
        Some(Pooled::new(Arc::clone(self), entry))
    }

    /// Open a new resource against an already-reserved slot.
    async fn open(
        self: &Arc<Self>,
        slot: SlotGuard<M>,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        match self.manager.create().await {
            Ok(resource) => {
                slot.forget();
                Ok(Pooled::new(Arc::clone(self), Entry::new(resource)))
            }
            Err(source) => {
                // Gives the slot back and wakes a waiter.
                drop(slot);
                Err(PoolError::Create(source))
            }
        }
    }

    /// Return a checked-out entry to the pool.
    ///
    /// The entry is repooled if it passes the health check and the pool has
    /// room for it; otherwise it is freed. Either way exactly one waiter is
    /// woken for the slot this frees up.
    pub(super) async fn release(self: &Arc<Self>, mut entry: Entry<M::Resource>) {
        let destroy = {
            // The guard is held purely so the accounting decision is atomic
            // with respect to other releases and acquisitions.
            let _state = self.lock();
            entry.used_count += 1;
            let beyond_idle = self.size() > self.config.idle_capacity();
            let worn_out = self
                .config
                .max_use_count
                .map_or(false, |limit| entry.used_count >= limit);
            if self.is_draining() || beyond_idle || worn_out {
                self.size.fetch_sub(1, Ordering::AcqRel);
                true
            } else {
                false
            }
        };

        if destroy {
            self.manager.free(entry.resource).await;
            self.lock().wake_one();
            return;
        }

        if self.manager.check(&mut entry.resource).await {
            let expired = {
                let mut state = self.lock();
                entry.used_latest = Instant::now();
                state.idle.push_back(entry);
                self.num_idle.fetch_add(1, Ordering::AcqRel);
                let expired = self.dispose_expiring(&mut state);
                state.wake_one();
                expired
            };
            for resource in expired {
                self.free_detached(resource);
            }
        } else {
            tracing::warn!("pooled resource failed its health check; closing it");
            {
                let mut state = self.lock();
                self.size.fetch_sub(1, Ordering::AcqRel);
                state.wake_one();
            }
            self.manager.free(entry.resource).await;
        }
    }

    /// Reconcile the idle queue and the alarm with `max_idle_age`.
    ///
    /// Pops every expired entry off the front of the idle queue, then makes
    /// sure an alarm is scheduled for the first entry still waiting to
    /// expire. Runs under the lock; the returned resources are the caller's
    /// to free once the lock is gone.
    fn dispose_expiring(
        self: &Arc<Self>,
        state: &mut PoolState<M::Resource>,
    ) -> Vec<M::Resource> {
        let mut expired = Vec::new();

        let Some(age) = self.config.max_idle_age else {
            if let Some(alarm) = state.alarm.take() {
                alarm.unschedule();
            }
            return expired;
        };

        let now = Instant::now();
        loop {
            let expiry = match state.idle.front() {
                None => break,
                Some(head) => match head.used_latest.checked_add(age) {
                    Some(expiry) => expiry,
                    None => {
                        tracing::warn!(
                            "idle expiry instant overflows the monotonic clock; \
                             leaving the resource in place"
                        );
                        break;
                    }
                },
            };
            if expiry <= now {
                if let Some(entry) = state.idle.pop_front() {
                    self.num_idle.fetch_sub(1, Ordering::AcqRel);
                    self.size.fetch_sub(1, Ordering::AcqRel);
                    expired.push(entry.resource);
                    state.wake_one();
                }
            } else {
                if state.alarm.is_none() {
                    let weak = Arc::downgrade(self);
                    state.alarm = Some(self.config.alarm.schedule(
                        expiry,
                        Box::new(move || {
                            if let Some(pool) = weak.upgrade() {
                                pool.on_alarm();
                            }
                        }),
                    ));
                }
                break;
            }
        }
        expired
    }

    fn on_alarm(self: &Arc<Self>) {
        let expired = {
            let mut state = self.lock();
            state.alarm = None;
            self.dispose_expiring(&mut state)
        };
        for resource in expired {
            self.free_detached(resource);
        }
    }

    /// Shut the pool down and wait for every resource to be freed.
    pub(super) async fn drain(self: &Arc<Self>) {
        self.mark_draining();
        // Anyone queued before the drain began will observe the draining
        // flag and bail out.
        self.lock().waiters.wake_all();

        loop {
            let step = {
                let mut state = self.lock();
                if self.size() == 0 {
                    if let Some(alarm) = state.alarm.take() {
                        alarm.unschedule();
                    }
                    // Other drain loops may be parked on the waiter queue;
                    // let them observe convergence too.
                    state.waiters.wake_all();
                    Drain::Done
                } else if let Some(entry) = state.idle.pop_front() {
                    self.num_idle.fetch_sub(1, Ordering::AcqRel);
                    self.size.fetch_sub(1, Ordering::AcqRel);
                    Drain::Free(entry.resource)
                } else {
                    tracing::debug!("pool drain waiting for checked-out resources");
                    let (tx, rx) = oneshot::channel();
                    state.waiters.push(0.0, tx);
                    Drain::Wait(rx)
                }
            };

            match step {
                Drain::Done => return,
                Drain::Free(resource) => self.manager.free(resource).await,
                Drain::Wait(rx) => {
                    let _ = rx.await;
                }
            }
        }
    }
}

impl<M: Manage> Drop for PoolInner<M> {
    fn drop(&mut self) {
        self.mark_draining();
        if let Ok(state) = self.state.get_mut() {
            if let Some(alarm) = state.alarm.take() {
                alarm.unschedule();
            }
        }
    }
}

/// RAII guard for a reserved slot in the pool's size accounting.
///
/// Dropping it gives the slot back and wakes a waiter, so a cancelled
/// acquisition cannot leak capacity.
pub(super) struct SlotGuard<M: Manage> {
    pub(super) pool: Arc<PoolInner<M>>,
    armed: bool,
}

impl<M: Manage> SlotGuard<M> {
    pub(super) fn new(pool: Arc<PoolInner<M>>) -> Self {
        Self { pool, armed: true }
    }

    /// Hand the slot over to whoever now owns the resource occupying it.
    pub(super) fn forget(mut self) {
        self.armed = false;
    }
}

impl<M: Manage> Drop for SlotGuard<M> {
    fn drop(&mut self) {
        if self.armed {
            self.pool.release_slot();
        }
    }
}
