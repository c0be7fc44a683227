//! Provides the bounded, priority-aware resource pool.
//!
//! Opening a database connection for each and every operation quickly
//! becomes expensive, and sharing one between tasks is difficult to express
//! in Rust. A pool manages opening and re-using a small population of
//! resources on behalf of many concurrent callers, while enforcing a hard
//! size limit, a reuse limit, health checks, and idle expiry.
use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
};

use event_listener::EventListener;
use futures_core::{FusedFuture, future::BoxFuture};
use futures_util::FutureExt;

use self::inner::PoolInner;
use crate::{config::PoolConfig, error::PoolError, manage::Manage};

mod entry;
mod inner;
mod waiters;

pub use self::entry::Pooled;

/// An asynchronous pool of reusable resources.
///
/// A pool is constructed from a [`PoolConfig`] and a [`Manage`]
/// implementation, which supplies the factory, destructor, and probes for
/// the resource type being pooled. Resources are opened lazily: the first
/// acquisitions create them, later ones reuse whatever sits in the idle
/// queue.
///
/// Call [`acquire`][Pool::acquire] for a [`Pooled`] handle that returns its
/// resource on drop, or [`with`][Pool::with] to run a closure against a
/// resource with the checkout and release managed for you.
///
/// The pool has a maximum resource limit that it will not exceed; when
/// `acquire` is called at the limit with every resource checked out, the
/// task waits until one becomes available. Waiting tasks are served highest
/// priority first, first-come-first-served among equal priorities.
///
/// `Pool` is `Send`, `Sync` and `Clone`: it is a reference-counted handle to
/// shared state, intended to be created once and shared between tasks for
/// the life of the program. Call [`drain().await`][Pool::drain] when you are
/// done with it so every resource is handed back to its destructor; dropping
/// the last handle instead simply drops the resources in place.
pub struct Pool<M: Manage>(pub(crate) Arc<PoolInner<M>>);

impl<M: Manage> Pool<M> {
    /// Create a pool with the default configuration.
    pub fn new(manager: M) -> Self {
        PoolConfig::new().open(manager)
    }

    pub(crate) fn with_config(config: PoolConfig, manager: M) -> Self {
        Pool(PoolInner::new_arc(config, manager))
    }

    /// Retrieve a resource from the pool at the default priority.
    ///
    /// Equivalent to [`acquire_priority(0.0)`][Pool::acquire_priority].
    pub async fn acquire(&self) -> Result<Pooled<M>, PoolError<M::Error>> {
        self.acquire_priority(0.0).await
    }

    /// Retrieve a resource from the pool.
    ///
    /// Takes the front of the idle queue when it has something to offer,
    /// opens a fresh resource while the pool is below its size limit, and
    /// otherwise waits for a slot. `priority` orders waiting acquirers:
    /// larger is served earlier, ties are first-come-first-served.
    ///
    /// Cancelling the returned future is safe at every suspension point: a
    /// reserved slot is given back, a half-checked-out resource is freed,
    /// and a waiter is woken in our place.
    pub async fn acquire_priority(
        &self,
        priority: f64,
    ) -> Result<Pooled<M>, PoolError<M::Error>> {
        self.0.acquire(priority).await
    }

    /// Attempt to retrieve an idle resource without waiting.
    ///
    /// Returns `None` immediately if the idle queue is empty or the pool is
    /// draining. Never opens a new resource.
    pub fn try_acquire(&self) -> Option<Pooled<M>> {
        self.0.try_acquire()
    }

    /// Run `f` on a pooled resource at the default priority.
    ///
    /// Equivalent to [`with_priority(0.0, f)`][Pool::with_priority].
    pub async fn with<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut M::Resource) -> BoxFuture<'a, Result<T, E>>,
        E: From<PoolError<M::Error>>,
    {
        self.with_priority(0.0, f).await
    }

    /// Acquire a resource, run `f` on it exactly once, and release it.
    ///
    /// The release happens on every exit path — success, error, panic, or
    /// cancellation — and on the success and error paths it completes before
    /// the result is surfaced, so the pool has finished its health check and
    /// idle-queue trimming by the time this returns.
    ///
    /// Acquisition failures are folded into `E` via its
    /// `From<PoolError<_>>` impl; `f` is not invoked when acquisition fails.
    ///
    /// ```no_run
    /// # use caqti_pool::{Manage, Pool, PoolError};
    /// # async fn demo<M>(pool: Pool<M>) -> Result<u64, PoolError<M::Error>>
    /// # where
    /// #     M: Manage<Resource = u64>,
    /// # {
    /// pool.with(|resource: &mut u64| {
    ///     Box::pin(async move { Ok(*resource) })
    /// })
    /// .await
    /// # }
    /// ```
    pub async fn with_priority<T, E, F>(&self, priority: f64, f: F) -> Result<T, E>
    where
        F: for<'a> FnOnce(&'a mut M::Resource) -> BoxFuture<'a, Result<T, E>>,
        E: From<PoolError<M::Error>>,
    {
        let mut pooled = self.0.acquire(priority).await.map_err(E::from)?;
        let result = f(&mut *pooled).await;
        pooled.release().await;
        result
    }

    /// Shut down the pool, freeing every resource it is accountable for.
    ///
    /// Queued and subsequent acquisitions fail with
    /// [`PoolError::Draining`]; resources currently checked out are freed as
    /// their holders release them. Returns once the pool's size has reached
    /// zero, which also cancels any pending idle-expiry alarm.
    ///
    /// `drain().await` may be called from several handles concurrently, and
    /// calling it again after it has returned is a no-op.
    pub async fn drain(&self) {
        self.0.drain().await
    }

    /// Returns `true` once [`drain`][Pool::drain] has begun.
    pub fn is_draining(&self) -> bool {
        self.0.is_draining()
    }

    /// Get a future that resolves when [`drain`][Pool::drain] begins.
    ///
    /// If the pool is already draining, the future resolves immediately.
    /// Useful for cutting short long-running work that holds a [`Pooled`]
    /// handle and would otherwise keep the drain from converging.
    pub fn close_event(&self) -> CloseEvent {
        self.0.close_event()
    }

    /// Returns the number of resources currently alive: idle, checked out,
    /// and being opened.
    ///
    /// Advisory: under concurrent traffic the value may be stale by the
    /// time it is read.
    pub fn size(&self) -> u32 {
        self.0.size()
    }

    /// Returns the number of idle resources awaiting checkout. Advisory,
    /// like [`size`][Pool::size].
    pub fn num_idle(&self) -> usize {
        self.0.num_idle()
    }
}

/// Returns a new [`Pool`] tied to the same shared state.
impl<M: Manage> Clone for Pool<M> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<M: Manage> fmt::Debug for Pool<M> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Pool")
            .field("size", &self.0.size())
            .field("num_idle", &self.0.num_idle())
            .field("is_draining", &self.0.is_draining())
            .field("config", &self.0.config)
            .finish()
    }
}

/// A future that resolves when the pool starts draining.
///
/// See [`Pool::close_event()`] for details.
pub struct CloseEvent {
    listener: Option<EventListener>,
}

impl Future for CloseEvent {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if let Some(listener) = &mut self.listener {
            futures_core::ready!(listener.poll_unpin(cx));
        }

        // Once the close notification arrives, fuse so that polling again
        // returns immediately instead of waiting on a fresh listener.
        self.listener = None;

        Poll::Ready(())
    }
}

impl FusedFuture for CloseEvent {
    fn is_terminated(&self) -> bool {
        self.listener.is_none()
    }
}

#[test]
#[allow(dead_code)]
fn assert_pool_traits() {
    fn assert_send_sync<T: Send + Sync>() {}
    fn assert_clone<T: Clone>() {}

    fn assert_pool<M: Manage>() {
        assert_send_sync::<Pool<M>>();
        assert_clone::<Pool<M>>();
    }
}
