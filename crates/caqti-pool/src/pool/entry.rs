use std::{
    fmt::{self, Debug, Formatter},
    ops::{Deref, DerefMut},
    sync::Arc,
    time::Instant,
};

use super::inner::{PoolInner, SlotGuard};
use crate::manage::Manage;

const EXPECT_MSG: &str = "BUG: pool entry already taken!";

/// A resource plus its reuse bookkeeping.
pub(super) struct Entry<R> {
    pub(super) resource: R,
    /// Number of completed checkouts.
    pub(super) used_count: u64,
    /// When the entry last joined the idle queue.
    pub(super) used_latest: Instant,
}

impl<R> Entry<R> {
    pub(super) fn new(resource: R) -> Self {
        Self {
            resource,
            used_count: 0,
            used_latest: Instant::now(),
        }
    }
}

/// An entry that is outside every queue while the pool works on it, paired
/// with the slot it occupies.
///
/// If it is dropped mid-flight (an acquisition future cancelled during
/// validation, say) the resource is freed and the slot given back.
pub(super) struct Floating<M: Manage> {
    entry: Option<Entry<M::Resource>>,
    guard: Option<SlotGuard<M>>,
}

impl<M: Manage> Floating<M> {
    pub(super) fn new(pool: Arc<PoolInner<M>>, entry: Entry<M::Resource>) -> Self {
        Self {
            entry: Some(entry),
            guard: Some(SlotGuard::new(pool)),
        }
    }

    pub(super) fn resource_mut(&mut self) -> &mut M::Resource {
        &mut self.entry.as_mut().expect(EXPECT_MSG).resource
    }

    /// Complete the checkout: the slot travels with the returned handle.
    pub(super) fn attach(mut self) -> Pooled<M> {
        let entry = self.entry.take().expect(EXPECT_MSG);
        let guard = self.guard.take().expect(EXPECT_MSG);
        let pool = Arc::clone(&guard.pool);
        guard.forget();
        Pooled::new(pool, entry)
    }

    /// Give up on the entry but keep its slot reserved, so a replacement can
    /// be opened without re-entering the size accounting.
    pub(super) fn discard(mut self) -> (M::Resource, SlotGuard<M>) {
        let entry = self.entry.take().expect(EXPECT_MSG);
        let guard = self.guard.take().expect(EXPECT_MSG);
        (entry.resource, guard)
    }
}

impl<M: Manage> Drop for Floating<M> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            if let Some(guard) = &self.guard {
                guard.pool.free_detached(entry.resource);
            }
        }
        // `guard` drops afterwards and releases the slot.
    }
}

/// A resource checked out of a [`Pool`][crate::Pool].
///
/// Dereferences to the managed resource. Returned to the pool on drop; call
/// [`release`][Self::release] instead to wait for the return to complete,
/// including the health check and any idle-queue trimming it triggers.
pub struct Pooled<M: Manage> {
    entry: Option<Entry<M::Resource>>,
    pool: Arc<PoolInner<M>>,
}

impl<M: Manage> Pooled<M> {
    pub(super) fn new(pool: Arc<PoolInner<M>>, entry: Entry<M::Resource>) -> Self {
        Self {
            entry: Some(entry),
            pool,
        }
    }

    /// Return the resource to the pool, eagerly.
    ///
    /// This runs the drop handler in place instead of spawning a task to do
    /// it: when `release` returns, the resource has been repooled or freed
    /// and a waiter woken.
    pub async fn release(mut self) {
        if let Some(entry) = self.entry.take() {
            self.pool.release(entry).await;
        }
    }
}

impl<M: Manage> Debug for Pooled<M> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pooled").finish_non_exhaustive()
    }
}

impl<M: Manage> Deref for Pooled<M> {
    type Target = M::Resource;

    fn deref(&self) -> &Self::Target {
        &self.entry.as_ref().expect(EXPECT_MSG).resource
    }
}

impl<M: Manage> DerefMut for Pooled<M> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.entry.as_mut().expect(EXPECT_MSG).resource
    }
}

/// Returns the resource to the pool it was checked out from.
impl<M: Manage> Drop for Pooled<M> {
    fn drop(&mut self) {
        if let Some(entry) = self.entry.take() {
            let pool = Arc::clone(&self.pool);
            match tokio::runtime::Handle::try_current() {
                Ok(handle) => {
                    handle.spawn(async move {
                        pool.release(entry).await;
                    });
                }
                Err(_) => {
                    // No runtime left to run the release protocol on; free
                    // the resource in place and give its slot back.
                    futures_executor::block_on(pool.manager.free(entry.resource));
                    pool.release_slot();
                }
            }
        }
    }
}
