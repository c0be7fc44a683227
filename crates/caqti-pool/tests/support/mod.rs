//! Shared harness for the pool integration tests.
#![allow(dead_code)]

use std::{
    collections::HashSet,
    fmt,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use caqti_pool::Manage;
use futures::future::BoxFuture;

/// A stand-in for a connection: an id plus a flag asserting that no two
/// callers ever hold it at once.
pub struct TestResource {
    pub id: u64,
    busy: AtomicBool,
}

impl TestResource {
    pub fn enter(&self) {
        assert!(
            !self.busy.swap(true, Ordering::AcqRel),
            "resource {} lent to two callers at once",
            self.id,
        );
    }

    pub fn exit(&self) {
        assert!(self.busy.swap(false, Ordering::AcqRel));
    }
}

/// Lifecycle accounting shared between a [`TestManager`] and the test body.
#[derive(Default)]
pub struct Counters {
    attempts: AtomicU64,
    created: AtomicU64,
    freed: AtomicU64,
    create_failures: AtomicU64,
    freed_ids: Mutex<HashSet<u64>>,
}

impl Counters {
    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Acquire)
    }

    pub fn create_failures(&self) -> u64 {
        self.create_failures.load(Ordering::Acquire)
    }

    pub fn alive(&self) -> u64 {
        self.created() - self.freed()
    }
}

#[derive(Debug)]
pub struct CreateFailed;

impl fmt::Display for CreateFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("resource factory failed")
    }
}

impl std::error::Error for CreateFailed {}

/// A [`Manage`] implementation with injectable failures and probes.
///
/// `fail_create` is called with the zero-based attempt number; returning
/// `true` makes that attempt fail. `healthy` and `valid` drive the `check`
/// and `validate` probes. Freeing the same resource twice panics.
pub struct TestManager {
    pub counters: Arc<Counters>,
    pub fail_create: Box<dyn Fn(u64) -> bool + Send + Sync>,
    pub healthy: Box<dyn Fn(&TestResource) -> bool + Send + Sync>,
    pub valid: Box<dyn Fn(&TestResource) -> bool + Send + Sync>,
}

impl TestManager {
    pub fn new() -> Self {
        Self {
            counters: Arc::new(Counters::default()),
            fail_create: Box::new(|_| false),
            healthy: Box::new(|_| true),
            valid: Box::new(|_| true),
        }
    }

    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }
}

impl Manage for TestManager {
    type Resource = TestResource;
    type Error = CreateFailed;

    fn create(&self) -> BoxFuture<'_, Result<TestResource, CreateFailed>> {
        Box::pin(async move {
            let attempt = self.counters.attempts.fetch_add(1, Ordering::AcqRel);
            if (self.fail_create)(attempt) {
                self.counters.create_failures.fetch_add(1, Ordering::AcqRel);
                return Err(CreateFailed);
            }
            let id = self.counters.created.fetch_add(1, Ordering::AcqRel);
            Ok(TestResource {
                id,
                busy: AtomicBool::new(false),
            })
        })
    }

    fn free(&self, resource: TestResource) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let fresh = self
                .counters
                .freed_ids
                .lock()
                .unwrap()
                .insert(resource.id);
            assert!(fresh, "resource {} freed twice", resource.id);
            self.counters.freed.fetch_add(1, Ordering::AcqRel);
        })
    }

    fn check<'a>(&'a self, resource: &'a mut TestResource) -> BoxFuture<'a, bool> {
        Box::pin(async move { (self.healthy)(resource) })
    }

    fn validate<'a>(&'a self, resource: &'a mut TestResource) -> BoxFuture<'a, bool> {
        Box::pin(async move { (self.valid)(resource) })
    }
}

/// Poll `condition` every 10 ms until it holds or `deadline` elapses.
pub async fn wait_until(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
