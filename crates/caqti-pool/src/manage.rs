use futures_core::future::BoxFuture;

/// The contract between a [`Pool`](crate::Pool) and the resources it manages.
///
/// A database driver implements this for its connection type: `create` opens
/// a connection, `free` closes it, and the two probes let the pool weed out
/// connections that have gone bad between checkouts.
///
/// All four methods are invoked outside the pool's internal lock and may
/// suspend for as long as they need to.
pub trait Manage: Send + Sync + 'static {
    /// The resource handed out by the pool, typically a live connection.
    type Resource: Send + 'static;

    /// The error produced when opening a resource fails. Surfaced to
    /// acquirers as [`PoolError::Create`](crate::PoolError::Create).
    type Error: std::error::Error + Send + Sync + 'static;

    /// Open a new resource.
    fn create(&self) -> BoxFuture<'_, Result<Self::Resource, Self::Error>>;

    /// Dispose of a resource.
    ///
    /// Called exactly once per created resource: when it is evicted, fails a
    /// probe, exceeds its use count, or the pool drains. Implementations
    /// should absorb and log their own shutdown errors rather than panic.
    fn free(&self, resource: Self::Resource) -> BoxFuture<'_, ()>;

    /// Health probe run when a resource is returned to the pool.
    ///
    /// Returning `false` prevents the resource from being repooled; it is
    /// freed and its slot handed to the next waiter. The default accepts
    /// every resource.
    fn check<'a>(&'a self, resource: &'a mut Self::Resource) -> BoxFuture<'a, bool> {
        let _ = resource;
        Box::pin(std::future::ready(true))
    }

    /// Probe run on an idle resource just before it is checked out.
    ///
    /// Returning `false` discards the resource and opens a replacement in its
    /// place. The default accepts every resource.
    fn validate<'a>(&'a self, resource: &'a mut Self::Resource) -> BoxFuture<'a, bool> {
        let _ = resource;
        Box::pin(std::future::ready(true))
    }
}
