//! Types for working with errors produced by the pool.

/// Represents the ways an acquisition can fail.
///
/// Probe failures (a resource failing its [`validate`](crate::Manage::validate)
/// or [`check`](crate::Manage::check) probe) are handled internally by
/// discarding the resource and are never surfaced through this type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PoolError<E>
where
    E: std::error::Error + 'static,
{
    /// The resource factory failed while opening a new resource.
    ///
    /// The slot reserved for the resource has been returned to the pool.
    #[error("failed to create a pooled resource")]
    Create(#[source] E),

    /// [`Pool::drain`] was called, either before this acquisition started or
    /// while it was waiting for a resource.
    ///
    /// [`Pool::drain`]: crate::Pool::drain
    #[error("attempted to acquire a resource from a draining pool")]
    Draining,

    /// The configured acquire timeout elapsed before a resource became
    /// available.
    ///
    /// Only returned when [`PoolConfig::acquire_timeout`] is set.
    ///
    /// [`PoolConfig::acquire_timeout`]: crate::PoolConfig::acquire_timeout
    #[error("timed out waiting for a pooled resource")]
    Timeout,
}
