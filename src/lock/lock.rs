use super::LockError;

/// Trait for a single mutual-exclusion lock.
///
/// Implementations provide blocking lock, non-blocking try-lock, and unlock.
/// [`DistributedLock`](super::DistributedLock) implements it on top of a
/// coordination service; other backends (leases, advisory locks) can sit
/// behind the same seam.
pub trait Lock: Send + Sync {
    /// Acquire the lock, blocking until it becomes available.
    fn lock(&self) -> Result<(), LockError>;

    /// Try to acquire the lock without waiting in line.
    ///
    /// Returns `Ok(true)` if acquired. Returns `Ok(false)` if another
    /// contender is ahead; a queue position taken for the attempt (the
    /// candidate node of [`DistributedLock`](super::DistributedLock)) is
    /// withdrawn before returning.
    fn try_lock(&self) -> Result<bool, LockError>;

    /// Release the lock.
    fn unlock(&self) -> Result<(), LockError>;
}
