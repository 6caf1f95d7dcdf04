use thiserror::Error;

use crate::coordination::CoordinationError;

/// Error type for lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The children listing contradicted this handle's own successful node
    /// creation (empty, or missing the candidate). The handle is faulted.
    #[error("lock state inconsistent: {0}")]
    StateConsistency(String),
    /// The handle already has a candidate node but does not hold the lock:
    /// an earlier acquire was interrupted or is still in flight.
    #[error("lock in ambiguous state: candidate node {0} exists but lock not obtained")]
    AmbiguousState(String),
    /// An operation against the coordination service failed.
    #[error("lock coordination failed: {0}")]
    Coordination(#[from] CoordinationError),
    /// Release was called on a handle without a candidate node.
    #[error("lock not acquired")]
    NotAcquired,
    /// The handle hit an unrecoverable failure earlier and must be discarded.
    #[error("lock handle faulted")]
    Faulted,
    /// The candidate node payload could not be encoded.
    #[error("lock payload encoding failed: {0}")]
    Payload(String),
    /// The mutex guarding the handle state was poisoned.
    #[error("lock poisoned: {0}")]
    Poisoned(String),
}

impl LockError {
    /// Whether the handle that produced this error can no longer be used.
    ///
    /// Inconsistent listings and an expired session both mean the handle's
    /// queue position is lost.
    pub fn is_fatal(&self) -> bool {
        match self {
            LockError::StateConsistency(_) | LockError::Faulted => true,
            LockError::Coordination(err) => err.is_session_fatal(),
            _ => false,
        }
    }
}
