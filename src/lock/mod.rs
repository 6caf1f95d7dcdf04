mod distributed;
mod error;
mod lock;
mod owner;

pub use distributed::DistributedLock;
pub use error::LockError;
pub use lock::Lock;
pub use owner::CandidateOwner;
