//! Herd-free distributed mutual exclusion over a coordination service.
//!
//! Contenders queue as ephemeral sequential children of a lock root. The
//! smallest sequence number holds the lock; everyone else watches only the
//! node directly ahead of it, so each release wakes exactly one waiter.
//!
//! ```
//! use global_lock::coordination::InMemoryCoordinator;
//! use global_lock::{DistributedLock, LockConfig};
//!
//! let service = InMemoryCoordinator::new();
//! service.create_persistent("/locks", b"").unwrap();
//! let session = service.connect();
//!
//! let config = LockConfig::from_json(r#"{ "root": "/locks", "owner": "worker-1" }"#).unwrap();
//! let lock = DistributedLock::from_config(&session, &config).unwrap();
//! lock.acquire().unwrap();
//! // critical section
//! lock.release().unwrap();
//! ```

mod config;
pub mod coordination;
mod lock;

pub use config::{ConfigError, LockConfig, DEFAULT_NODE_PREFIX};
pub use lock::{CandidateOwner, DistributedLock, Lock, LockError};
