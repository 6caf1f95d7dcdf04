//! Coordination service client abstraction.
//!
//! The lock recipe consumes exactly four operations from a hierarchical,
//! watch-capable coordination service:
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    DistributedLock                            │
//! │  acquire() / try_acquire() / acquire_timeout() / release()   │
//! └──────────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Coordinator trait                          │
//! │  create_sequential_ephemeral / list_children                  │
//! │  watch_existence / delete                                     │
//! └──────────────────────────────────────────────────────────────┘
//!          │                                  │
//!          ▼                                  ▼
//! ┌─────────────────────┐          ┌─────────────────────────────┐
//! │ InMemoryCoordinator │          │ ZooKeeper / etcd client     │
//! │     (included)      │          │        (external)           │
//! └─────────────────────┘          └─────────────────────────────┘
//! ```

mod client;
mod error;
mod in_memory;
mod sequence;

pub use client::{join_path, parent_path, validate_path, Coordinator, Watch, WatchEvent, WatchSender};
pub use error::CoordinationError;
pub use in_memory::{InMemoryCoordinator, InMemorySession};
pub use sequence::{format_sequence, parse_sequence, predecessor_of, sort_by_sequence, SEQUENCE_WIDTH};
