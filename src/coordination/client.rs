use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Weak};
use std::time::Duration;

use super::CoordinationError;

/// What happened to a watched node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    NodeCreated,
    NodeDeleted,
    NodeDataChanged,
    /// The watching session ended before the node changed.
    SessionExpired,
}

/// One-shot change notification returned by [`Coordinator::watch_existence`].
///
/// A watch fires at most once. Consuming it with [`Watch::wait`] blocks the
/// calling thread until the service delivers the event; there is no polling.
#[derive(Debug)]
pub struct Watch {
    rx: Receiver<WatchEvent>,
    _alive: Arc<()>,
}

/// Service side of a [`Watch`].
#[derive(Debug)]
pub struct WatchSender {
    tx: Sender<WatchEvent>,
    alive: Weak<()>,
}

impl WatchSender {
    /// Deliver `event`. Returns `false` if the watch was already dropped.
    pub fn send(&self, event: WatchEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    /// The client dropped its [`Watch`]; nobody can observe this sender.
    pub fn is_abandoned(&self) -> bool {
        self.alive.strong_count() == 0
    }
}

impl Watch {
    /// Create a watch together with the sender the service uses to fire it.
    pub fn channel() -> (WatchSender, Watch) {
        let (tx, rx) = mpsc::channel();
        let alive = Arc::new(());
        let sender = WatchSender {
            tx,
            alive: Arc::downgrade(&alive),
        };
        (sender, Watch { rx, _alive: alive })
    }

    /// Block until the watch fires.
    ///
    /// A dropped sender means the client can no longer deliver events for
    /// this session, which is reported as [`CoordinationError::ConnectionLoss`].
    pub fn wait(self) -> Result<WatchEvent, CoordinationError> {
        self.rx.recv().map_err(|_| CoordinationError::ConnectionLoss)
    }

    /// Block until the watch fires or `timeout` elapses.
    ///
    /// Returns `Ok(None)` on timeout; the watch stays armed and can be waited
    /// on again.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<Option<WatchEvent>, CoordinationError> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => Err(CoordinationError::ConnectionLoss),
        }
    }
}

/// The four coordination service operations the lock recipe is built on.
///
/// Implementations wrap a live session of a hierarchical, watch-capable
/// service (ZooKeeper-style). Session establishment, ACLs and RPC retries
/// belong to the implementation, not to the lock.
pub trait Coordinator: Send + Sync {
    /// Create an ephemeral node under `parent` named `prefix` followed by a
    /// service-assigned, monotonically increasing sequence suffix.
    ///
    /// Returns the name (last path segment) of the created node. The node is
    /// removed by the service when this session ends.
    fn create_sequential_ephemeral(
        &self,
        parent: &str,
        prefix: &str,
        data: &[u8],
    ) -> Result<String, CoordinationError>;

    /// Point-in-time listing of the children names of `parent`. Sets no watch.
    fn list_children(&self, parent: &str) -> Result<Vec<String>, CoordinationError>;

    /// Report whether `path` exists and arm a one-shot watch on it.
    fn watch_existence(&self, path: &str) -> Result<(bool, Watch), CoordinationError>;

    /// Delete `path` regardless of its version.
    fn delete(&self, path: &str) -> Result<(), CoordinationError>;
}

/// Check that `path` is absolute, has no empty segments and no trailing `/`.
///
/// The namespace root `/` is valid.
pub fn validate_path(path: &str) -> Result<(), CoordinationError> {
    if path == "/" {
        return Ok(());
    }
    let valid = path.starts_with('/')
        && !path.ends_with('/')
        && path[1..].split('/').all(|segment| !segment.is_empty());
    if valid {
        Ok(())
    } else {
        Err(CoordinationError::InvalidPath(path.to_string()))
    }
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{}", name)
    } else {
        format!("{}/{}", parent, name)
    }
}

/// Parent path of `path`, or `None` for the namespace root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}
