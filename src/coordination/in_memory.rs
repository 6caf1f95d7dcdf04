//! In-memory coordination service for tests and single-process deployments.
//!
//! [`InMemoryCoordinator`] is a shared hierarchical namespace with the
//! semantics the lock recipe relies on:
//! - per-parent sequence counters for sequential nodes
//! - ephemeral nodes owned by a session and removed when it expires
//! - one-shot existence watches fired on create, delete and data change
//!
//! Each [`InMemorySession`] obtained from [`InMemoryCoordinator::connect`]
//! implements [`Coordinator`] and behaves like an independent client process.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::client::{join_path, parent_path, validate_path};
use super::sequence::format_sequence;
use super::{CoordinationError, Coordinator, Watch, WatchEvent, WatchSender};

type SessionId = u64;

struct Node {
    data: Vec<u8>,
    ephemeral_owner: Option<SessionId>,
    next_child_sequence: u64,
}

impl Node {
    fn new(data: Vec<u8>, ephemeral_owner: Option<SessionId>) -> Self {
        Node {
            data,
            ephemeral_owner,
            next_child_sequence: 0,
        }
    }
}

struct Watcher {
    session: SessionId,
    tx: WatchSender,
}

struct Namespace {
    nodes: BTreeMap<String, Node>,
    watches: HashMap<String, Vec<Watcher>>,
    next_session: SessionId,
    expired: HashSet<SessionId>,
    notifications: u64,
}

impl Namespace {
    fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(Vec::new(), None));
        Namespace {
            nodes,
            watches: HashMap::new(),
            next_session: 1,
            expired: HashSet::new(),
            notifications: 0,
        }
    }

    fn ensure_alive(&self, session: SessionId) -> Result<(), CoordinationError> {
        if self.expired.contains(&session) {
            Err(CoordinationError::SessionExpired)
        } else {
            Ok(())
        }
    }

    fn children_of(&self, parent: &str) -> Vec<String> {
        self.nodes
            .keys()
            .filter(|path| path.as_str() != "/" && parent_path(path) == Some(parent))
            .filter_map(|path| path.rsplit('/').next().map(str::to_string))
            .collect()
    }

    fn has_children(&self, path: &str) -> bool {
        self.nodes
            .keys()
            .any(|child| child.as_str() != "/" && parent_path(child) == Some(path))
    }

    /// Deliver `event` to every watcher of `path` and disarm them.
    fn fire(&mut self, path: &str, event: WatchEvent) {
        let Some(watchers) = self.watches.remove(path) else {
            return;
        };
        for watcher in watchers {
            if watcher.tx.send(event) {
                self.notifications += 1;
                trace!(path, ?event, session = watcher.session, "watch fired");
            }
        }
    }

    /// Drop watchers whose [`Watch`] the client has already discarded.
    ///
    /// A watch on a node that never reappears (a withdrawn sequential
    /// candidate) would otherwise stay registered forever.
    fn prune(&mut self) {
        self.watches.retain(|_, watchers| {
            watchers.retain(|watcher| !watcher.tx.is_abandoned());
            !watchers.is_empty()
        });
    }

    fn insert(
        &mut self,
        path: String,
        data: Vec<u8>,
        owner: Option<SessionId>,
    ) -> Result<(), CoordinationError> {
        if self.nodes.contains_key(&path) {
            return Err(CoordinationError::NodeExists(path));
        }
        self.nodes.insert(path.clone(), Node::new(data, owner));
        self.fire(&path, WatchEvent::NodeCreated);
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<(), CoordinationError> {
        if !self.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        if self.has_children(path) {
            return Err(CoordinationError::NotEmpty(path.to_string()));
        }
        self.nodes.remove(path);
        self.fire(path, WatchEvent::NodeDeleted);
        Ok(())
    }

    fn expire(&mut self, session: SessionId) {
        if !self.expired.insert(session) {
            return;
        }

        // The session's own watches learn about the expiry first.
        for watchers in self.watches.values_mut() {
            watchers.retain(|watcher| {
                if watcher.session == session {
                    watcher.tx.send(WatchEvent::SessionExpired);
                    false
                } else {
                    true
                }
            });
        }
        self.watches.retain(|_, watchers| !watchers.is_empty());

        let owned: Vec<String> = self
            .nodes
            .iter()
            .filter(|(_, node)| node.ephemeral_owner == Some(session))
            .map(|(path, _)| path.clone())
            .collect();
        for path in owned {
            self.nodes.remove(&path);
            self.fire(&path, WatchEvent::NodeDeleted);
        }
    }
}

/// Shared in-memory namespace. Cloning yields another handle to the same tree.
///
/// ## Example
///
/// ```
/// use global_lock::coordination::{Coordinator, InMemoryCoordinator};
///
/// let service = InMemoryCoordinator::new();
/// service.create_persistent("/locks", b"").unwrap();
///
/// let client = service.connect();
/// let name = client.create_sequential_ephemeral("/locks", "lock-", b"").unwrap();
/// assert_eq!(name, "lock-0000000000");
///
/// client.expire();
/// assert!(service.children("/locks").unwrap().is_empty());
/// ```
#[derive(Clone)]
pub struct InMemoryCoordinator {
    inner: Arc<Mutex<Namespace>>,
}

impl Default for InMemoryCoordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCoordinator {
    /// Create an empty namespace containing only `/`.
    pub fn new() -> Self {
        InMemoryCoordinator {
            inner: Arc::new(Mutex::new(Namespace::new())),
        }
    }

    // Every mutation leaves the namespace consistent before it can panic,
    // so a poisoned guard is still safe to use.
    fn namespace(&self) -> MutexGuard<'_, Namespace> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new client session.
    pub fn connect(&self) -> InMemorySession {
        let mut ns = self.namespace();
        let id = ns.next_session;
        ns.next_session += 1;
        InMemorySession {
            service: self.clone(),
            id,
        }
    }

    /// End `session`: its watches receive [`WatchEvent::SessionExpired`] and
    /// its ephemeral nodes are deleted.
    pub fn expire_session(&self, session: u64) {
        self.namespace().expire(session);
    }

    /// Create a persistent node. The parent must exist.
    pub fn create_persistent(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        validate_path(path)?;
        let parent = parent_path(path).ok_or_else(|| CoordinationError::NodeExists(path.to_string()))?;
        let mut ns = self.namespace();
        if !ns.nodes.contains_key(parent) {
            return Err(CoordinationError::NoNode(parent.to_string()));
        }
        ns.insert(path.to_string(), data.to_vec(), None)
    }

    /// Replace the data of `path`, firing its watches.
    pub fn set_data(&self, path: &str, data: &[u8]) -> Result<(), CoordinationError> {
        validate_path(path)?;
        let mut ns = self.namespace();
        let node = ns
            .nodes
            .get_mut(path)
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))?;
        node.data = data.to_vec();
        ns.fire(path, WatchEvent::NodeDataChanged);
        Ok(())
    }

    pub fn get_data(&self, path: &str) -> Result<Vec<u8>, CoordinationError> {
        validate_path(path)?;
        self.namespace()
            .nodes
            .get(path)
            .map(|node| node.data.clone())
            .ok_or_else(|| CoordinationError::NoNode(path.to_string()))
    }

    pub fn exists(&self, path: &str) -> bool {
        self.namespace().nodes.contains_key(path)
    }

    /// Children names of `path`, in name order.
    pub fn children(&self, path: &str) -> Result<Vec<String>, CoordinationError> {
        validate_path(path)?;
        let ns = self.namespace();
        if !ns.nodes.contains_key(path) {
            return Err(CoordinationError::NoNode(path.to_string()));
        }
        Ok(ns.children_of(path))
    }

    /// Delete `path` on behalf of the service (e.g. an operator cleaning up).
    pub fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        validate_path(path)?;
        self.namespace().remove(path)
    }

    /// Number of armed watches on `path` still held by a client.
    pub fn pending_watches(&self, path: &str) -> usize {
        let mut ns = self.namespace();
        ns.prune();
        ns.watches
            .get(path)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Number of armed watches across the namespace still held by a client.
    pub fn armed_watches(&self) -> usize {
        let mut ns = self.namespace();
        ns.prune();
        ns.watches.values().map(Vec::len).sum()
    }

    /// Total watch events delivered to live watchers so far.
    pub fn notifications(&self) -> u64 {
        self.namespace().notifications
    }
}

/// A client session on an [`InMemoryCoordinator`].
pub struct InMemorySession {
    service: InMemoryCoordinator,
    id: SessionId,
}

impl InMemorySession {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// End this session as if its connection had timed out.
    pub fn expire(&self) {
        self.service.expire_session(self.id);
    }

    pub fn is_expired(&self) -> bool {
        self.service.namespace().expired.contains(&self.id)
    }

    pub fn service(&self) -> &InMemoryCoordinator {
        &self.service
    }
}

impl Coordinator for InMemorySession {
    fn create_sequential_ephemeral(
        &self,
        parent: &str,
        prefix: &str,
        data: &[u8],
    ) -> Result<String, CoordinationError> {
        validate_path(parent)?;
        if prefix.contains('/') {
            return Err(CoordinationError::InvalidPath(join_path(parent, prefix)));
        }
        let mut ns = self.service.namespace();
        ns.ensure_alive(self.id)?;
        let parent_node = ns
            .nodes
            .get_mut(parent)
            .ok_or_else(|| CoordinationError::NoNode(parent.to_string()))?;
        let sequence = parent_node.next_child_sequence;
        parent_node.next_child_sequence += 1;

        let name = format_sequence(prefix, sequence);
        ns.insert(join_path(parent, &name), data.to_vec(), Some(self.id))?;
        Ok(name)
    }

    fn list_children(&self, parent: &str) -> Result<Vec<String>, CoordinationError> {
        validate_path(parent)?;
        let ns = self.service.namespace();
        ns.ensure_alive(self.id)?;
        if !ns.nodes.contains_key(parent) {
            return Err(CoordinationError::NoNode(parent.to_string()));
        }
        Ok(ns.children_of(parent))
    }

    fn watch_existence(&self, path: &str) -> Result<(bool, Watch), CoordinationError> {
        validate_path(path)?;
        let mut ns = self.service.namespace();
        ns.ensure_alive(self.id)?;
        ns.prune();
        let exists = ns.nodes.contains_key(path);
        let (tx, watch) = Watch::channel();
        ns.watches.entry(path.to_string()).or_default().push(Watcher {
            session: self.id,
            tx,
        });
        Ok((exists, watch))
    }

    fn delete(&self, path: &str) -> Result<(), CoordinationError> {
        validate_path(path)?;
        let mut ns = self.service.namespace();
        ns.ensure_alive(self.id)?;
        ns.remove(path)
    }
}
