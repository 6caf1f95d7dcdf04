use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, trace};

use super::{CandidateOwner, Lock, LockError};
use crate::config::{ConfigError, LockConfig, DEFAULT_NODE_PREFIX};
use crate::coordination::{
    join_path, predecessor_of, sort_by_sequence, CoordinationError, Coordinator, WatchEvent,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Phase {
    Idle,
    Creating,
    Queued(String),
    Held(String),
    /// Unusable. Keeps the candidate name while the node may still exist.
    Faulted(Option<String>),
}

struct HandleState {
    phase: Phase,
    /// An acquire or release is running on this handle.
    in_flight: bool,
}

/// Distributed mutual-exclusion lock over a coordination service.
///
/// Each contender creates an ephemeral sequential candidate node under the
/// lock root. The contender whose candidate has the smallest sequence number
/// holds the lock; every other contender watches only the candidate
/// immediately ahead of its own, so a release wakes exactly one waiter and
/// the lock is granted in creation (FIFO) order.
///
/// The handle borrows the session it runs on. Dropping a handle does not
/// release the lock; the candidate node lives until [`release`] or until the
/// session ends.
///
/// ## Example
///
/// ```
/// use global_lock::coordination::InMemoryCoordinator;
/// use global_lock::DistributedLock;
///
/// let service = InMemoryCoordinator::new();
/// service.create_persistent("/locks", b"").unwrap();
/// let session = service.connect();
///
/// let lock = DistributedLock::new(&session, "/locks");
/// lock.acquire().unwrap();
/// assert!(lock.is_held());
/// assert_eq!(lock.node_path().as_deref(), Some("/locks/lock-0000000000"));
///
/// lock.release().unwrap();
/// assert!(!lock.is_held());
/// ```
///
/// [`release`]: DistributedLock::release
pub struct DistributedLock<'s, C: Coordinator + ?Sized> {
    session: &'s C,
    root: String,
    prefix: String,
    owner: String,
    state: Mutex<HandleState>,
}

impl<'s, C: Coordinator + ?Sized> DistributedLock<'s, C> {
    /// Create an idle handle for the lock rooted at `root`.
    ///
    /// The root node must already exist; the handle never creates it.
    pub fn new(session: &'s C, root: impl Into<String>) -> Self {
        DistributedLock {
            session,
            root: root.into(),
            prefix: DEFAULT_NODE_PREFIX.to_string(),
            owner: CandidateOwner::process_label(),
            state: Mutex::new(HandleState {
                phase: Phase::Idle,
                in_flight: false,
            }),
        }
    }

    pub fn from_config(session: &'s C, config: &LockConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let lock = Self::new(session, config.root.clone()).with_prefix(config.node_prefix.clone());
        Ok(match &config.owner {
            Some(owner) => lock.with_owner(owner.clone()),
            None => lock,
        })
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = owner.into();
        self
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Name of this handle's candidate node, if it has one.
    pub fn node_name(&self) -> Option<String> {
        match self.phase() {
            Phase::Queued(name) | Phase::Held(name) | Phase::Faulted(Some(name)) => Some(name),
            _ => None,
        }
    }

    /// Full path of this handle's candidate node, if it has one.
    pub fn node_path(&self) -> Option<String> {
        self.node_name().map(|name| join_path(&self.root, &name))
    }

    pub fn is_held(&self) -> bool {
        matches!(self.phase(), Phase::Held(_))
    }

    pub fn is_faulted(&self) -> bool {
        matches!(self.phase(), Phase::Faulted(_))
    }

    /// Acquire the lock, blocking until every earlier candidate is gone.
    ///
    /// Returns immediately if this handle already holds the lock. On error the
    /// candidate node (if one was created) is left in place and the handle
    /// reports [`LockError::AmbiguousState`] on the next acquire; call
    /// [`release`](Self::release) to withdraw it. Errors for which
    /// [`LockError::is_fatal`] holds fault the handle instead.
    pub fn acquire(&self) -> Result<(), LockError> {
        self.acquire_until(None).map(|_| ())
    }

    /// Acquire the lock only if no other candidate is ahead.
    ///
    /// When another contender is queued first, the candidate node just
    /// created is deleted again and `Ok(false)` is returned.
    pub fn try_acquire(&self) -> Result<bool, LockError> {
        self.acquire_until(Some(Instant::now()))
    }

    /// Acquire the lock, giving up after `timeout`.
    ///
    /// On timeout the candidate node is deleted, the handle returns to idle
    /// and `Ok(false)` is returned. A timeout too large to represent as a
    /// deadline waits forever.
    pub fn acquire_timeout(&self, timeout: Duration) -> Result<bool, LockError> {
        self.acquire_until(Instant::now().checked_add(timeout))
    }

    /// Release the lock by deleting the candidate node.
    ///
    /// Also withdraws a candidate left behind by a failed acquire. If the
    /// delete fails the handle state is unchanged and the call may be retried.
    ///
    /// On a faulted handle the remaining candidate, if any, is deleted first
    /// and [`LockError::Faulted`] is still returned.
    pub fn release(&self) -> Result<(), LockError> {
        let (name, faulted) = {
            let mut state = self.lock_state()?;
            if state.in_flight {
                return Err(LockError::AmbiguousState(self.describe(&state.phase)));
            }
            let claimed = match &state.phase {
                Phase::Held(name) | Phase::Queued(name) => (name.clone(), false),
                Phase::Faulted(Some(name)) => (name.clone(), true),
                Phase::Idle | Phase::Creating => return Err(LockError::NotAcquired),
                Phase::Faulted(None) => return Err(LockError::Faulted),
            };
            state.in_flight = true;
            claimed
        };

        let path = join_path(&self.root, &name);
        match self.session.delete(&path) {
            Ok(()) => {}
            // Already gone, e.g. removed with an expired session.
            Err(CoordinationError::NoNode(_)) if faulted => {}
            Err(err) => {
                let phase = err.is_session_fatal().then_some(Phase::Faulted(None));
                self.finish(phase);
                return Err(err.into());
            }
        }

        if faulted {
            self.finish(Some(Phase::Faulted(None)));
            debug!(root = %self.root, node = %name, "faulted handle withdrew its candidate");
            return Err(LockError::Faulted);
        }
        self.finish(Some(Phase::Idle));
        debug!(root = %self.root, node = %name, "lock released");
        Ok(())
    }

    /// Shared body of the acquire variants. `deadline == None` waits forever.
    fn acquire_until(&self, deadline: Option<Instant>) -> Result<bool, LockError> {
        let payload = CandidateOwner::new(self.owner.as_str())
            .encode()
            .map_err(|e| LockError::Payload(e.to_string()))?;

        if self.begin_acquire()? {
            trace!(root = %self.root, "lock already held by this handle");
            return Ok(true);
        }

        let name = match self
            .session
            .create_sequential_ephemeral(&self.root, &self.prefix, &payload)
        {
            Ok(name) => name,
            Err(err) => {
                let phase = if err.is_session_fatal() {
                    Phase::Faulted(None)
                } else {
                    Phase::Idle
                };
                self.finish(Some(phase));
                return Err(err.into());
            }
        };
        debug!(root = %self.root, node = %name, "candidate node created");
        self.lock_state_or_recover().phase = Phase::Queued(name.clone());

        match self.wait_in_line(&name, deadline) {
            Ok(true) => {
                self.finish(Some(Phase::Held(name.clone())));
                debug!(root = %self.root, node = %name, "lock acquired");
                Ok(true)
            }
            Ok(false) => self.withdraw(&name),
            Err(err) => {
                let phase = match &err {
                    // The session took the candidate with it.
                    LockError::Coordination(inner) if inner.is_session_fatal() => {
                        Phase::Faulted(None)
                    }
                    // The candidate is still on the service; release removes it.
                    err if err.is_fatal() => Phase::Faulted(Some(name)),
                    _ => Phase::Queued(name),
                };
                self.finish(Some(phase));
                Err(err)
            }
        }
    }

    /// Claim the handle for an acquire. Returns `true` if it already holds the lock.
    fn begin_acquire(&self) -> Result<bool, LockError> {
        let mut state = self.lock_state()?;
        if state.phase == Phase::Idle && !state.in_flight {
            state.phase = Phase::Creating;
            state.in_flight = true;
            return Ok(false);
        }
        match (&state.phase, state.in_flight) {
            (Phase::Faulted(_), _) => Err(LockError::Faulted),
            (Phase::Held(_), false) => Ok(true),
            (phase, _) => Err(LockError::AmbiguousState(self.describe(phase))),
        }
    }

    /// Queue behind the immediate predecessor until this candidate is first.
    ///
    /// Returns `Ok(false)` once `deadline` has passed without the lock.
    fn wait_in_line(&self, name: &str, deadline: Option<Instant>) -> Result<bool, LockError> {
        loop {
            // A plain listing: watching the children would wake every waiter
            // on every change.
            let queue = sort_by_sequence(self.session.list_children(&self.root)?);

            let Some((_, first)) = queue.first() else {
                return Err(LockError::StateConsistency(format!(
                    "candidate node {} exists but {} has no children",
                    join_path(&self.root, name),
                    self.root
                )));
            };
            if first == name {
                return Ok(true);
            }

            let Some(predecessor) = predecessor_of(&queue, name) else {
                return Err(LockError::StateConsistency(format!(
                    "candidate node {} missing from children of {}",
                    join_path(&self.root, name),
                    self.root
                )));
            };

            if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                return Ok(false);
            }

            let predecessor_path = join_path(&self.root, predecessor);
            let (exists, watch) = self.session.watch_existence(&predecessor_path)?;
            if !exists {
                trace!(node = %name, predecessor = %predecessor, "predecessor already gone");
                continue;
            }
            debug!(node = %name, predecessor = %predecessor, position = queue.len(), "waiting on predecessor");

            let event = match deadline {
                None => watch.wait()?,
                Some(deadline) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    match watch.wait_timeout(remaining)? {
                        Some(event) => event,
                        None => return Ok(false),
                    }
                }
            };
            trace!(node = %name, predecessor = %predecessor, ?event, "predecessor watch fired");
            if event == WatchEvent::SessionExpired {
                return Err(CoordinationError::SessionExpired.into());
            }
        }
    }

    /// Delete a candidate that gave up waiting.
    fn withdraw(&self, name: &str) -> Result<bool, LockError> {
        let path = join_path(&self.root, name);
        match self.session.delete(&path) {
            Ok(()) => {
                self.finish(Some(Phase::Idle));
                debug!(root = %self.root, node = %name, "candidate withdrawn");
                Ok(false)
            }
            Err(err) => {
                let phase = if err.is_session_fatal() {
                    Phase::Faulted(None)
                } else {
                    Phase::Queued(name.to_string())
                };
                self.finish(Some(phase));
                Err(err.into())
            }
        }
    }

    /// End an in-flight operation, optionally moving to `phase`.
    fn finish(&self, phase: Option<Phase>) {
        let mut state = self.lock_state_or_recover();
        if let Some(phase) = phase {
            state.phase = phase;
        }
        state.in_flight = false;
    }

    fn describe(&self, phase: &Phase) -> String {
        match phase {
            Phase::Queued(name) | Phase::Held(name) => join_path(&self.root, name),
            _ => format!("{} (creation pending)", self.root),
        }
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, HandleState>, LockError> {
        self.state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))
    }

    // State updates are single assignments, so a poisoned guard still holds a
    // coherent state and bookkeeping must not be skipped.
    fn lock_state_or_recover(&self) -> MutexGuard<'_, HandleState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn phase(&self) -> Phase {
        self.lock_state_or_recover().phase.clone()
    }
}

impl<'s, C: Coordinator + ?Sized> Lock for DistributedLock<'s, C> {
    fn lock(&self) -> Result<(), LockError> {
        self.acquire()
    }

    fn try_lock(&self) -> Result<bool, LockError> {
        self.try_acquire()
    }

    fn unlock(&self) -> Result<(), LockError> {
        self.release()
    }
}
