//! Acquire path: minimum check, predecessor selection, watch fast path.

use std::thread;
use std::time::Duration;

use global_lock::coordination::{parse_sequence, Coordinator, WatchEvent};
use global_lock::{DistributedLock, LockError};

use crate::support::{node, service, wait_until, ROOT};

// ============================================================================
// Sole contender: no watch is ever registered
// ============================================================================

#[test]
fn sole_contender_acquires_without_watch() {
    let service = service();
    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);

    lock.acquire().unwrap();

    assert!(lock.is_held());
    assert_eq!(lock.node_name().as_deref(), Some("lock-0000000000"));
    assert_eq!(service.armed_watches(), 0);
    assert_eq!(service.notifications(), 0);
}

#[test]
fn non_sequential_children_are_not_queued() {
    let service = service();
    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);
    lock.acquire().unwrap();
    lock.release().unwrap();

    // A foreign, non-sequential child does not take part in the queue.
    service.create_persistent(&node("metadata"), b"").unwrap();

    lock.acquire().unwrap();
    assert!(lock.is_held());
    assert_eq!(service.armed_watches(), 0);
}

// ============================================================================
// Predecessor selection: watch the node directly ahead, never the holder
// ============================================================================

#[test]
fn waiter_watches_immediate_predecessor_not_holder() {
    let service = service();
    let other = service.connect();

    // Leave lock-0000000001 and lock-0000000003 behind.
    for _ in 0..4 {
        other.create_sequential_ephemeral(ROOT, "lock-", b"").unwrap();
    }
    other.delete(&node("lock-0000000000")).unwrap();
    other.delete(&node("lock-0000000002")).unwrap();

    // An unrelated observer already watches the holder.
    let (_, observer) = other.watch_existence(&node("lock-0000000001")).unwrap();

    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);

    thread::scope(|s| {
        let contender = s.spawn(|| lock.acquire());

        wait_until("contender to watch lock-0000000003", || {
            service.pending_watches(&node("lock-0000000003")) == 1
        });
        assert_eq!(lock.node_name().as_deref(), Some("lock-0000000004"));
        assert!(!lock.is_held());
        // Only the observer watches the holder.
        assert_eq!(service.pending_watches(&node("lock-0000000001")), 1);

        other.delete(&node("lock-0000000003")).unwrap();

        // The contender re-lists and now queues behind the holder.
        wait_until("contender to watch lock-0000000001", || {
            service.pending_watches(&node("lock-0000000001")) == 2
        });
        assert_eq!(
            observer.wait_timeout(Duration::from_millis(20)).unwrap(),
            None,
            "deleting lock-0000000003 must not wake the holder's watcher"
        );
        assert!(!lock.is_held());

        other.delete(&node("lock-0000000001")).unwrap();
        contender.join().unwrap().unwrap();
    });

    assert!(lock.is_held());
    assert_eq!(
        observer.wait_timeout(Duration::from_millis(20)).unwrap(),
        Some(WatchEvent::NodeDeleted)
    );
}

#[test]
fn predecessor_data_change_triggers_relist_not_acquire() {
    let service = service();
    let holder_session = service.connect();
    let holder = DistributedLock::new(&holder_session, ROOT);
    holder.acquire().unwrap();
    let holder_path = holder.node_path().unwrap();

    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);

    thread::scope(|s| {
        let waiter = s.spawn(|| lock.acquire());

        wait_until("waiter to watch the holder", || {
            service.pending_watches(&holder_path) == 1
        });
        // The watch fires without the holder leaving; the waiter must queue again.
        service.set_data(&holder_path, b"touched").unwrap();
        wait_until("waiter to re-arm its watch", || {
            service.pending_watches(&holder_path) == 1
        });
        assert!(!lock.is_held());

        holder.release().unwrap();
        waiter.join().unwrap().unwrap();
    });

    assert!(lock.is_held());
}

// ============================================================================
// Handle state rules
// ============================================================================

#[test]
fn acquire_while_acquiring_is_ambiguous() {
    let service = service();
    let holder_session = service.connect();
    let holder = DistributedLock::new(&holder_session, ROOT);
    holder.acquire().unwrap();

    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);

    thread::scope(|s| {
        let waiter = s.spawn(|| lock.acquire());
        wait_until("waiter to queue", || lock.node_name().is_some());

        let queued = lock.node_path().unwrap();
        assert_eq!(lock.acquire(), Err(LockError::AmbiguousState(queued)));
        // No second candidate was created.
        assert_eq!(service.children(ROOT).unwrap().len(), 2);

        holder.release().unwrap();
        waiter.join().unwrap().unwrap();
    });

    assert!(lock.is_held());
}

#[test]
fn reacquire_after_release_gets_larger_sequence() {
    let service = service();
    let session = service.connect();
    let lock = DistributedLock::new(&session, ROOT);

    lock.acquire().unwrap();
    let first = parse_sequence(&lock.node_name().unwrap()).unwrap();
    lock.release().unwrap();
    lock.acquire().unwrap();
    let second = parse_sequence(&lock.node_name().unwrap()).unwrap();

    assert!(second > first);
}
