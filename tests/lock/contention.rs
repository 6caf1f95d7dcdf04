//! Many contenders on one lock.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use global_lock::DistributedLock;

use crate::support::{service, wait_until, ROOT};

// ============================================================================
// Mutual exclusion
// ============================================================================

#[test]
fn at_most_one_holder_at_a_time() {
    let service = service();
    let holders = Arc::new(AtomicUsize::new(0));
    let max_seen = Arc::new(AtomicUsize::new(0));
    let rounds = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            let holders = holders.clone();
            let max_seen = max_seen.clone();
            let rounds = rounds.clone();
            thread::spawn(move || {
                let session = service.connect();
                let lock = DistributedLock::new(&session, ROOT);
                for _ in 0..5 {
                    lock.acquire().unwrap();
                    let now = holders.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_micros(200));
                    holders.fetch_sub(1, Ordering::SeqCst);
                    rounds.fetch_add(1, Ordering::SeqCst);
                    lock.release().unwrap();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    assert_eq!(rounds.load(Ordering::SeqCst), 40);
    assert!(service.children(ROOT).unwrap().is_empty());
}

// ============================================================================
// FIFO order and single-waiter wakeups
// ============================================================================

/// Queue `count` waiters behind an already held lock, one at a time, so their
/// creation order is known. Each waiter reports when it holds the lock and
/// releases only when told to.
struct Queue {
    acquired: mpsc::Receiver<usize>,
    release: Vec<mpsc::Sender<()>>,
    threads: Vec<thread::JoinHandle<()>>,
}

fn queue_waiters(service: &global_lock::coordination::InMemoryCoordinator, count: usize) -> Queue {
    let (acquired_tx, acquired) = mpsc::channel();
    let mut release = Vec::new();
    let mut threads = Vec::new();

    for id in 0..count {
        let watches_before = service.armed_watches();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let acquired_tx = acquired_tx.clone();
        let service_for_thread = service.clone();
        threads.push(thread::spawn(move || {
            let session = service_for_thread.connect();
            let lock = DistributedLock::new(&session, ROOT).with_owner(format!("waiter-{id}"));
            lock.acquire().unwrap();
            acquired_tx.send(id).unwrap();
            release_rx.recv().unwrap();
            lock.release().unwrap();
        }));
        release.push(release_tx);
        wait_until("waiter to watch its predecessor", || {
            service.armed_watches() == watches_before + 1
        });
    }

    Queue {
        acquired,
        release,
        threads,
    }
}

#[test]
fn waiters_acquire_in_creation_order() {
    let service = service();
    let session = service.connect();
    let first = DistributedLock::new(&session, ROOT);
    first.acquire().unwrap();

    let queue = queue_waiters(&service, 4);
    first.release().unwrap();

    let mut order = Vec::new();
    for _ in 0..4 {
        let id = queue.acquired.recv_timeout(Duration::from_secs(5)).unwrap();
        order.push(id);
        queue.release[id].send(()).unwrap();
    }
    for thread in queue.threads {
        thread.join().unwrap();
    }

    assert_eq!(order, vec![0, 1, 2, 3]);
}

#[test]
fn release_wakes_exactly_one_waiter() {
    let service = service();
    let session = service.connect();
    let holder = DistributedLock::new(&session, ROOT);
    holder.acquire().unwrap();

    let queue = queue_waiters(&service, 5);
    assert_eq!(service.armed_watches(), 5);
    let before = service.notifications();

    holder.release().unwrap();
    assert_eq!(queue.acquired.recv_timeout(Duration::from_secs(5)).unwrap(), 0);

    // One notification went out; the other four waiters still sleep on theirs.
    assert_eq!(service.notifications() - before, 1);
    assert_eq!(service.armed_watches(), 4);
    assert!(queue.acquired.recv_timeout(Duration::from_millis(20)).is_err());

    for id in 0..5 {
        if id > 0 {
            assert_eq!(queue.acquired.recv_timeout(Duration::from_secs(5)).unwrap(), id);
        }
        queue.release[id].send(()).unwrap();
    }
    for thread in queue.threads {
        thread.join().unwrap();
    }
    assert_eq!(service.notifications() - before, 5);
}

// ============================================================================
// Liveness
// ============================================================================

#[test]
fn every_contender_holds_exactly_once() {
    let service = service();
    let holds = Arc::new(Mutex::new(Vec::new()));

    let handles: Vec<_> = (0..10)
        .map(|id| {
            let service = service.clone();
            let holds = holds.clone();
            thread::spawn(move || {
                let session = service.connect();
                let lock = DistributedLock::new(&session, ROOT);
                lock.acquire().unwrap();
                holds.lock().unwrap().push(id);
                lock.release().unwrap();
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    let mut holds = holds.lock().unwrap().clone();
    holds.sort();
    assert_eq!(holds, (0..10).collect::<Vec<_>>());
}
