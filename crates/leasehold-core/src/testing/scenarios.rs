//! Election scenarios shared by every backend's test suite
//!
//! All scenarios use a 200ms ttl and 50ms follow/hold rates, and each one
//! expects an empty backend for the default key.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::OutageStorage;
use crate::candidate::Candidate;
use crate::config::CandidateConfig;
use crate::storage::SharedStorage;

pub const TTL: Duration = Duration::from_millis(200);
pub const RATE: Duration = Duration::from_millis(50);

/// Configuration used by every scenario
pub fn scenario_config() -> CandidateConfig {
    CandidateConfig::new()
        .with_ttl(TTL)
        .with_follow_rate(RATE)
        .with_hold_rate(RATE)
}

fn count_leaders<'a>(candidates: impl IntoIterator<Item = &'a Candidate>) -> usize {
    candidates.into_iter().filter(|c| c.is_leader()).count()
}

/// Two candidates hand leadership back and forth as their storage goes down.
pub async fn general(storage: SharedStorage) {
    let cancel = CancellationToken::new();

    let stor1 = OutageStorage::new(storage.clone());
    let stor2 = OutageStorage::new(storage);

    // Launch the first candidate
    let cand1 = Candidate::new(&cancel, Arc::new(stor1.clone()), scenario_config());

    sleep(Duration::from_millis(100)).await;

    // Launch the second candidate
    let cand2 = Candidate::new(&cancel, Arc::new(stor2.clone()), scenario_config());

    // first already got leadership
    assert!(cand1.is_leader());
    assert!(!cand2.is_leader());

    sleep(Duration::from_millis(300)).await;

    assert!(cand1.is_leader());
    assert!(!cand2.is_leader());

    // first candidate hangs, it will lose leadership
    stor1.shutdown(Duration::from_millis(300));
    sleep(Duration::from_millis(350)).await;

    assert!(!cand1.is_leader());
    assert!(cand2.is_leader());

    // vice-versa
    stor2.shutdown(Duration::from_millis(300));
    sleep(Duration::from_millis(350)).await;

    assert!(cand1.is_leader());
    assert!(!cand2.is_leader());

    cancel.cancel();
    sleep(Duration::from_millis(100)).await;

    // both must exit and release the leadership after cancellation
    assert!(!cand1.is_leader());
    assert!(!cand2.is_leader());
}

/// Exactly one of `count` candidates leads, and none after cancellation.
pub async fn many_candidates(storage: SharedStorage, count: usize) {
    let cancel = CancellationToken::new();

    let candidates: Vec<Candidate> = (0..count)
        .map(|_| Candidate::new(&cancel, storage.clone(), scenario_config()))
        .collect();

    sleep(Duration::from_millis(100)).await;

    assert_eq!(count_leaders(&candidates), 1, "only one candidate is leader");

    cancel.cancel();
    sleep(Duration::from_millis(100)).await;

    assert_eq!(
        count_leaders(&candidates),
        0,
        "no leaders after cancellation"
    );
}

/// A worker runs its job only while its candidate leads
struct Worker {
    candidate: Candidate,
    storage: OutageStorage,
}

impl Worker {
    fn run(&self, counter: &AtomicUsize) {
        if !self.candidate.is_leader() {
            return;
        }
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Leader-only jobs run exactly once per round, move to another worker when
/// the leader loses its storage, and stop after cancellation.
pub async fn many_workers(storage: SharedStorage, count: usize) {
    let cancel = CancellationToken::new();
    let counter = AtomicUsize::new(0);

    let workers: Vec<Worker> = (0..count)
        .map(|_| {
            let wrapped = OutageStorage::new(storage.clone());
            Worker {
                candidate: Candidate::new(&cancel, Arc::new(wrapped.clone()), scenario_config()),
                storage: wrapped,
            }
        })
        .collect();

    sleep(Duration::from_millis(100)).await;

    // only one worker will launch
    for worker in &workers {
        worker.run(&counter);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // if we shut down the leader worker, another worker will continue the work
    let leader = workers
        .iter()
        .position(|w| w.candidate.is_leader())
        .expect("a leader must exist");
    workers[leader].storage.shutdown(Duration::from_secs(5));

    // fallback (3 x 50ms) + lease expiry (200ms) + one follow tick, with slack
    sleep(Duration::from_millis(500)).await;

    counter.store(0, Ordering::SeqCst);
    for worker in &workers {
        worker.run(&counter);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    // doublecheck that the previous leader will not run the job
    counter.store(0, Ordering::SeqCst);
    workers[leader].run(&counter);
    assert_eq!(counter.load(Ordering::SeqCst), 0);

    // if we cancel, no worker will run
    cancel.cancel();
    sleep(Duration::from_millis(100)).await;

    counter.store(0, Ordering::SeqCst);
    for worker in &workers {
        worker.run(&counter);
    }
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}
