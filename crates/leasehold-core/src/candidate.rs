//! Candidate election state machine
//!
//! A candidate alternates between two phases:
//! - Following: try `set_nx` every `follow_rate` until the lease is acquired
//! - Leading: every `hold_rate`, `renew` the lease and confirm ownership with `get`
//!
//! Leadership is given up immediately when `get` reports another holder (or
//! none), and voluntarily after `errs_to_fallback` consecutive storage errors.
//! The task stops only when its cancellation token fires; the leader flag is
//! cleared on every exit path.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument::WithSubscriber;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::balancer::Balancer;
use crate::config::CandidateConfig;
use crate::metrics::{self, Phase};
use crate::storage::SharedStorage;

/// Why a candidate left the leading phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HoldExit {
    /// `get` returned another holder or no holder
    Mismatch,
    /// Too many consecutive storage errors
    Fallback,
    /// Cancellation fired while leading
    Cancelled,
}

impl HoldExit {
    fn as_str(self) -> &'static str {
        match self {
            HoldExit::Mismatch => "mismatch",
            HoldExit::Fallback => "fallback",
            HoldExit::Cancelled => "cancelled",
        }
    }
}

/// Outcome of a single renew-and-confirm cycle
enum Confirmation {
    Confirmed,
    Lost(Option<String>),
}

/// Handle to a running election participant.
///
/// The background task is spawned by [`Candidate::new`] and lives until the
/// cancellation token passed there is cancelled. Dropping the handle does not
/// stop the task.
///
/// # Example
///
/// ```ignore
/// let cancel = CancellationToken::new();
/// let candidate = Candidate::new(
///     &cancel,
///     storage,
///     CandidateConfig::new().with_key("notify-users"),
/// );
///
/// loop {
///     ticker.tick().await;
///     if candidate.is_leader() {
///         send_notifications().await;
///     }
/// }
/// ```
#[derive(Debug)]
pub struct Candidate {
    id: String,
    key: String,
    is_leader: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl Candidate {
    /// Create a candidate and start its election task.
    ///
    /// Never blocks; the candidate starts as a follower. Must be called from
    /// within a tokio runtime.
    pub fn new(cancel: &CancellationToken, storage: SharedStorage, config: CandidateConfig) -> Self {
        let is_leader = Arc::new(AtomicBool::new(false));
        let id = config.id.clone();
        let key = config.key.clone();
        let logger = config.logger.clone();

        config.balancer.register(&config.key);

        let election = Election {
            errs_to_fallback: config.effective_errs_to_fallback(),
            id: config.id,
            key: config.key,
            ttl: config.ttl,
            follow_rate: config.follow_rate,
            hold_rate: config.hold_rate,
            balancer: config.balancer,
            storage,
            cancel: cancel.clone(),
            is_leader: Arc::clone(&is_leader),
        };

        let task = tokio::spawn(
            async move {
                let span = info_span!("candidate", id = %election.id, key = %election.key);
                election.run().instrument(span).await;
            }
            .with_subscriber(logger),
        );

        Self {
            id,
            key,
            is_leader,
            task,
        }
    }

    /// Whether this candidate currently holds the lease
    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::Acquire)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Whether the election task has exited
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the election task to exit after cancellation
    pub async fn join(self) {
        if let Err(e) = self.task.await
            && e.is_panic()
        {
            error!(id = %self.id, key = %self.key, "election task panicked");
        }
    }
}

/// Clears the leader flag when the election task ends, however it ends
struct LeaderFlag {
    id: String,
    key: String,
    flag: Arc<AtomicBool>,
}

impl LeaderFlag {
    fn set(&self, leading: bool) {
        self.flag.store(leading, Ordering::Release);
        metrics::record_leadership(&self.key, &self.id, leading);
    }
}

impl Drop for LeaderFlag {
    fn drop(&mut self) {
        if self.flag.swap(false, Ordering::AcqRel) {
            metrics::record_leadership(&self.key, &self.id, false);
        }
    }
}

/// State owned by the election task
struct Election {
    id: String,
    key: String,
    ttl: Duration,
    follow_rate: Duration,
    hold_rate: Duration,
    errs_to_fallback: u32,
    balancer: Arc<dyn Balancer>,
    storage: SharedStorage,
    cancel: CancellationToken,
    is_leader: Arc<AtomicBool>,
}

impl Election {
    async fn run(self) {
        let flag = LeaderFlag {
            id: self.id.clone(),
            key: self.key.clone(),
            flag: Arc::clone(&self.is_leader),
        };

        self.follow(&flag).await;

        flag.set(false);
        debug!("election stopped");
    }

    async fn follow(&self, flag: &LeaderFlag) {
        debug!("following");

        loop {
            if self.balancer.can_be_leader() {
                debug!("try to set");

                let deadline = self.deadline();
                match self
                    .guarded(self.storage.set_nx(&self.key, &self.id, deadline))
                    .await
                {
                    None => return,
                    Some(Err(e)) => {
                        error!(error = %e, "can't setnx");
                        metrics::record_storage_error(&self.key, Phase::Follow);
                    }
                    Some(Ok(acquired)) => {
                        debug!(acquired, "setnx");

                        if acquired {
                            info!("we acquired leadership");
                            flag.set(true);
                            metrics::record_acquired(&self.key);

                            let exit = self.hold().await;
                            flag.set(false);
                            metrics::record_lost(&self.key, exit.as_str());

                            if exit == HoldExit::Cancelled {
                                return;
                            }
                        }
                    }
                }
            } else {
                debug!("balancer denied leadership attempt");
            }

            if !self.tick(self.follow_rate).await {
                return;
            }
        }
    }

    async fn hold(&self) -> HoldExit {
        let mut errors = 0u32;

        loop {
            match self.confirm().await {
                None => return HoldExit::Cancelled,
                Some(Ok(Confirmation::Confirmed)) => {
                    // A confirmed cycle forgives earlier transient errors
                    errors = 0;
                }
                Some(Ok(Confirmation::Lost(current))) => {
                    warn!(current = ?current, "we lost leadership");
                    return HoldExit::Mismatch;
                }
                Some(Err(e)) => {
                    errors += 1;
                    error!(error = %e, errors, "can't confirm leadership");
                    metrics::record_storage_error(&self.key, Phase::Hold);

                    if errors >= self.errs_to_fallback {
                        warn!(errors, "falling back after consecutive storage errors");
                        return HoldExit::Fallback;
                    }
                }
            }

            if !self.tick(self.hold_rate).await {
                return HoldExit::Cancelled;
            }
        }
    }

    /// Renew the lease, then read it back to confirm we still own it.
    ///
    /// The two calls stay separate: `renew` does not check ownership, so
    /// only the `get` that follows can prove the lease is ours.
    async fn confirm(&self) -> Option<anyhow::Result<Confirmation>> {
        let deadline = self.deadline();
        if let Err(e) = self.guarded(self.storage.renew(&self.key, deadline)).await? {
            return Some(Err(e.context("renew")));
        }

        let current = match self.guarded(self.storage.get(&self.key)).await? {
            Ok(current) => current,
            Err(e) => return Some(Err(e.context("get"))),
        };

        if current.as_deref() == Some(self.id.as_str()) {
            Some(Ok(Confirmation::Confirmed))
        } else {
            Some(Ok(Confirmation::Lost(current)))
        }
    }

    fn deadline(&self) -> DateTime<Utc> {
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        Utc::now()
            .checked_add_signed(ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Run a storage call unless cancellation fires first
    async fn guarded<T>(&self, call: impl Future<Output = T>) -> Option<T> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => None,
            result = call => Some(result),
        }
    }

    /// Wait one interval; returns false when cancellation fired instead
    async fn tick(&self, interval: Duration) -> bool {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            _ = tokio::time::sleep(interval) => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStorage;
    use crate::storage::Storage;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    fn fast_config(id: &str) -> CandidateConfig {
        CandidateConfig::new()
            .with_id(id)
            .with_ttl(Duration::from_millis(200))
            .with_follow_rate(Duration::from_millis(20))
            .with_hold_rate(Duration::from_millis(20))
    }

    /// Storage answering `renew`/`get` from a script of outcomes
    #[derive(Debug, Default)]
    struct ScriptedStorage {
        id: String,
        script: Mutex<VecDeque<bool>>,
        calls: AtomicUsize,
    }

    impl ScriptedStorage {
        /// `true` = successful cycle, `false` = failing renew
        fn new(id: &str, script: &[bool]) -> Self {
            Self {
                id: id.to_string(),
                script: Mutex::new(script.iter().copied().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Storage for ScriptedStorage {
        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(Some(self.id.clone()))
        }

        async fn set_nx(
            &self,
            _key: &str,
            _value: &str,
            _deadline: DateTime<Utc>,
        ) -> anyhow::Result<bool> {
            Ok(true)
        }

        async fn renew(&self, _key: &str, _deadline: DateTime<Utc>) -> anyhow::Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let ok = self.script.lock().pop_front().unwrap_or(true);
            if ok {
                Ok(())
            } else {
                Err(anyhow::anyhow!("node is down"))
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_single_candidate_acquires() {
        let cancel = CancellationToken::new();
        let storage = Arc::new(MemoryStorage::new());
        let candidate = Candidate::new(&cancel, storage.clone(), fast_config("node-1"));

        assert_eq!(candidate.id(), "node-1");
        assert_eq!(candidate.key(), "default");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(candidate.is_leader());
        assert_eq!(
            storage.get("default").await.unwrap(),
            Some("node-1".to_string())
        );

        cancel.cancel();
        candidate.join().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_leader_steps_down_when_lease_is_taken() {
        let cancel = CancellationToken::new();
        let storage = Arc::new(MemoryStorage::new());
        let candidate = Candidate::new(&cancel, storage.clone(), fast_config("node-1"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(candidate.is_leader());

        // Someone else overwrites the lease; the next get shows the mismatch
        storage.remove("default");
        assert!(
            storage
                .set_nx("default", "intruder", Utc::now() + chrono::Duration::seconds(10))
                .await
                .unwrap()
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!candidate.is_leader());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_errors_below_threshold_are_forgiven() {
        let cancel = CancellationToken::new();
        // Two failures, one success, two failures: never three in a row
        let storage = Arc::new(ScriptedStorage::new(
            "node-1",
            &[false, false, true, false, false, true],
        ));
        let candidate = Candidate::new(&cancel, storage.clone(), fast_config("node-1"));

        let mut observed_demotion = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if storage.calls.load(Ordering::SeqCst) >= 1 && !candidate.is_leader() {
                observed_demotion = true;
            }
        }

        assert!(storage.calls.load(Ordering::SeqCst) >= 6);
        assert!(!observed_demotion);
        assert!(candidate.is_leader());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_consecutive_errors_trigger_fallback() {
        let cancel = CancellationToken::new();
        let storage = Arc::new(ScriptedStorage::new("node-1", &[false; 3]));
        let candidate = Candidate::new(
            &cancel,
            storage.clone(),
            fast_config("node-1").with_follow_rate(Duration::from_secs(60)),
        );

        // Three failing renewals at 20ms intervals, then a long follow wait
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(storage.calls.load(Ordering::SeqCst), 3);
        assert!(!candidate.is_leader());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_zero_threshold_falls_back_on_first_error() {
        let cancel = CancellationToken::new();
        let storage = Arc::new(ScriptedStorage::new("node-1", &[false]));
        let candidate = Candidate::new(
            &cancel,
            storage.clone(),
            fast_config("node-1")
                .with_errs_to_fallback(0)
                .with_follow_rate(Duration::from_secs(60)),
        );

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(storage.calls.load(Ordering::SeqCst), 1);
        assert!(!candidate.is_leader());

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_while_leading_clears_flag() {
        let cancel = CancellationToken::new();
        let storage = Arc::new(MemoryStorage::new());
        let candidate = Candidate::new(&cancel, storage, fast_config("node-1"));

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(candidate.is_leader());

        cancel.cancel();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(!candidate.is_leader());
        assert!(candidate.is_finished());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_interrupts_hanging_storage() {
        #[derive(Debug)]
        struct HangingStorage;

        #[async_trait]
        impl Storage for HangingStorage {
            async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
                std::future::pending().await
            }

            async fn set_nx(
                &self,
                _key: &str,
                _value: &str,
                _deadline: DateTime<Utc>,
            ) -> anyhow::Result<bool> {
                Ok(true)
            }

            async fn renew(&self, _key: &str, _deadline: DateTime<Utc>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let cancel = CancellationToken::new();
        let candidate = Candidate::new(&cancel, Arc::new(HangingStorage), fast_config("node-1"));

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(candidate.is_leader());

        cancel.cancel();
        tokio::time::timeout(Duration::from_millis(100), candidate.join())
            .await
            .expect("task should stop while get is pending");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_denying_balancer_blocks_acquisition() {
        #[derive(Debug, Default)]
        struct DenyBalancer {
            registered: Mutex<Vec<String>>,
        }

        impl Balancer for DenyBalancer {
            fn register(&self, key: &str) {
                self.registered.lock().push(key.to_string());
            }

            fn can_be_leader(&self) -> bool {
                false
            }
        }

        let cancel = CancellationToken::new();
        let balancer = Arc::new(DenyBalancer::default());
        let storage = Arc::new(MemoryStorage::new());
        let candidate = Candidate::new(
            &cancel,
            storage.clone(),
            fast_config("node-1")
                .with_key("job")
                .with_balancer(balancer.clone()),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!candidate.is_leader());
        assert!(storage.is_empty());
        assert_eq!(*balancer.registered.lock(), vec!["job".to_string()]);

        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_injected_logger_receives_events() {
        use tracing_subscriber::Layer;
        use tracing_subscriber::layer::{Context, SubscriberExt};

        struct CountingLayer(Arc<AtomicUsize>);

        impl<S: tracing::Subscriber> Layer<S> for CountingLayer {
            fn on_event(&self, _event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }

        let events = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(CountingLayer(events.clone()));

        let cancel = CancellationToken::new();
        let candidate = Candidate::new(
            &cancel,
            Arc::new(MemoryStorage::new()),
            fast_config("node-1").with_logger(subscriber),
        );

        tokio::time::sleep(Duration::from_millis(60)).await;
        cancel.cancel();
        candidate.join().await;

        assert!(events.load(Ordering::SeqCst) > 0);
    }
}
