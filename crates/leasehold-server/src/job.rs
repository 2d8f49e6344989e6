//! Leader-gated job loop

use std::future::Future;
use std::time::Duration;

use leasehold_core::{CancellationToken, Candidate};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Run `job` every `interval` while `candidate` leads, until `cancel` fires.
///
/// Followers skip the tick. Returns how many times the job ran.
pub async fn run_leader_job<F, Fut>(
    candidate: &Candidate,
    interval: Duration,
    cancel: &CancellationToken,
    mut job: F,
) -> u64
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut was_leader = false;
    let mut runs = 0;

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let leading = candidate.is_leader();
        if leading != was_leader {
            if leading {
                info!(id = candidate.id(), key = candidate.key(), "took over the job");
            } else {
                info!(id = candidate.id(), key = candidate.key(), "handed off the job");
            }
            was_leader = leading;
        }

        if !leading {
            continue;
        }

        debug!(key = candidate.key(), "running job");
        job().await;
        runs += 1;
    }

    runs
}
