//! Graceful shutdown handling
//!
//! Ctrl+C or SIGTERM cancels the agent's root token; the candidate and the
//! job loop both stop when it fires.

use leasehold_core::CancellationToken;
use tracing::{error, info};

/// Cancel `token` on the first Ctrl+C or SIGTERM.
///
/// Returns immediately; the signal handlers run on a background task.
pub fn cancel_on_shutdown_signal(token: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to install Ctrl+C handler: {e}");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("failed to install SIGTERM handler: {e}");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("received Ctrl+C, shutting down");
            }
            _ = terminate => {
                info!("received SIGTERM, shutting down");
            }
            _ = token.cancelled() => {
                return;
            }
        }

        token.cancel();
    });
}

/// Run a future until it completes or `token` is cancelled
pub async fn run_until_cancelled<F, T>(future: F, token: &CancellationToken) -> Option<T>
where
    F: std::future::Future<Output = T>,
{
    tokio::select! {
        result = future => Some(result),
        _ = token.cancelled() => None,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_run_until_cancelled() {
        let token = CancellationToken::new();

        let task = async {
            tokio::time::sleep(Duration::from_secs(10)).await;
            42
        };

        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        assert!(run_until_cancelled(task, &token).await.is_none());
    }

    #[tokio::test]
    async fn test_run_until_cancelled_completes() {
        let token = CancellationToken::new();
        assert_eq!(run_until_cancelled(async { 7 }, &token).await, Some(7));
    }
}
