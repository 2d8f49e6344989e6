//! Main entry point for the leasehold agent.
//!
//! Joins the election for the configured key and runs the job on whichever
//! node currently holds the lease.

use std::sync::Arc;

use leasehold_core::{CancellationToken, Candidate, SharedStorage};
use leasehold_persistence::{SqlStorage, create_table};
use leasehold_server::{Configuration, job, startup};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let configuration = Configuration::new()?;

    let _logging_guard = startup::init_logging(&configuration.logging_config())?;
    leasehold_core::describe_metrics();

    let cancel = CancellationToken::new();
    startup::cancel_on_shutdown_signal(cancel.clone());

    let Some(db) = startup::run_until_cancelled(startup::connect(&configuration), &cancel).await
    else {
        info!("shutdown requested before the database was reachable");
        return Ok(());
    };
    let db = db?;
    create_table(&db).await?;

    let storage: SharedStorage = Arc::new(SqlStorage::new(db)?);

    let mut election = configuration.election_config()?;
    if configuration.election_log() {
        election = election.with_logger(tracing::dispatcher::get_default(|d| d.clone()));
    }

    let candidate = Candidate::new(&cancel, storage, election);
    info!(
        id = candidate.id(),
        key = candidate.key(),
        "joined election"
    );

    let key = candidate.key().to_string();
    let runs = job::run_leader_job(&candidate, configuration.job_interval()?, &cancel, || {
        let key = key.clone();
        async move {
            info!(key = %key, "leader job tick");
        }
    })
    .await;

    candidate.join().await;
    info!(runs, "leasehold agent stopped");

    Ok(())
}
