//! Database connection pool

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};

use crate::error::ServerError;
use crate::model::Configuration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the pool configured under `db.*`.
///
/// SQLite pools keep their connections open so an in-memory database
/// survives for the life of the process.
pub async fn connect(configuration: &Configuration) -> Result<DatabaseConnection, ServerError> {
    let url = configuration.db_url();
    let max_connections = configuration.db_max_connections()?;
    let min_connections = if configuration.is_sqlite() {
        max_connections
    } else {
        1
    };

    let mut opt = ConnectOptions::new(url);
    opt.max_connections(max_connections)
        .min_connections(min_connections)
        .connect_timeout(CONNECT_TIMEOUT)
        .sqlx_logging(false);

    tracing::info!(
        max_connections = max_connections,
        min_connections = min_connections,
        "database connection pool configured"
    );

    Ok(Database::connect(opt).await?)
}
