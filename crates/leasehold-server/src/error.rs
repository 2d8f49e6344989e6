//! Error types for the leasehold agent

use leasehold_persistence::PersistenceError;
use sea_orm::DbErr;

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("database error: {0}")]
    Database(#[from] DbErr),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for ServerError {
    fn from(value: config::ConfigError) -> Self {
        ServerError::Config(value.to_string())
    }
}
