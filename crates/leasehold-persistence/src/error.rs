//! Error types for the relational lease storage

use sea_orm::{DbBackend, DbErr};

#[derive(thiserror::Error, Debug)]
pub enum PersistenceError {
    #[error("database backend {0:?} does not support atomic conditional upsert")]
    UnsupportedBackend(DbBackend),

    #[error("database error: {0}")]
    Database(#[from] DbErr),
}
