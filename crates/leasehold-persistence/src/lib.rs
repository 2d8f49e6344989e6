//! Leasehold Persistence - relational lease storage
//!
//! This crate provides:
//! - SeaORM entity definition for the `leasehold_record` table
//! - Table creation
//! - `SqlStorage`, the `Storage` implementation for PostgreSQL and SQLite

pub mod entity;
pub mod error;
pub mod migration;
pub mod sql;

// Re-export sea-orm for convenience
pub use sea_orm;

pub use entity::prelude::*;
pub use error::PersistenceError;
pub use migration::create_table;
pub use sql::SqlStorage;
