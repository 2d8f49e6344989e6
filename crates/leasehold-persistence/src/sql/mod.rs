//! SQL lease storage (PostgreSQL/SQLite via SeaORM)
//!
//! `set_nx` is a single `INSERT ... ON CONFLICT DO UPDATE ... WHERE ... RETURNING`
//! statement: the database evaluates the expiry check and the write under one
//! row lock, so concurrent candidates cannot both take the lease. `get` and
//! `renew` are plain statements; the election re-validates ownership with
//! `get` after every `renew`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{prelude::Expr, *};
use tracing::debug;

use leasehold_core::Storage;

use crate::entity::leasehold_record;
use crate::error::PersistenceError;

const POSTGRES_SET_NX: &str = r#"INSERT INTO leasehold_record ("key", "value", "deadline") VALUES ($1, $2, $3)
ON CONFLICT ("key") DO UPDATE SET
    "value" = EXCLUDED."value",
    "deadline" = EXCLUDED."deadline"
WHERE leasehold_record."deadline" < $4
RETURNING "value""#;

const SQLITE_SET_NX: &str = r#"INSERT INTO leasehold_record ("key", "value", "deadline") VALUES (?, ?, ?)
ON CONFLICT ("key") DO UPDATE SET
    "value" = excluded."value",
    "deadline" = excluded."deadline"
WHERE leasehold_record."deadline" < ?
RETURNING "value""#;

/// Conditional upsert statement for `backend`
fn set_nx_sql(backend: DbBackend) -> Result<&'static str, PersistenceError> {
    match backend {
        DbBackend::Postgres => Ok(POSTGRES_SET_NX),
        DbBackend::Sqlite => Ok(SQLITE_SET_NX),
        other => Err(PersistenceError::UnsupportedBackend(other)),
    }
}

/// Lease storage over a relational database.
///
/// With SQLite and many candidates in one process, prefer a pool of a single
/// connection (`ConnectOptions::max_connections(1)`).
#[derive(Debug, Clone)]
pub struct SqlStorage {
    db: DatabaseConnection,
    set_nx_sql: &'static str,
}

impl SqlStorage {
    /// Create a storage on `db`; fails for backends without `ON CONFLICT ... RETURNING`
    pub fn new(db: DatabaseConnection) -> Result<Self, PersistenceError> {
        let set_nx_sql = set_nx_sql(db.get_database_backend())?;
        Ok(Self { db, set_nx_sql })
    }

    /// Get a reference to the underlying database connection
    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    /// Raw record under `key`, returned even when expired
    pub async fn record(&self, key: &str) -> Result<Option<leasehold_record::Model>, DbErr> {
        leasehold_record::Entity::find_by_id(key.to_string())
            .one(&self.db)
            .await
    }
}

#[async_trait]
impl Storage for SqlStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Utc::now().timestamp_millis();

        Ok(self
            .record(key)
            .await?
            .filter(|record| record.deadline >= now)
            .map(|record| record.holder))
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        deadline: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let now = Utc::now().timestamp_millis();
        let statement = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            self.set_nx_sql,
            [
                key.into(),
                value.into(),
                deadline.timestamp_millis().into(),
                now.into(),
            ],
        );

        let acquired = self.db.query_one(statement).await?.is_some();
        debug!(key, value, acquired, "conditional upsert");

        Ok(acquired)
    }

    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        leasehold_record::Entity::update_many()
            .col_expr(
                leasehold_record::Column::Deadline,
                Expr::value(deadline.timestamp_millis()),
            )
            .filter(leasehold_record::Column::Key.eq(key))
            .exec(&self.db)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_nx_sql_per_backend() {
        assert!(set_nx_sql(DbBackend::Postgres).unwrap().contains("$4"));
        assert!(set_nx_sql(DbBackend::Sqlite).unwrap().contains("?"));
        assert!(matches!(
            set_nx_sql(DbBackend::MySql),
            Err(PersistenceError::UnsupportedBackend(DbBackend::MySql))
        ));
    }

    #[test]
    fn test_set_nx_is_a_single_statement() {
        for backend in [DbBackend::Postgres, DbBackend::Sqlite] {
            let sql = set_nx_sql(backend).unwrap();
            assert_eq!(sql.matches("INSERT").count(), 1);
            assert!(sql.contains("ON CONFLICT"));
            assert!(sql.contains("RETURNING"));
            assert!(!sql.contains(';'));
        }
    }
}
