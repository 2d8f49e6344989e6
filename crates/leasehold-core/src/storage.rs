//! Storage contract shared by every election backend
//!
//! A backend is reachable by all candidates of an election and must provide:
//! - `get`: read a live lease, treating expired leases as absent
//! - `set_nx`: atomic conditional create-or-overwrite-if-expired
//! - `renew`: unconditional deadline update
//!
//! The at-most-one-leader guarantee rests entirely on `set_nx` being a single
//! indivisible operation on the backend. A read followed by a separate write
//! is not a valid implementation.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Shared handle to a storage backend
pub type SharedStorage = Arc<dyn Storage>;

/// Generic access to the data storage shared between candidates.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Get the value stored under `key`.
    ///
    /// Returns `None` when the record was never created or is expired.
    /// Errors are reserved for transport or backend failures.
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;

    /// Create the record under `key`, or overwrite it when the stored deadline
    /// has already passed.
    ///
    /// Returns `true` when the write took effect. A live record is left
    /// untouched and `false` is returned.
    async fn set_nx(&self, key: &str, value: &str, deadline: DateTime<Utc>)
    -> anyhow::Result<bool>;

    /// Set a new deadline on the record under `key`.
    ///
    /// Does nothing when the record does not exist. Ownership is not checked;
    /// callers confirm it with a following `get`.
    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()>;
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Arc<S> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        deadline: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        (**self).set_nx(key, value, deadline).await
    }

    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        (**self).renew(key, deadline).await
    }
}

#[async_trait]
impl<S: Storage + ?Sized> Storage for Box<S> {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        (**self).get(key).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        deadline: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        (**self).set_nx(key, value, deadline).await
    }

    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        (**self).renew(key, deadline).await
    }
}
