//! Test support for election backends
//!
//! - `OutageStorage`: wraps a backend and fails every call while an outage is active
//! - `scenarios`: the election scenarios every backend must pass

pub mod scenarios;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::storage::{SharedStorage, Storage};

/// Storage wrapper simulating a node that cannot reach the backend
#[derive(Clone)]
pub struct OutageStorage {
    inner: SharedStorage,
    down_until: Arc<Mutex<Option<Instant>>>,
}

impl OutageStorage {
    pub fn new(inner: SharedStorage) -> Self {
        Self {
            inner,
            down_until: Arc::new(Mutex::new(None)),
        }
    }

    /// Fail every call for the next `duration`
    pub fn shutdown(&self, duration: Duration) {
        let mut down_until = self.down_until.lock();
        *down_until = Some(Instant::now() + duration);
    }

    /// End the current outage early
    pub fn restore(&self) {
        let mut down_until = self.down_until.lock();
        *down_until = None;
    }

    pub fn is_down(&self) -> bool {
        let down_until = self.down_until.lock();
        matches!(*down_until, Some(until) if Instant::now() < until)
    }

    fn check(&self) -> anyhow::Result<()> {
        if self.is_down() {
            anyhow::bail!("node is down");
        }
        Ok(())
    }
}

#[async_trait]
impl Storage for OutageStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        deadline: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        self.check()?;
        self.inner.set_nx(key, value, deadline).await
    }

    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        self.check()?;
        self.inner.renew(key, deadline).await
    }
}
