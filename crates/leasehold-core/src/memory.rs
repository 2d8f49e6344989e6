//! In-memory storage backend
//!
//! Reference implementation of the storage contract for candidates living in
//! one process. The conditional upsert of `set_nx` runs while holding the
//! map's entry lock for the key, so concurrent callers are serialized.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::model::LeaseRecord;
use crate::storage::Storage;

/// Lease storage backed by a concurrent hash map
#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    records: Arc<DashMap<String, LeaseRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records held, expired ones included
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Raw record under `key`, returned even when expired
    pub fn record(&self, key: &str) -> Option<LeaseRecord> {
        self.records.get(key).map(|r| r.value().clone())
    }

    /// Drop the record under `key`
    pub fn remove(&self, key: &str) -> Option<LeaseRecord> {
        self.records.remove(key).map(|(_, record)| record)
    }

    fn set_nx_at(&self, key: &str, value: &str, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self.records.entry(key.to_string()) {
            Entry::Vacant(entry) => {
                entry.insert(LeaseRecord::new(key, value, deadline));
                true
            }
            Entry::Occupied(mut entry) => {
                if !entry.get().is_expired_at(now) {
                    return false;
                }
                let record = entry.get_mut();
                record.value = value.to_string();
                record.deadline = deadline;
                true
            }
        }
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let now = Utc::now();
        Ok(self
            .records
            .get(key)
            .filter(|record| !record.is_expired_at(now))
            .map(|record| record.value.clone()))
    }

    async fn set_nx(
        &self,
        key: &str,
        value: &str,
        deadline: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        Ok(self.set_nx_at(key, value, deadline, Utc::now()))
    }

    async fn renew(&self, key: &str, deadline: DateTime<Utc>) -> anyhow::Result<()> {
        if let Some(mut record) = self.records.get_mut(key) {
            record.deadline = deadline;
        }
        Ok(())
    }
}
