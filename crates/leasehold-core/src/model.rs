//! Lease record data model

use chrono::{DateTime, Utc};

/// A lease stored under an election key.
///
/// The record lives in the shared backend; candidates never keep one in
/// memory beyond a single storage call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaseRecord {
    /// Election key (one record per key)
    pub key: String,
    /// Id of the candidate holding the lease
    pub value: String,
    /// Absolute instant after which the lease is expired
    pub deadline: DateTime<Utc>,
}

impl LeaseRecord {
    pub fn new(key: impl Into<String>, value: impl Into<String>, deadline: DateTime<Utc>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            deadline,
        }
    }

    /// A lease is expired once its deadline lies strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.deadline < now
    }

    /// Check if the lease has expired
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
