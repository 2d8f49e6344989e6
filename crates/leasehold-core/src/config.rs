// Candidate configuration
// Every option is independently defaulted and fixed once the candidate is built

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::Dispatch;
use tracing::subscriber::NoSubscriber;

use crate::balancer::{Balancer, NoopBalancer};

/// Default election key
pub const DEFAULT_KEY: &str = "default";
/// Default lease time-to-live
pub const DEFAULT_TTL: Duration = Duration::from_secs(10);
/// Default poll interval while following
pub const DEFAULT_FOLLOW_RATE: Duration = Duration::from_secs(2);
/// Default poll interval while leading
pub const DEFAULT_HOLD_RATE: Duration = Duration::from_secs(2);
/// Default number of consecutive hold errors before falling back
pub const DEFAULT_ERRS_TO_FALLBACK: u32 = 3;

/// Generate a random unique candidate id (UUID v4)
pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Configuration for a [`Candidate`](crate::Candidate)
#[derive(Clone)]
pub struct CandidateConfig {
    /// Identity written into the lease when leadership is acquired.
    /// Must differ between candidates sharing a key (default: random UUID v4)
    pub id: String,

    /// Key the lease is stored under. Distinct keys are independent elections,
    /// e.g. one per background job (default: "default")
    pub key: String,

    /// Duration added to the current time for every acquire and renew (default: 10s)
    pub ttl: Duration,

    /// Interval between acquisition attempts while following (default: 2s)
    pub follow_rate: Duration,

    /// Interval between renewals while leading (default: 2s)
    pub hold_rate: Duration,

    /// Consecutive storage errors tolerated while leading before stepping down.
    /// Zero is treated as one (default: 3)
    pub errs_to_fallback: u32,

    /// Tracing dispatcher the candidate's task logs to (default: silent)
    pub logger: Dispatch,

    /// Leadership admission policy (default: always permit)
    pub balancer: Arc<dyn Balancer>,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            id: generate_id(),
            key: DEFAULT_KEY.to_string(),
            ttl: DEFAULT_TTL,
            follow_rate: DEFAULT_FOLLOW_RATE,
            hold_rate: DEFAULT_HOLD_RATE,
            errs_to_fallback: DEFAULT_ERRS_TO_FALLBACK,
            logger: Dispatch::new(NoSubscriber::default()),
            balancer: Arc::new(NoopBalancer),
        }
    }
}

impl fmt::Debug for CandidateConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CandidateConfig")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("ttl", &self.ttl)
            .field("follow_rate", &self.follow_rate)
            .field("hold_rate", &self.hold_rate)
            .field("errs_to_fallback", &self.errs_to_fallback)
            .field("balancer", &self.balancer)
            .finish_non_exhaustive()
    }
}

impl CandidateConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_follow_rate(mut self, rate: Duration) -> Self {
        self.follow_rate = rate;
        self
    }

    pub fn with_hold_rate(mut self, rate: Duration) -> Self {
        self.hold_rate = rate;
        self
    }

    pub fn with_errs_to_fallback(mut self, count: u32) -> Self {
        self.errs_to_fallback = count;
        self
    }

    /// Route the candidate's logs to `logger`.
    ///
    /// In most deployments the election should stay silent; pass the
    /// process-wide dispatcher (`tracing::dispatcher::get_default`) to debug it.
    pub fn with_logger(mut self, logger: impl Into<Dispatch>) -> Self {
        self.logger = logger.into();
        self
    }

    pub fn with_balancer(mut self, balancer: Arc<dyn Balancer>) -> Self {
        self.balancer = balancer;
        self
    }

    /// Fallback threshold with non-positive values raised to one
    pub fn effective_errs_to_fallback(&self) -> u32 {
        self.errs_to_fallback.max(1)
    }
}
