//! Leadership admission extension point
//!
//! A balancer decides whether this node may attempt to acquire a lease at
//! all, e.g. to spread the leadership of many keys over many nodes. Only the
//! always-permit implementation ships today.

use std::fmt::Debug;

/// Leadership admission policy consulted by candidates
pub trait Balancer: Debug + Send + Sync {
    /// Register an election key this node participates in
    fn register(&self, key: &str);

    /// Whether this node is currently allowed to attempt leadership
    fn can_be_leader(&self) -> bool;
}

/// Balancer that performs no coordination and always permits leadership
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopBalancer;

impl Balancer for NoopBalancer {
    fn register(&self, _key: &str) {}

    fn can_be_leader(&self) -> bool {
        true
    }
}
