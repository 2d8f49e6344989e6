//! Leasehold Core - storage agnostic leader election
//!
//! This crate provides:
//! - The `Storage` contract an election backend implements
//! - `MemoryStorage`, an in-process reference backend
//! - `Candidate`, the election state machine that acquires and holds a lease
//! - `CandidateConfig` with the election options and their defaults
//! - The `Balancer` extension point
//!
//! Candidates sharing a backend and a key never talk to each other; the
//! backend's atomic `set_nx` is what keeps at most one of them leading.

pub mod balancer;
pub mod candidate;
pub mod config;
pub mod memory;
pub mod metrics;
pub mod model;
pub mod storage;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use balancer::{Balancer, NoopBalancer};
pub use candidate::Candidate;
pub use config::{CandidateConfig, generate_id};
pub use memory::MemoryStorage;
pub use crate::metrics::describe_metrics;
pub use model::LeaseRecord;
pub use storage::{SharedStorage, Storage};

// Re-export the cancellation token candidates are bound to
pub use tokio_util::sync::CancellationToken;
