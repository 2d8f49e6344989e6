//! Leasehold Server - agent that runs a job on the elected node only
//!
//! This crate provides:
//! - Layered configuration (YAML file, environment, command line)
//! - Logging and shutdown signal setup
//! - The leader-gated job loop

pub mod error;
pub mod job;
pub mod model;
pub mod startup;

pub use error::ServerError;
pub use model::{Cli, Configuration};
