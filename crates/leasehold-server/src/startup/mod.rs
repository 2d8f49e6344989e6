//! Agent startup: logging, shutdown signals and database connection

pub mod database;
pub mod logging;
pub mod shutdown;

pub use database::connect;
pub use logging::{LoggingConfig, LoggingGuard, init_logging};
pub use shutdown::{cancel_on_shutdown_signal, run_until_cancelled};
