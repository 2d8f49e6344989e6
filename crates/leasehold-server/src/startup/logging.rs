//! Process-wide logging
//!
//! Console output is always on. When a log directory is configured, every
//! event is also written to a daily rotated `leasehold.log` in that directory.
//! `RUST_LOG` takes precedence over the configured level on both outputs.

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::error::ServerError;

pub const LOG_FILE_NAME: &str = "leasehold.log";

/// Logging configuration for the agent
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Directory for `leasehold.log`; console only when unset
    pub log_dir: Option<PathBuf>,
    pub level: Level,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: None,
            level: Level::INFO,
        }
    }
}

impl LoggingConfig {
    /// Create from application configuration. Unknown levels fall back to INFO.
    pub fn from_config(log_dir: Option<String>, level: String) -> Self {
        Self {
            log_dir: log_dir.filter(|d| !d.is_empty()).map(PathBuf::from),
            level: level.parse().unwrap_or(Level::INFO),
        }
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.level.to_string()))
    }
}

/// Keeps the file writer alive; buffered output is flushed on drop
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// Fails when a global subscriber is already set or the log directory cannot
/// be created.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, ServerError> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    let mut file_guard = None;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_thread_names(true)
        .with_filter(config.filter());
    layers.push(Box::new(console_layer));

    if let Some(log_dir) = &config.log_dir {
        std::fs::create_dir_all(log_dir)?;

        let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, LOG_FILE_NAME);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        file_guard = Some(guard);

        let file_layer = fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_thread_names(true)
            .with_ansi(false)
            .with_filter(config.filter());
        layers.push(Box::new(file_layer));
    }

    Registry::default()
        .with(layers)
        .try_init()
        .map_err(|e| ServerError::Logging(e.to_string()))?;

    if let Some(log_dir) = &config.log_dir {
        tracing::info!(log_dir = %log_dir.display(), "file logging initialized");
    }

    Ok(LoggingGuard {
        _file_guard: file_guard,
    })
}
