//! Configuration management for the leasehold agent
//!
//! Sources, lowest precedence first:
//! - `conf/leasehold.yml` (or the file given with `--config`), optional
//! - `LEASEHOLD_<SECTION>__<KEY>` environment variables
//! - command line arguments

use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment};
use leasehold_core::CandidateConfig;
use leasehold_core::config::{
    DEFAULT_ERRS_TO_FALLBACK, DEFAULT_FOLLOW_RATE, DEFAULT_HOLD_RATE, DEFAULT_KEY, DEFAULT_TTL,
};

use crate::error::ServerError;
use crate::startup::LoggingConfig;

pub const DEFAULT_CONFIG_FILE: &str = "conf/leasehold.yml";
pub const DEFAULT_DB_URL: &str = "sqlite::memory:";
pub const DEFAULT_JOB_INTERVAL_MS: u64 = 1000;

/// Command line arguments for the agent
#[derive(Debug, Default, Parser)]
#[command(name = "leasehold", about = "Run a job on exactly one node of a fleet")]
pub struct Cli {
    /// Configuration file
    #[arg(short = 'c', long = "config")]
    pub config: Option<String>,
    /// Database URL (postgres://... or sqlite:...)
    #[arg(long = "db-url", env = "DATABASE_URL")]
    pub database_url: Option<String>,
    /// Election key
    #[arg(short = 'k', long = "key")]
    pub key: Option<String>,
    /// Candidate id written into the lease
    #[arg(long = "id")]
    pub id: Option<String>,
}

/// Agent configuration loaded from config file, environment and arguments
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Load configuration using the process arguments
    pub fn new() -> Result<Self, ServerError> {
        Self::from_cli(Cli::parse())
    }

    pub fn from_cli(args: Cli) -> Result<Self, ServerError> {
        let file = args.config.as_deref().unwrap_or(DEFAULT_CONFIG_FILE);

        let mut config_builder = Config::builder()
            .add_source(config::File::with_name(file).required(args.config.is_some()))
            .add_source(
                Environment::with_prefix("LEASEHOLD")
                    .separator("__")
                    .try_parsing(true),
            );

        if let Some(v) = args.database_url {
            config_builder = config_builder.set_override("db.url", v)?;
        }
        if let Some(v) = args.key {
            config_builder = config_builder.set_override("election.key", v)?;
        }
        if let Some(v) = args.id {
            config_builder = config_builder.set_override("election.id", v)?;
        }

        Ok(Self::from_config(config_builder.build()?))
    }

    pub fn from_config(config: Config) -> Self {
        Configuration { config }
    }

    // ========================================================================
    // Database Configuration
    // ========================================================================

    pub fn db_url(&self) -> String {
        self.config
            .get_string("db.url")
            .unwrap_or(DEFAULT_DB_URL.to_string())
    }

    pub fn is_sqlite(&self) -> bool {
        self.db_url().starts_with("sqlite:")
    }

    /// Pool size; SQLite defaults to a single connection
    pub fn db_max_connections(&self) -> Result<u32, ServerError> {
        let default = if self.is_sqlite() { 1 } else { 10 };
        let value = self.get_u64("db.max_connections", default)?;
        u32::try_from(value)
            .map_err(|_| ServerError::Config(format!("db.max_connections out of range: {value}")))
    }

    // ========================================================================
    // Election Configuration
    // ========================================================================

    pub fn election_key(&self) -> String {
        self.config
            .get_string("election.key")
            .unwrap_or(DEFAULT_KEY.to_string())
    }

    pub fn election_id(&self) -> Option<String> {
        self.config.get_string("election.id").ok()
    }

    /// Whether the candidate logs to the process subscriber
    pub fn election_log(&self) -> bool {
        self.config.get_bool("election.log").unwrap_or(true)
    }

    /// Candidate options; the logger is left silent
    pub fn election_config(&self) -> Result<CandidateConfig, ServerError> {
        let mut candidate = CandidateConfig::new()
            .with_key(self.election_key())
            .with_ttl(self.get_millis("election.ttl_ms", DEFAULT_TTL)?)
            .with_follow_rate(self.get_interval("election.follow_rate_ms", DEFAULT_FOLLOW_RATE)?)
            .with_hold_rate(self.get_interval("election.hold_rate_ms", DEFAULT_HOLD_RATE)?);

        let errs = self.get_u64("election.errs_to_fallback", DEFAULT_ERRS_TO_FALLBACK.into())?;
        candidate = candidate.with_errs_to_fallback(u32::try_from(errs).unwrap_or(u32::MAX));

        if let Some(id) = self.election_id() {
            candidate = candidate.with_id(id);
        }

        Ok(candidate)
    }

    // ========================================================================
    // Job Configuration
    // ========================================================================

    pub fn job_interval(&self) -> Result<Duration, ServerError> {
        self.get_interval(
            "job.interval_ms",
            Duration::from_millis(DEFAULT_JOB_INTERVAL_MS),
        )
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig::from_config(
            self.config.get_string("logging.dir").ok(),
            self.config
                .get_string("logging.level")
                .unwrap_or("info".to_string()),
        )
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn get_u64(&self, key: &str, default: u64) -> Result<u64, ServerError> {
        match self.config.get_int(key) {
            Ok(v) => u64::try_from(v)
                .map_err(|_| ServerError::Config(format!("{key} must not be negative, got {v}"))),
            Err(ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(e.into()),
        }
    }

    fn get_millis(&self, key: &str, default: Duration) -> Result<Duration, ServerError> {
        let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
        self.get_u64(key, default_ms).map(Duration::from_millis)
    }

    /// Like `get_millis`, but zero is rejected
    fn get_interval(&self, key: &str, default: Duration) -> Result<Duration, ServerError> {
        let interval = self.get_millis(key, default)?;
        if interval.is_zero() {
            return Err(ServerError::Config(format!("{key} must be greater than zero")));
        }
        Ok(interval)
    }
}
