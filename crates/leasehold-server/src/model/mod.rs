pub mod config;

pub use self::config::{Cli, Configuration};
