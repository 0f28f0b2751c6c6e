//! Configuration system for the Sightline multiplayer stack.
//!
//! Runtime-configurable settings persisted to disk as RON files, with CLI
//! overrides via clap, hot-reload detection, and forward/backward
//! compatible serialization.

mod cli;
mod config;
mod error;

pub use cli::CliArgs;
pub use config::{Config, HostingConfig, LoggingConfig, NetworkConfig, default_config_dir};
pub use error::ConfigError;
