//! Command-line argument parsing.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;

/// Sightline command-line arguments.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "sightline", about = "Sightline multiplayer session")]
pub struct CliArgs {
    /// Server host to join.
    #[arg(long)]
    pub server: Option<String>,

    /// Server reliable port (datagram port is this + 1).
    #[arg(long)]
    pub port: Option<u16>,

    /// Handshake re-send interval in milliseconds.
    #[arg(long)]
    pub handshake_retry_ms: Option<u64>,

    /// Liveness timeout in seconds when hosting (0 disables eviction).
    #[arg(long)]
    pub liveness_timeout: Option<u32>,

    /// Maximum number of players when hosting.
    #[arg(long)]
    pub max_players: Option<u32>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if let Some(ref addr) = args.server {
            self.network.server_address = addr.clone();
        }
        if let Some(port) = args.port {
            self.network.server_port = port;
            self.hosting.bind_port = port;
        }
        if let Some(retry) = args.handshake_retry_ms {
            self.network.handshake_retry_ms = retry;
        }
        if let Some(timeout) = args.liveness_timeout {
            self.hosting.liveness_timeout_secs = timeout;
        }
        if let Some(max) = args.max_players {
            self.hosting.max_players = max;
        }
        if let Some(ref level) = args.log_level {
            self.logging.log_level = level.clone();
        }
    }
}
