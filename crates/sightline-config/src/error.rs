//! Error type for config persistence.

use std::path::PathBuf;

/// Errors raised while loading or persisting `config.ron`.
///
/// Read/write/parse failures carry the offending path, since the config
/// directory is user-overridable via `--config` and the default location
/// differs per platform.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("could not read {}: {source}", path.display())]
    Read {
        /// Path of the unreadable file.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The config file or its directory could not be written.
    #[error("could not write {}: {source}", path.display())]
    Write {
        /// Path that could not be written.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The file's RON content did not parse as a `Config`.
    #[error("malformed config {}: {source}", path.display())]
    Malformed {
        /// Path of the rejected file.
        path: PathBuf,
        /// The parse error, with line/column.
        source: ron::error::SpannedError,
    },

    /// The in-memory config could not be serialized to RON.
    #[error("could not serialize config: {0}")]
    Serialize(#[from] ron::Error),
}
