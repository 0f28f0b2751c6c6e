//! Session-level error types.

use sightline_net::{NetError, PlayerGuid};

/// Errors surfaced by the per-tick session drivers.
///
/// Bind/connect failures propagate out of session construction and are
/// fatal; everything returned from a `tick` is informational — the caller
/// may keep ticking.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// A transport fault.
    #[error(transparent)]
    Net(#[from] NetError),

    /// A configured host string did not parse as an IP address.
    #[error("invalid host address {addr:?}")]
    InvalidAddress {
        /// The string taken from the config file.
        addr: String,
        /// The underlying parse error.
        source: std::net::AddrParseError,
    },

    /// The server refused our registration (duplicate guid or connection).
    #[error("server rejected registration for {guid}")]
    RegistrationRejected {
        /// The identity the server turned away.
        guid: PlayerGuid,
    },

    /// The reliable connection to the server dropped.
    #[error("reliable connection to the server was lost")]
    ConnectionLost,
}
