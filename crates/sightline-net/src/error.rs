//! Error types for the codec and transports.

/// Errors produced while decoding a wire message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before the expected payload did.
    #[error("truncated payload: needed {needed} more byte(s) at offset {offset}")]
    Truncated {
        /// Read position at which the shortfall was detected.
        offset: usize,
        /// How many further bytes the read required.
        needed: usize,
    },

    /// The one-byte message tag is not in the catalogue.
    #[error("unknown message tag {0:#04x}")]
    UnknownTag(u8),

    /// An update record carried an unknown update-kind byte.
    #[error("unknown update kind {0:#04x}")]
    UnknownUpdateKind(u8),

    /// A decoded message was empty (zero bytes).
    #[error("empty packet")]
    Empty,
}

/// Errors surfaced by the transport pair.
///
/// Bind failures are fatal at startup; everything else is returned from the
/// per-tick polls so one bad packet or peer cannot stop the session loop.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// Failed to bind a socket at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound.
        addr: std::net::SocketAddr,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// Failed to initiate an outbound reliable connection.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        /// The address that could not be reached.
        addr: std::net::SocketAddr,
        /// The underlying OS error.
        source: std::io::Error,
    },

    /// An encoded frame exceeds the maximum the channel will carry.
    #[error("frame of {size} bytes exceeds maximum {max}")]
    FrameTooLarge {
        /// The offending frame size.
        size: usize,
        /// The configured maximum.
        max: usize,
    },

    /// The message addressed a reliable connection that no longer exists.
    #[error("no such connection: {0}")]
    UnknownConnection(u64),

    /// A send was attempted before the outbound connect completed.
    #[error("reliable channel is not connected")]
    NotConnected,

    /// An I/O error on an established channel.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
