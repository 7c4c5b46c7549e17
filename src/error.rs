use thiserror::Error;

/// Errors that can terminate a session.
///
/// The handshake surfaces these synchronously to `connect`; once the
/// message loop is running, an error marks the session failed and is
/// returned by the next call the application makes.
#[derive(Debug, Error)]
pub enum Error {
    /// The transport hit EOF or was reset while reading or writing.
    #[error("transport closed")]
    TransportClosed,

    /// The server refused the connection at security negotiation.
    #[error("handshake rejected: {0}")]
    HandshakeRejected(String),

    /// None of the security types on offer fit the supplied credentials.
    #[error("no acceptable authentication method")]
    AuthUnsupported,

    /// The server rejected the credentials after the auth exchange.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A message was malformed, used an unknown encoding, or had
    /// inconsistent lengths.
    #[error("protocol error: {0}")]
    ProtocolError(&'static str),

    /// A cryptographic operation failed (DH public key out of range,
    /// decrypt failure).
    #[error("crypto error: {0}")]
    CryptoError(&'static str),

    /// Lower-level I/O failure not covered by the above.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Maps an unexpected-EOF read into the specific `TransportClosed` kind
/// instead of the generic `Io` passthrough.
pub(crate) fn map_read_err(err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        Error::TransportClosed
    } else {
        Error::Io(err)
    }
}

/// Maps a broken-pipe/connection-reset write error into `TransportClosed`,
/// the write-side counterpart of [`map_read_err`] (spec §7: "`TransportClosed`
/// during a write surfaces to the caller" just as it does for a read).
pub(crate) fn map_write_err(err: std::io::Error) -> Error {
    match err.kind() {
        std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::ConnectionReset | std::io::ErrorKind::UnexpectedEof => {
            Error::TransportClosed
        }
        _ => Error::Io(err),
    }
}
