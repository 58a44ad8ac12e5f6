use thiserror::Error;
use tokio::time::error::Elapsed;

/// Possible errors for the package.
#[derive(Error, Debug)]
pub enum RconError {
    /// Returned if the declared packet size is smaller than the fixed part of
    /// a packet (id, type and terminator).
    #[error("invalid packet size: {0}")]
    InvalidPacketSize(i32),
    /// Returned if a payload is too long for the signed 32-bit size field.
    #[error("payload of {0} bytes does not fit in a packet")]
    PacketTooLarge(usize),
    /// Returned if the connection ended before a whole packet was read. The
    /// protocol cannot resynchronize, so this is always fatal for the socket.
    #[error("packet {section} truncated")]
    TruncatedPacket {
        section: &'static str,
        #[source]
        source: std::io::Error,
    },
    /// Returned if the host is down or behind a firewall.
    #[error("host cannot be reached")]
    UnreachableHost(#[source] std::io::Error),
    /// The stream was successfully established, but there was a problem
    /// writing to the socket.
    #[error("cannot send message to host")]
    SendError(#[source] std::io::Error),
    /// The stream was successfully established, but there was a problem
    /// reading from the socket.
    #[error("cannot receive response from host")]
    ReceiveError(#[source] std::io::Error),
    /// Internal guard for an exchange attempted without a socket. Public
    /// calls reconnect first, so this never reaches callers.
    #[error("not connected")]
    NotConnected,
    /// Returned if you can't remember the password.
    #[error("bad password")]
    AuthenticationError,
    /// Returned if the server did not respond in time.
    #[error("timeout")]
    TimeoutError(#[from] Elapsed),
}
