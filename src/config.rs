//! Transport deadlines for a [Client](crate::client::Client).
//!
//! The protocol itself has no timeouts. Every deadline defaults to `None`,
//! which leaves the call waiting for as long as the socket does.

use std::future::Future;
use std::time::Duration;

use tokio::time::timeout;

use crate::error::RconError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientConfig {
    /// Limit for opening the TCP connection.
    pub connect_timeout: Option<Duration>,
    /// Limit for reading one packet.
    pub read_timeout: Option<Duration>,
    /// Limit for writing and flushing one packet.
    pub write_timeout: Option<Duration>,
}

impl ClientConfig {
    pub fn with_connect_timeout(mut self, limit: Duration) -> Self {
        self.connect_timeout = Some(limit);
        self
    }

    pub fn with_read_timeout(mut self, limit: Duration) -> Self {
        self.read_timeout = Some(limit);
        self
    }

    pub fn with_write_timeout(mut self, limit: Duration) -> Self {
        self.write_timeout = Some(limit);
        self
    }
}

/// Runs `operation`, failing with [RconError::TimeoutError] if `limit` is set
/// and elapses first.
pub(crate) async fn with_deadline<T, F>(limit: Option<Duration>, operation: F) -> Result<T, RconError>
where
    F: Future<Output = Result<T, RconError>>,
{
    match limit {
        Some(limit) => timeout(limit, operation).await?,
        None => operation.await,
    }
}
