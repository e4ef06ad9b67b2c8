//! Connection error types and handling

use std::io;
use std::net::SocketAddr;
use thiserror::Error;

/// Connection error types for the ingestion listener and sessions
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Listening socket could not be bound
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: io::Error,
    },
    /// Accepting a new connection failed
    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),
    /// Socket options could not be applied
    #[error("failed to configure socket: {0}")]
    Configure(#[source] io::Error),
    /// Reading from the producer failed
    #[error("read from {peer} failed: {source}")]
    Read {
        peer: String,
        #[source]
        source: io::Error,
    },
}

/// Result type for connection operations
pub type ConnectionResult<T> = Result<T, ConnectionError>;

/// Recovery strategy for connection failures
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecoveryStrategy {
    /// Wait and then retry the accept
    RetryWithDelay { delay_ms: u32 },
    /// End the session and wait for a new producer
    ReturnToAccept,
    /// Fail permanently
    Fail,
}

impl ConnectionError {
    pub fn read(peer: impl ToString, source: io::Error) -> Self {
        ConnectionError::Read {
            peer: peer.to_string(),
            source,
        }
    }

    /// Get the recommended recovery strategy for this error
    pub fn recovery_strategy(&self) -> RecoveryStrategy {
        match self {
            ConnectionError::Bind { .. } => RecoveryStrategy::Fail,
            ConnectionError::Accept(_) => RecoveryStrategy::RetryWithDelay { delay_ms: 100 },
            ConnectionError::Configure(_) => RecoveryStrategy::ReturnToAccept,
            ConnectionError::Read { .. } => RecoveryStrategy::ReturnToAccept,
        }
    }

    /// Check if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.recovery_strategy(), RecoveryStrategy::Fail)
    }
}

/// Whether an I/O error only means "no data yet" on a socket with a read timeout
pub(crate) fn is_transient(error: &io::Error) -> bool {
    matches!(
        error.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}

/// Peer address for log messages, tolerating sockets that lost theirs
pub(crate) fn peer_label(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string()).unwrap_or_else(|| "unknown peer".to_string())
}
