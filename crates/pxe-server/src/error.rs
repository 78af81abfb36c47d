//! PXE server errors
//!
//! The taxonomy follows how far a failure is allowed to travel:
//! - [`ParseError`] is absorbed where it happens; the request continues with defaults.
//! - [`BackendError`] and [`Rejection`] end a single request with a protocol-specific answer.
//! - [`TftpError`] aborts a single transfer.
//! - [`ListenerError`] ends a listener task and is surfaced by the supervisor as [`PxeError`].

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

/// Malformed identity or trace data extracted from a request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Remote address could not be split into IP and port
    #[error("invalid remote address {0:?}")]
    RemoteAddr(String),

    /// Hardware address candidate is not a MAC address
    #[error("invalid MAC address {0:?}")]
    Mac(String),

    /// Trace id group matched the filename grammar but is not a valid trace id
    #[error("parsing trace id {0:?} failed")]
    TraceId(String),

    /// Span id group matched the filename grammar but is not a valid span id
    #[error("parsing span id {0:?} failed")]
    SpanId(String),
}

/// Failures reported by an admission backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// No hardware record matches the client identity
    #[error("not found: {0}")]
    NotFound(String),

    /// Backend could not be reached or answered with an error
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// A hardware record exists but cannot be interpreted
    #[error("invalid hardware record: {0}")]
    InvalidRecord(String),

    /// The request was abandoned because the server is shutting down
    #[error("request cancelled by shutdown")]
    Cancelled,
}

/// Why a boot request was not served.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// The authoritative lookup failed; the request is denied (fail-closed)
    #[error("error talking with backend: {0}")]
    Backend(#[from] BackendError),

    /// The backend answered that this client may not PXE boot
    #[error("not allowed")]
    PolicyDenied,

    /// The client was admitted but asked for an artifact that does not exist
    #[error("unknown file {0:?}")]
    NotFound(String),
}

/// Wire-level TFTP failures. These abort one transfer and are never retried.
#[derive(Debug, Error)]
pub enum TftpError {
    /// Datagram could not be decoded as a TFTP packet
    #[error("invalid TFTP packet: {0}")]
    InvalidPacket(String),

    /// Socket error while transferring
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Client stopped acknowledging blocks
    #[error("transfer of {filename} timed out after {retries} retries")]
    Timeout { filename: String, retries: u32 },

    /// Client sent an ERROR packet
    #[error("transfer aborted by client: {reason}")]
    Aborted { reason: String },
}

/// Failures that terminate a listener task.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Listening socket could not be bound
    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Listening socket failed after it was bound
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Listener returned although nobody asked it to stop
    #[error("listener stopped unexpectedly")]
    Stopped,

    /// Listener task panicked
    #[error("listener task panicked: {0}")]
    Panicked(String),
}

/// Protocol served by a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tftp,
    Http,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tftp => f.write_str("tftp"),
            Protocol::Http => f.write_str("http"),
        }
    }
}

/// Errors returned by [`crate::PxeServer::serve`].
#[derive(Debug, Error)]
pub enum PxeError {
    /// A listener failed; annotated with the protocol that produced it
    #[error("{protocol} error: {source}")]
    Listener {
        protocol: Protocol,
        #[source]
        source: ListenerError,
    },

    /// A listener did not finish its graceful shutdown in time
    #[error("{protocol} listener did not stop within {timeout:?}")]
    ShutdownTimeout { protocol: Protocol, timeout: Duration },
}

impl PxeError {
    /// Protocol of the listener that produced this error.
    pub fn protocol(&self) -> Protocol {
        match self {
            PxeError::Listener { protocol, .. } | PxeError::ShutdownTimeout { protocol, .. } => {
                *protocol
            }
        }
    }
}
