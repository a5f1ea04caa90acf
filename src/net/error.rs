//! Error taxonomy for the messaging fabric.

use std::io;

use thiserror::Error;

/// Errors raised by publishers, pushers, multiplexers and relays.
#[derive(Debug, Error)]
pub enum NetError {
    /// Address unavailable or malformed when binding. Fatal to startup.
    #[error("failed to bind `{addr}`")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// A connect address that cannot be parsed as `<host>:<port>`.
    #[error("invalid address `{0}`: expected <host>:<port>")]
    InvalidAddress(String),

    /// A pusher was opened without any peer to connect to.
    #[error("no connect addresses given")]
    NoPeers,

    /// Non-timeout socket failure; terminates the blocking loop.
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),

    /// Received message does not have the four-field topic shape.
    #[error("malformed topic: {0}")]
    MalformedTopic(String),

    /// Peer violated the wire protocol (bad greeting, oversize record).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Operation attempted after the component released its sockets.
    #[error("socket already closed")]
    Closed,
}

impl NetError {
    pub(crate) fn bind(addr: impl Into<String>, source: io::Error) -> Self {
        Self::Bind {
            addr: addr.into(),
            source,
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTopic(reason.into())
    }
}

/// Result alias for fabric operations.
pub type Result<T> = std::result::Result<T, NetError>;

/// Whether an I/O error is the ordinary "no data yet" outcome of a timed read.
pub(crate) fn is_timeout(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut | io::ErrorKind::Interrupted
    )
}
