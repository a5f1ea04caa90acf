//! Messaging fabric: topic protocol, sockets and the relay.
//!
//! # Socket roles
//!
//! | Component     | Direction | Binds / connects | Peer role  |
//! |---------------|-----------|------------------|------------|
//! | [`Publisher`] | outbound  | binds            | subscriber |
//! | [`Pusher`]    | outbound  | connects         | pull       |
//! | [`Inbound`]   | inbound   | pull binds, sub connects | pusher / publisher |
//!
//! Everything rides on plain TCP with the framing in [`wire`].

pub mod address;
pub(crate) mod conn;
pub mod error;
pub mod inbound;
pub mod publisher;
pub mod pusher;
pub mod relay;
pub mod topic;
pub mod wire;

use std::time::Duration;

pub use error::{NetError, Result};
pub use inbound::{Decoded, Inbound, LogHandler, RawHandler};
pub use publisher::Publisher;
pub use pusher::Pusher;
pub use relay::{Relay, RelayConfig};
pub use topic::{Kind, Message, Topic};
pub use wire::Multipart;

/// Default per-peer queue bound.
pub const DEFAULT_HWM: usize = 1000;

/// Tunables shared by every socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetOptions {
    /// Per-peer (and pending) queue bound.
    pub hwm: usize,
    /// Delay between connection attempts to an unreachable peer.
    pub reconnect_interval: Duration,
    /// Inbound poll interval; bounds cancellation latency.
    pub poll_interval: Duration,
}

impl Default for NetOptions {
    fn default() -> Self {
        Self {
            hwm: DEFAULT_HWM,
            reconnect_interval: Duration::from_millis(200),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl NetOptions {
    /// Same options with a different poll interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
pub(crate) mod testing;
