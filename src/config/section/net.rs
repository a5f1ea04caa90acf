//! `[net]` section configuration.
//!
//! # Example
//!
//! ```toml
//! [net]
//! interval_ms = 100     # Receive poll interval (cancellation latency)
//! hwm = 1000            # Per-peer queue bound
//! reconnect_ms = 200    # Delay between connection attempts
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::config::{ConfigDiagnostics, FieldPath};
use crate::net::{DEFAULT_HWM, NetOptions};

/// Socket tunables shared by every command.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Receive poll interval in milliseconds.
    pub interval_ms: u64,

    /// Messages queued per peer before new ones are dropped.
    pub hwm: usize,

    /// Reconnect delay in milliseconds.
    pub reconnect_ms: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            interval_ms: 100,
            hwm: DEFAULT_HWM,
            reconnect_ms: 200,
        }
    }
}

impl NetConfig {
    pub fn to_options(&self) -> NetOptions {
        NetOptions {
            hwm: self.hwm,
            reconnect_interval: Duration::from_millis(self.reconnect_ms),
            poll_interval: Duration::from_millis(self.interval_ms),
        }
    }

    pub fn validate(&self, diag: &mut ConfigDiagnostics) {
        if self.interval_ms == 0 {
            diag.error(FieldPath::new("net.interval_ms"), "must be greater than 0");
        }
        if self.hwm == 0 {
            diag.error_with_hint(
                FieldPath::new("net.hwm"),
                "must be greater than 0",
                "a zero bound would drop every message",
            );
        }
    }
}
