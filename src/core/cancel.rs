//! Process-wide cancellation latch.
//!
//! A [`Cancellation`] is created once at process start, handed to the
//! signal handler, and passed explicitly into every blocking loop. It only
//! ever flips from `false` to `true`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One-shot cancellation token; clones share the same latch.
#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the latch. Returns `true` only for the call that flipped it.
    pub fn cancel(&self) -> bool {
        !self.flag.swap(true, Ordering::SeqCst)
    }

    /// Has shutdown been requested?
    ///
    /// Polled between loop iterations, never mid-I/O.
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Install the Ctrl+C / SIGTERM handler. Call once at program start.
///
/// The first signal sets the returned token and logs; later signals are
/// ignored so the graceful path is never interrupted.
pub fn setup_shutdown_handler() -> anyhow::Result<Cancellation> {
    let cancel = Cancellation::new();
    let handler_token = cancel.clone();

    ctrlc::set_handler(move || {
        if handler_token.cancel() {
            crate::log!("signal"; "shutting down...");
        }
    })
    .map_err(|e| anyhow::anyhow!("failed to set Ctrl+C handler: {}", e))?;

    Ok(cancel)
}
