//! Core types shared across the codebase.

mod cancel;

pub use cancel::{Cancellation, setup_shutdown_handler};
