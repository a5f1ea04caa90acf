//! Configuration section definitions.
//!
//! | Module | TOML Section | Purpose                          |
//! |--------|--------------|----------------------------------|
//! | `net`  | `[net]`      | Poll interval, HWM, reconnect    |
//!
//! `[[rules]]` entries deserialize straight into [`crate::rules::RuleConfig`].

mod net;

pub use net::NetConfig;
