//! Command-line interface module.

mod args;
pub mod common;
pub mod listen;
pub mod mock;
pub mod proxy;
pub mod watch;

pub use args::{Cli, Commands, CommonArgs, ListenArgs, MockArgs, ProxyArgs, WatchArgs};
