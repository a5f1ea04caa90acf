//! Command-line interface definitions.

use clap::{ColorChoice, Parser, Subcommand};
use std::path::PathBuf;

/// Default publish address for `watch`.
pub const WATCH_BIND: &str = "127.0.0.1:9000";
/// Default pull address for `listen`.
pub const LISTEN_BIND: &str = "127.0.0.1:9001";
/// Default backend (pull) address for `proxy`.
pub const PROXY_BACKEND_BIND: &str = "127.0.0.1:9010";
/// Default frontend (publish) address for `proxy`.
pub const PROXY_FRONTEND_BIND: &str = "127.0.0.1:9011";

/// Ship log lines between machines
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None, arg_required_else_help = true)]
pub struct Cli {
    /// Control colored output (auto, always, never)
    #[arg(long, global = true, default_value = "auto")]
    pub color: ColorChoice,

    /// Config file path (missing file = defaults)
    #[arg(short = 'C', long, default_value = "logmesh.toml", value_hint = clap::ValueHint::FilePath)]
    pub config: PathBuf,

    /// subcommands
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Follow files and publish and/or push their new lines
    #[command(visible_alias = "w")]
    Watch {
        #[command(flatten)]
        args: WatchArgs,
    },

    /// Receive lines and print them
    #[command(visible_alias = "l")]
    Listen {
        #[command(flatten)]
        args: ListenArgs,
    },

    /// Relay messages from a backend to a frontend
    #[command(visible_alias = "p")]
    Proxy {
        #[command(flatten)]
        args: ProxyArgs,
    },

    /// Append random log lines to files
    #[command(visible_alias = "m")]
    Mock {
        #[command(flatten)]
        args: MockArgs,
    },
}

/// Arguments every command accepts.
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Enable verbose output for debugging
    #[arg(short = 'V', long)]
    pub verbose: bool,
}

/// Watch command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct WatchArgs {
    /// Glob pattern of files to follow (quote it to stop the shell expanding it)
    #[arg(value_name = "GLOB")]
    pub glob: String,

    /// Publish on this address (default: 127.0.0.1:9000 when no -c is given)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Push to this address (repeatable)
    #[arg(short, long, value_name = "ADDR")]
    pub connect: Vec<String>,

    /// Source name sent with every message (default: host name)
    #[arg(short, long)]
    pub name: Option<String>,

    /// Send the existing content of files found at startup
    #[arg(short, long)]
    pub all_lines: bool,

    /// Send this many trailing lines of files found at startup
    #[arg(short, long, value_name = "N", default_value_t = 0)]
    pub tail_lines: usize,

    /// Do not print watched files and lines
    #[arg(short, long)]
    pub silent: bool,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Listen command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ListenArgs {
    /// Accept pushed messages on this address (default: 127.0.0.1:9001 when no -c is given)
    #[arg(short, long, value_name = "ADDR")]
    pub bind: Option<String>,

    /// Subscribe to this publisher (repeatable)
    #[arg(short, long, value_name = "ADDR")]
    pub connect: Vec<String>,

    /// Poll interval in milliseconds (overrides `net.interval_ms`)
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Proxy command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct ProxyArgs {
    /// Accept pushed messages on this address (default: 127.0.0.1:9010 when no backend is given)
    #[arg(long, value_name = "ADDR")]
    pub backend_bind: Option<String>,

    /// Subscribe to this publisher (repeatable)
    #[arg(long, value_name = "ADDR")]
    pub backend_connect: Vec<String>,

    /// Publish on this address (default: 127.0.0.1:9011 when no frontend is given)
    #[arg(long, value_name = "ADDR")]
    pub frontend_bind: Option<String>,

    /// Push to this address (repeatable)
    #[arg(long, value_name = "ADDR")]
    pub frontend_connect: Vec<String>,

    /// Poll interval in milliseconds (overrides `net.interval_ms`)
    #[arg(short, long, value_name = "MS")]
    pub interval: Option<u64>,

    #[command(flatten)]
    pub common: CommonArgs,
}

/// Mock command arguments.
#[derive(clap::Args, Debug, Clone)]
pub struct MockArgs {
    /// Files to append to
    #[arg(required = true, value_hint = clap::ValueHint::FilePath)]
    pub files: Vec<PathBuf>,

    /// Seconds between lines
    #[arg(short, long, value_name = "SECS", default_value_t = 0.5)]
    pub interval: f64,

    #[command(flatten)]
    pub common: CommonArgs,
}

impl Cli {
    pub fn common(&self) -> &CommonArgs {
        match &self.command {
            Commands::Watch { args } => &args.common,
            Commands::Listen { args } => &args.common,
            Commands::Proxy { args } => &args.common,
            Commands::Mock { args } => &args.common,
        }
    }
}
