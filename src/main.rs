//! logmesh - ship log lines between machines.

#![allow(dead_code)]

mod cli;
mod config;
mod core;
mod logger;
mod mock;
mod net;
mod rules;
mod tail;

use anyhow::Result;
use clap::{ColorChoice, Parser};
use cli::{Cli, Commands};
use config::Config;

fn main() -> Result<()> {
    // Setup global Ctrl+C handler (before any blocking operations)
    let cancel = core::setup_shutdown_handler()?;

    let cli = Cli::parse();

    // Set global color override based on CLI option
    match cli.color {
        ColorChoice::Always => owo_colors::set_override(true),
        ColorChoice::Never => owo_colors::set_override(false),
        ColorChoice::Auto => {} // owo-colors auto-detects TTY
    }
    logger::set_verbose(cli.common().verbose);

    let config = Config::load(&cli.config)?;

    match &cli.command {
        Commands::Watch { args } => cli::watch::run_watch(args, &config, &cancel),
        Commands::Listen { args } => cli::listen::run_listen(args, &config, &cancel),
        Commands::Proxy { args } => cli::proxy::run_proxy(args, &config, &cancel),
        Commands::Mock { args } => cli::mock::run_mock(args, &cancel),
    }
}
