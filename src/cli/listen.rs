//! `logmesh listen`: receive lines and print them.

use std::io::{self, Write};

use anyhow::{Context, Result};

use super::args::{LISTEN_BIND, ListenArgs};
use super::common::{default_addresses, join_addresses, net_options};
use crate::config::Config;
use crate::core::Cancellation;
use crate::log;
use crate::net::{Inbound, LogHandler};
use crate::rules::Rules;

/// Prints every event, passing line text through the rule set.
///
/// ```text
/// BEGIN web1: /var/log/app.log
/// LINE web1: /var/log/app.log | started
/// END web1: /var/log/app.log
/// ```
pub struct PrintHandler<W> {
    rules: Rules,
    out: W,
}

impl<W: Write> PrintHandler<W> {
    pub fn new(rules: Rules, out: W) -> Self {
        Self { rules, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn print(&mut self, line: std::fmt::Arguments<'_>) {
        // A closed stdout must not stop the receive loop
        let _ = self.out.write_fmt(line);
        let _ = self.out.write_all(b"\n");
        let _ = self.out.flush();
    }
}

impl<W: Write> LogHandler for PrintHandler<W> {
    fn on_line(&mut self, source: &str, file: &str, text: &str) {
        if let Some(line) = self.rules.process(text) {
            self.print(format_args!("LINE {source}: {file} | {line}"));
        }
    }

    fn on_watch(&mut self, source: &str, file: &str) {
        self.print(format_args!("BEGIN {source}: {file}"));
    }

    fn on_unwatch(&mut self, source: &str, file: &str) {
        self.print(format_args!("END {source}: {file}"));
    }
}

pub fn run_listen(args: &ListenArgs, config: &Config, cancel: &Cancellation) -> Result<()> {
    let options = net_options(config, args.interval);
    let bind = default_addresses(args.bind.as_deref(), &args.connect, LISTEN_BIND);
    let rules = config.compile_rules().context("invalid rules")?;

    if let Some(addr) = &bind {
        log!("listen"; "accepting pushed lines on {}", addr);
    }
    if !args.connect.is_empty() {
        log!("listen"; "subscribing to {}", join_addresses(&args.connect));
    }
    if !rules.is_empty() {
        log!("listen"; "applying {} rule(s)", rules.len());
    }

    let handler = PrintHandler::new(rules, io::stdout());
    let mut inbound = Inbound::new(bind.as_deref(), &args.connect, options, handler)
        .context("invalid listen address")?;
    inbound.listen(cancel).context("listener failed")
}
