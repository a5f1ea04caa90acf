//! `logmesh watch`: follow files and ship their lines.

use std::path::Path;

use anyhow::{Context, Result};

use super::args::{WATCH_BIND, WatchArgs};
use super::common::{default_addresses, join_addresses, net_options};
use crate::config::Config;
use crate::core::Cancellation;
use crate::net::topic::sanitize_field;
use crate::net::{Message, Publisher, Pusher};
use crate::tail::{LogWatcher, WatchHandler, WatchOptions};
use crate::{debug, log};

/// Turns watcher events into messages on every configured output.
pub struct AgentHandler {
    name: String,
    publisher: Option<Publisher>,
    pusher: Option<Pusher>,
    silent: bool,
}

impl AgentHandler {
    /// `name` is sanitized so it cannot break the topic layout.
    pub fn new(
        name: &str,
        publisher: Option<Publisher>,
        pusher: Option<Pusher>,
        silent: bool,
    ) -> Self {
        Self {
            name: sanitize_field(name),
            publisher,
            pusher,
            silent,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, message: Message) {
        if let Some(publisher) = &self.publisher
            && let Err(e) = publisher.send(message.clone())
        {
            debug!("publish"; "dropped message: {}", e);
        }
        if let Some(pusher) = &self.pusher
            && let Err(e) = pusher.send(message)
        {
            debug!("push"; "dropped message: {}", e);
        }
    }

    pub fn close(&mut self) {
        if let Some(mut publisher) = self.publisher.take() {
            debug!("publish"; "closing with {} subscriber(s)", publisher.subscriber_count());
            publisher.close();
        }
        if let Some(mut pusher) = self.pusher.take() {
            let pending = pusher.pending();
            if pending > 0 {
                log!("push"; "dropping {} undelivered message(s)", pending);
            }
            pusher.close();
        }
    }
}

fn file_id(file: &Path) -> String {
    file.to_string_lossy().into_owned()
}

impl WatchHandler for AgentHandler {
    fn on_watch(&mut self, file: &Path) {
        let file = file_id(file);
        self.send(Message::watch(&self.name, &file));
        if !self.silent {
            println!("START WATCHING: {file}");
        }
    }

    fn on_unwatch(&mut self, file: &Path) {
        let file = file_id(file);
        self.send(Message::unwatch(&self.name, &file));
        if !self.silent {
            println!("STOP WATCHING: {file}");
        }
    }

    fn on_lines(&mut self, file: &Path, lines: &[String]) {
        let file = file_id(file);
        for line in lines {
            self.send(Message::line(&self.name, &file, line));
            if !self.silent {
                println!("LINE: {file} | {line}");
            }
        }
    }
}

/// Host name, or `unknown` when it cannot be read.
fn host_name() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|_| "unknown".to_string())
}

pub fn run_watch(args: &WatchArgs, config: &Config, cancel: &Cancellation) -> Result<()> {
    let options = net_options(config, None);
    let bind = default_addresses(args.bind.as_deref(), &args.connect, WATCH_BIND);

    let publisher = bind
        .as_deref()
        .map(|addr| Publisher::open(addr, &options))
        .transpose()
        .context("failed to open publisher")?;
    let pusher = (!args.connect.is_empty())
        .then(|| Pusher::open(&args.connect, &options))
        .transpose()
        .context("failed to open pusher")?;

    let watch_options = WatchOptions {
        all_lines: args.all_lines,
        tail_lines: args.tail_lines,
        ..WatchOptions::default()
    };
    let mut watcher = LogWatcher::new(&args.glob, watch_options)?;

    if let Some(publisher) = &publisher {
        log!("watch"; "publishing on {}", publisher.endpoint());
    }

    let name = args.name.clone().unwrap_or_else(host_name);
    let mut handler = AgentHandler::new(&name, publisher, pusher, args.silent);

    log!("watch"; "following {} as `{}`", args.glob, handler.name());
    if !args.connect.is_empty() {
        log!("watch"; "pushing to {}", join_addresses(&args.connect));
    }
    if args.all_lines {
        log!("watch"; "sending existing content");
    } else if args.tail_lines > 0 {
        log!("watch"; "sending {} trailing line(s)", args.tail_lines);
    }

    let result = watcher.watch(&mut handler, cancel);
    handler.close();
    result.context("file watcher failed")
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::net::testing::{RawSub, wait_until};
    use crate::net::topic::Kind;
    use crate::net::{NetOptions, Topic};

    const WAIT: Duration = Duration::from_secs(5);

    fn recv(sub: &mut RawSub) -> (Topic, String) {
        let message = Message::try_from(sub.recv(WAIT).unwrap()).unwrap();
        (message.decode_topic().unwrap(), message.text())
    }

    #[test]
    fn test_agent_publishes_events() {
        let publisher = Publisher::open("127.0.0.1:0", &NetOptions::default()).unwrap();
        let addr = publisher.local_addr().to_string();
        let mut sub = RawSub::connect(&addr, &["log|"]);
        assert!(wait_until(WAIT, || publisher.subscriber_count() == 1));

        let mut agent = AgentHandler::new("web|1", Some(publisher), None, true);
        assert_eq!(agent.name(), "web_1");

        let file = Path::new("/var/log/app.log");
        agent.on_watch(file);
        agent.on_lines(file, &["one".to_string(), "two".to_string()]);
        agent.on_unwatch(file);

        let expected = [
            (Kind::Watch, ""),
            (Kind::Line, "one"),
            (Kind::Line, "two"),
            (Kind::Unwatch, ""),
        ];
        for (kind, text) in expected {
            let (topic, payload) = recv(&mut sub);
            assert_eq!(topic, Topic::new(kind, "web_1", "/var/log/app.log"));
            assert_eq!(payload, text);
        }
        agent.close();
    }

    #[test]
    fn test_agent_without_outputs_is_silent_noop() {
        let mut agent = AgentHandler::new("h", None, None, true);
        agent.on_watch(Path::new("a.log"));
        agent.on_lines(Path::new("a.log"), &["x".to_string()]);
        agent.close();
    }

    #[test]
    fn test_host_name_is_not_empty() {
        assert!(!host_name().is_empty());
    }
}
