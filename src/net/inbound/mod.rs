//! Inbound multiplexer: one blocking loop over a pull endpoint and any
//! number of subscriptions.
//!
//! Every socket gets a reader thread; all of them feed a single bounded
//! channel that [`Inbound::listen`] drains on the caller's thread, so the
//! handler never runs concurrently with itself. Between messages the loop
//! wakes at least once per poll interval to check the [`Cancellation`].
//!
//! Subscriptions filter on [`crate::net::topic::SUBSCRIPTION_PREFIX`], so only log traffic
//! reaches the handler.

mod pull;
mod sub;

use std::net::TcpStream;
use std::sync::Arc;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender};

use super::NetOptions;
use super::address::{Endpoint, parse_bind, parse_connect};
use super::conn::Lifetime;
use super::error::{NetError, Result};
use super::topic::{Kind, Message};
use super::wire::{Multipart, RecordReader};
use crate::core::Cancellation;

// ============================================================================
// Handlers
// ============================================================================

/// Callbacks for decoded log traffic.
pub trait LogHandler {
    /// One log line. `text` has no line terminator.
    fn on_line(&mut self, source: &str, file: &str, text: &str);

    /// A producer started following `file`.
    fn on_watch(&mut self, source: &str, file: &str) {
        let _ = (source, file);
    }

    /// A producer stopped following `file`.
    fn on_unwatch(&mut self, source: &str, file: &str) {
        let _ = (source, file);
    }
}

/// Callback for undecoded messages. An error ends the listen loop.
pub trait RawHandler {
    fn on_message(&mut self, message: Multipart) -> Result<()>;
}

impl<F> RawHandler for F
where
    F: FnMut(Multipart) -> Result<()>,
{
    fn on_message(&mut self, message: Multipart) -> Result<()> {
        self(message)
    }
}

/// Adapter that decodes topics and dispatches to a [`LogHandler`].
///
/// Messages that are not two frames or whose topic does not parse are
/// dropped, with a debug log line.
#[derive(Debug, Default)]
pub struct Decoded<H>(pub H);

impl<H> Decoded<H> {
    pub fn inner(&self) -> &H {
        &self.0
    }

    pub fn into_inner(self) -> H {
        self.0
    }
}

impl<H: LogHandler> RawHandler for Decoded<H> {
    fn on_message(&mut self, message: Multipart) -> Result<()> {
        let decoded = Message::try_from(message)
            .and_then(|message| message.decode_topic().map(|topic| (topic, message)));

        match decoded {
            Ok((topic, message)) => match topic.kind {
                Kind::Line => self.0.on_line(&topic.source, &topic.file, &message.text()),
                Kind::Watch => self.0.on_watch(&topic.source, &topic.file),
                Kind::Unwatch => self.0.on_unwatch(&topic.source, &topic.file),
            },
            Err(e) => crate::debug!("net"; "dropping message: {}", e),
        }
        Ok(())
    }
}

// ============================================================================
// Multiplexer
// ============================================================================

enum Event {
    Message(Multipart),
    /// Fatal socket failure; ends the listen loop.
    Failed(NetError),
}

/// Why a reader thread stopped forwarding.
enum ReadEnd {
    /// Multiplexer closed or stopped listening.
    Stopped,
    /// The connection broke.
    Lost(NetError),
}

/// Blocking receive loop over a pull bind and zero or more subscriptions.
pub struct Inbound<R> {
    bind: Option<Endpoint>,
    connect: Vec<Endpoint>,
    options: NetOptions,
    handler: R,
    used: bool,
}

impl<H: LogHandler> Inbound<Decoded<H>> {
    /// Multiplexer delivering decoded log events to `handler`.
    pub fn new<S: AsRef<str>>(
        bind: Option<&str>,
        connect: &[S],
        options: NetOptions,
        handler: H,
    ) -> Result<Self> {
        Self::raw(bind, connect, options, Decoded(handler))
    }
}

impl<R: RawHandler> Inbound<R> {
    /// Multiplexer delivering undecoded messages to `handler`.
    ///
    /// Addresses are validated here; nothing is opened until `listen`.
    pub fn raw<S: AsRef<str>>(
        bind: Option<&str>,
        connect: &[S],
        options: NetOptions,
        handler: R,
    ) -> Result<Self> {
        let bind = bind.map(parse_bind).transpose()?;
        let connect = parse_connect(connect)?;
        Ok(Self {
            bind,
            connect,
            options,
            handler,
            used: false,
        })
    }

    /// No bind and no connect address: `listen` is a no-op.
    pub fn is_idle(&self) -> bool {
        self.bind.is_none() && self.connect.is_empty()
    }

    pub fn handler(&self) -> &R {
        &self.handler
    }

    pub fn handler_mut(&mut self) -> &mut R {
        &mut self.handler
    }

    pub fn into_handler(self) -> R {
        self.handler
    }

    /// Open every socket and dispatch messages until `cancel` is set.
    ///
    /// Sockets are released before returning, on success and on error.
    /// A multiplexer can listen once; later calls return [`NetError::Closed`].
    pub fn listen(&mut self, cancel: &Cancellation) -> Result<()> {
        if self.used {
            return Err(NetError::Closed);
        }
        if self.is_idle() {
            crate::debug!("net"; "no inbound addresses, nothing to listen on");
            return Ok(());
        }
        self.used = true;

        let lifetime = Lifetime::new();
        let (tx, rx) = channel::bounded(self.options.hwm.max(1));

        let result = self
            .start(&lifetime, tx)
            .and_then(|()| self.dispatch(&rx, cancel));

        lifetime.close();
        // Unblocks readers waiting on a full channel
        drop(rx);
        lifetime.close_and_join();
        result
    }

    fn start(&self, lifetime: &Arc<Lifetime>, tx: Sender<Event>) -> Result<()> {
        if let Some(endpoint) = &self.bind {
            let addr = pull::spawn(endpoint, tx.clone(), lifetime)?;
            crate::debug!("net"; "pull bound {}", addr);
        }
        for endpoint in &self.connect {
            sub::spawn(
                endpoint.clone(),
                tx.clone(),
                lifetime,
                self.options.reconnect_interval,
            );
        }
        Ok(())
    }

    fn dispatch(&mut self, rx: &Receiver<Event>, cancel: &Cancellation) -> Result<()> {
        while !cancel.is_cancelled() {
            match rx.recv_timeout(self.options.poll_interval) {
                Ok(Event::Message(message)) => self.handler.on_message(message)?,
                Ok(Event::Failed(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

/// Pump records from one connection into the shared channel.
fn forward(reader: &mut RecordReader<&TcpStream>, tx: &Sender<Event>, lifetime: &Lifetime) -> ReadEnd {
    while !lifetime.is_closed() {
        match reader.read_message() {
            Ok(Some(message)) => {
                if tx.send(Event::Message(message)).is_err() {
                    return ReadEnd::Stopped;
                }
            }
            Ok(None) => {}
            Err(e) => {
                if lifetime.is_closed() {
                    break;
                }
                return ReadEnd::Lost(e);
            }
        }
    }
    ReadEnd::Stopped
}
