//! Publisher: bind one address, fan every message out to all subscribers.
//!
//! Each accepted subscriber owns a bounded outbound queue drained by its own
//! writer thread, so `send` never blocks on a slow peer. A full queue drops
//! the message for that subscriber only. Subscribers that connect after a
//! `send` never see it (slow-joiner).

use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use super::NetOptions;
use super::address::{Endpoint, parse_bind};
use super::conn::{IO_TICK, Lifetime, expect_greeting, spawn_acceptor};
use super::error::{NetError, Result};
use super::topic::Message;
use super::wire::{Multipart, RecordReader, Role, write_record};

/// A connected subscriber as seen from the publisher.
struct Subscriber {
    peer: SocketAddr,
    prefixes: Vec<Bytes>,
    tx: Sender<Bytes>,
}

impl Subscriber {
    fn wants(&self, first_frame: &[u8]) -> bool {
        self.prefixes.iter().any(|p| first_frame.starts_with(p))
    }
}

type Subscribers = Arc<Mutex<Vec<Subscriber>>>;

struct Running {
    lifetime: Arc<Lifetime>,
    subscribers: Subscribers,
}

/// Fan-out endpoint bound on one address.
pub struct Publisher {
    endpoint: Endpoint,
    local_addr: SocketAddr,
    running: Option<Running>,
}

impl Publisher {
    /// Bind `bind_address` and start accepting subscribers.
    pub fn open(bind_address: &str, options: &NetOptions) -> Result<Self> {
        let endpoint = parse_bind(bind_address)?;
        let listener = endpoint.bind()?;
        let local_addr = listener.local_addr()?;

        let lifetime = Lifetime::new();
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        {
            let lifetime_accept = Arc::clone(&lifetime);
            let subscribers = Arc::clone(&subscribers);
            let hwm = options.hwm;
            spawn_acceptor(
                listener,
                Arc::clone(&lifetime),
                move |stream, peer| {
                    let lifetime = Arc::clone(&lifetime_accept);
                    let subscribers = Arc::clone(&subscribers);
                    lifetime_accept
                        .spawn(move || serve_subscriber(stream, peer, hwm, &subscribers, &lifetime));
                },
                |e| {
                    crate::log!("publish"; "accept error: {}", e);
                    true
                },
            )
            .map(|handle| lifetime.adopt(handle))?;
        }

        crate::debug!("publish"; "bound {}", local_addr);

        Ok(Self {
            endpoint,
            local_addr,
            running: Some(Running {
                lifetime,
                subscribers,
            }),
        })
    }

    /// Encode and fan out a `(topic, payload)` message.
    pub fn send(&self, message: Message) -> Result<()> {
        self.send_multipart(&message.into())
    }

    /// Fan out raw frames to every subscriber whose prefix matches.
    ///
    /// Returns immediately when nobody is connected.
    pub fn send_multipart(&self, message: &Multipart) -> Result<()> {
        let running = self.running.as_ref().ok_or(NetError::Closed)?;
        let record = message.encode()?;
        let first = message.first();

        let mut subscribers = running.subscribers.lock();
        subscribers.retain(|sub| {
            if !sub.wants(first) {
                return true;
            }
            match sub.tx.try_send(record.clone()) {
                Ok(()) => true,
                Err(TrySendError::Full(_)) => {
                    crate::debug!("publish"; "queue full, dropping message for {}", sub.peer);
                    true
                }
                Err(TrySendError::Disconnected(_)) => {
                    crate::debug!("publish"; "subscriber {} gone", sub.peer);
                    false
                }
            }
        });
        Ok(())
    }

    /// Number of subscribers that completed their handshake.
    pub fn subscriber_count(&self) -> usize {
        self.running
            .as_ref()
            .map(|r| r.subscribers.lock().len())
            .unwrap_or(0)
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn is_closed(&self) -> bool {
        self.running.is_none()
    }

    /// Release the bound port and drop every subscriber connection.
    pub fn close(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.lifetime.close();
        // Dropping the senders ends the writer threads
        running.subscribers.lock().clear();
        running.lifetime.close_and_join();
        crate::debug!("publish"; "closed {}", self.local_addr);
    }
}

impl Drop for Publisher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Handshake with one subscriber, then drain its queue onto the socket.
fn serve_subscriber(
    stream: TcpStream,
    peer: SocketAddr,
    hwm: usize,
    subscribers: &Mutex<Vec<Subscriber>>,
    lifetime: &Lifetime,
) {
    if stream.set_read_timeout(Some(IO_TICK)).is_err() || stream.set_nodelay(true).is_err() {
        return;
    }
    let _tracked = lifetime.track(&stream);

    let mut reader = RecordReader::new(&stream);
    let greeting = match expect_greeting(&mut reader, Role::Subscriber, lifetime) {
        Ok(greeting) => greeting,
        Err(e) => {
            crate::debug!("publish"; "rejecting {}: {}", peer, e);
            return;
        }
    };

    let (tx, rx) = channel::bounded(hwm.max(1));
    {
        let mut subscribers = subscribers.lock();
        // Close may have raced the handshake
        if lifetime.is_closed() {
            return;
        }
        subscribers.push(Subscriber {
            peer,
            prefixes: greeting.prefixes,
            tx,
        });
    }
    crate::debug!("publish"; "subscriber connected: {}", peer);

    drain_queue(&stream, &rx, lifetime, peer);
}

fn drain_queue(mut stream: &TcpStream, rx: &Receiver<Bytes>, lifetime: &Lifetime, peer: SocketAddr) {
    while !lifetime.is_closed() {
        match rx.recv_timeout(IO_TICK) {
            Ok(record) => {
                if let Err(e) = write_record(&mut stream, &record) {
                    crate::debug!("publish"; "write to {} failed: {}", peer, e);
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    let _ = stream.shutdown(std::net::Shutdown::Both);
}
