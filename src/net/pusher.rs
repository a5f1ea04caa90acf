//! Pusher: connect to one or more pull endpoints, deliver each message to
//! exactly one of them.
//!
//! # Delivery policy
//!
//! - Peers are tried round-robin from a rotating cursor; a peer that is not
//!   connected or whose queue is at the high-water mark is skipped.
//! - When no peer can take a message it is parked in a shared pending queue
//!   bounded by the high-water mark; when full, the oldest entry is dropped.
//! - The first peer to (re)connect drains the pending queue, in order,
//!   before anything sent afterwards.
//! - Connection attempts never block `send`; each peer reconnects on its own
//!   thread after `reconnect_interval`.

use std::collections::VecDeque;
use std::io;
use std::net::TcpStream;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use super::NetOptions;
use super::address::{Endpoint, parse_connect};
use super::conn::{IO_TICK, Lifetime, connect_with_retry, sleep_unless_closed};
use super::error::{NetError, Result};
use super::topic::Message;
use super::wire::{Greeting, Multipart, write_record};

struct Peer {
    endpoint: Endpoint,
    ready: AtomicBool,
    tx: Sender<Bytes>,
}

/// Rotation cursor and pending queue, guarded together so readiness changes
/// and parking decisions cannot interleave.
struct Dispatch {
    cursor: usize,
    pending: VecDeque<Bytes>,
    hwm: usize,
    dropped: u64,
}

impl Dispatch {
    fn park(&mut self, record: Bytes) {
        if self.pending.len() >= self.hwm {
            self.pending.pop_front();
            self.dropped += 1;
            if self.dropped == 1 || self.dropped % 1000 == 0 {
                crate::log!("push"; "no reachable peer, dropped {} oldest message(s)", self.dropped);
            }
        }
        self.pending.push_back(record);
    }
}

struct Running {
    lifetime: Arc<Lifetime>,
    peers: Vec<Arc<Peer>>,
    dispatch: Arc<Mutex<Dispatch>>,
}

/// Load-distributing sender connected to one or more peers.
pub struct Pusher {
    running: Option<Running>,
}

impl Pusher {
    /// Start connecting to every address; returns without waiting for peers.
    pub fn open<S: AsRef<str>>(connect_addresses: &[S], options: &NetOptions) -> Result<Self> {
        let endpoints = parse_connect(connect_addresses)?;
        if endpoints.is_empty() {
            return Err(NetError::NoPeers);
        }

        let hwm = options.hwm.max(1);
        let lifetime = Lifetime::new();
        let dispatch = Arc::new(Mutex::new(Dispatch {
            cursor: 0,
            pending: VecDeque::new(),
            hwm,
            dropped: 0,
        }));

        let mut peers = Vec::with_capacity(endpoints.len());
        for endpoint in endpoints {
            let (tx, rx) = channel::bounded(hwm);
            let peer = Arc::new(Peer {
                endpoint,
                ready: AtomicBool::new(false),
                tx,
            });
            let worker = PeerWorker {
                peer: Arc::clone(&peer),
                rx,
                dispatch: Arc::clone(&dispatch),
                lifetime: Arc::clone(&lifetime),
                reconnect: options.reconnect_interval,
            };
            lifetime.spawn(move || worker.run());
            peers.push(peer);
        }

        Ok(Self {
            running: Some(Running {
                lifetime,
                peers,
                dispatch,
            }),
        })
    }

    /// Encode and deliver a `(topic, payload)` message to one peer.
    pub fn send(&self, message: Message) -> Result<()> {
        self.send_multipart(&message.into())
    }

    /// Deliver raw frames to the next ready peer, or park them.
    pub fn send_multipart(&self, message: &Multipart) -> Result<()> {
        let running = self.running.as_ref().ok_or(NetError::Closed)?;
        let record = message.encode()?;

        let mut dispatch = running.dispatch.lock();
        let count = running.peers.len();
        for step in 0..count {
            let index = (dispatch.cursor + step) % count;
            let peer = &running.peers[index];
            if !peer.ready.load(Ordering::SeqCst) {
                continue;
            }
            match peer.tx.try_send(record.clone()) {
                Ok(()) => {
                    dispatch.cursor = (index + 1) % count;
                    return Ok(());
                }
                Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => continue,
            }
        }

        dispatch.park(record);
        Ok(())
    }

    /// Number of peers currently connected.
    pub fn ready_peers(&self) -> usize {
        self.running
            .as_ref()
            .map(|r| {
                r.peers
                    .iter()
                    .filter(|p| p.ready.load(Ordering::SeqCst))
                    .count()
            })
            .unwrap_or(0)
    }

    /// Messages waiting for any peer to become reachable.
    pub fn pending(&self) -> usize {
        self.running
            .as_ref()
            .map(|r| r.dispatch.lock().pending.len())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.running.is_none()
    }

    /// Release every connection and stop reconnecting.
    pub fn close(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        running.lifetime.close_and_join();
        crate::debug!("push"; "closed {} peer connection(s)", running.peers.len());
    }
}

impl Drop for Pusher {
    fn drop(&mut self) {
        self.close();
    }
}

/// Connection loop for a single peer.
struct PeerWorker {
    peer: Arc<Peer>,
    rx: Receiver<Bytes>,
    dispatch: Arc<Mutex<Dispatch>>,
    lifetime: Arc<Lifetime>,
    reconnect: Duration,
}

impl PeerWorker {
    fn run(self) {
        let greeting = Greeting::pusher();
        while let Some(stream) =
            connect_with_retry(&self.peer.endpoint, &greeting, self.reconnect, &self.lifetime)
        {
            let _tracked = self.lifetime.track(&stream);

            // Claim the backlog and become ready atomically w.r.t. senders
            let backlog = {
                let mut dispatch = self.dispatch.lock();
                self.peer.ready.store(true, Ordering::SeqCst);
                std::mem::take(&mut dispatch.pending)
            };
            if !backlog.is_empty() {
                crate::debug!("push"; "flushing {} parked message(s) to {}", backlog.len(), self.peer.endpoint);
            }

            let result = self.pump(&stream, backlog);

            {
                let _dispatch = self.dispatch.lock();
                self.peer.ready.store(false, Ordering::SeqCst);
            }
            let _ = stream.shutdown(std::net::Shutdown::Both);

            if self.lifetime.is_closed() {
                break;
            }
            if let Err(e) = result {
                crate::debug!("push"; "lost {}: {}, reconnecting", self.peer.endpoint, e);
            }
            sleep_unless_closed(self.reconnect, &self.lifetime);
        }
    }

    /// Write the backlog, then everything routed to this peer, until the
    /// connection breaks or the pusher closes.
    fn pump(&self, mut stream: &TcpStream, backlog: VecDeque<Bytes>) -> io::Result<()> {
        for record in backlog {
            write_record(&mut stream, &record)?;
        }

        while !self.lifetime.is_closed() {
            match self.rx.recv_timeout(IO_TICK) {
                Ok(record) => write_record(&mut stream, &record)?,
                Err(RecvTimeoutError::Timeout) => {
                    if peer_hung_up(stream)? {
                        return Err(io::Error::from(io::ErrorKind::ConnectionReset));
                    }
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        Ok(())
    }
}

/// Pull peers never write back, so a readable EOF means they went away.
fn peer_hung_up(stream: &TcpStream) -> io::Result<bool> {
    let mut probe = [0u8; 1];
    stream.set_nonblocking(true)?;
    let result = stream.peek(&mut probe);
    stream.set_nonblocking(false)?;
    match result {
        Ok(0) => Ok(true),
        Ok(_) => Ok(false),
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(false),
        Err(e) => Err(e),
    }
}
