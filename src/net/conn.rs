//! Connection plumbing shared by every socket role.

use std::io::{self, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, RecvTimeoutError};
use parking_lot::Mutex;

use super::address::Endpoint;
use super::error::{NetError, Result};
use super::wire::{Greeting, RecordReader, Role};

/// Sleep between non-blocking accept attempts.
const ACCEPT_POLL: Duration = Duration::from_millis(20);

/// How long a freshly accepted peer has to send its greeting.
pub(crate) const GREETING_TIMEOUT: Duration = Duration::from_secs(5);

/// Read timeout on established streams; bounds how long a worker thread
/// takes to notice the close flag.
pub(crate) const IO_TICK: Duration = Duration::from_millis(50);

/// Per-address connect timeout. Dials run on a detached thread, so this
/// never delays a close.
const CONNECT_TIMEOUT: Duration = Duration::from_millis(500);

// =============================================================================
// Close flag + stream registry
// =============================================================================

/// Shared lifetime state for one socket and its worker threads.
#[derive(Debug, Default)]
pub(crate) struct Lifetime {
    closed: AtomicBool,
    next_id: AtomicU64,
    streams: Mutex<Vec<(u64, TcpStream)>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl Lifetime {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Remember a stream so `close()` can shut it down from outside.
    ///
    /// The registration lasts as long as the returned guard.
    pub(crate) fn track(&self, stream: &TcpStream) -> Tracked<'_> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(clone) = stream.try_clone() {
            self.streams.lock().push((id, clone));
        }
        Tracked { lifetime: self, id }
    }

    /// Run `f` on a worker thread owned by this lifetime.
    pub(crate) fn spawn<F>(&self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.adopt(thread::spawn(f));
    }

    /// Take ownership of an already running worker.
    pub(crate) fn adopt(&self, handle: JoinHandle<()>) {
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.is_finished());
        workers.push(handle);
    }

    /// Set the close flag and shut down every tracked stream.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        for (_, stream) in self.streams.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Close, then wait for every worker (including ones spawned while
    /// joining) to exit.
    pub(crate) fn close_and_join(&self) {
        self.close();
        loop {
            let batch: Vec<_> = self.workers.lock().drain(..).collect();
            if batch.is_empty() {
                break;
            }
            join_all(batch);
        }
        // Streams tracked by workers that raced the first pass
        self.close();
    }
}

/// Stream registration; dropping it releases the duplicated handle.
#[must_use]
pub(crate) struct Tracked<'a> {
    lifetime: &'a Lifetime,
    id: u64,
}

impl Drop for Tracked<'_> {
    fn drop(&mut self) {
        self.lifetime.streams.lock().retain(|(id, _)| *id != self.id);
    }
}

// =============================================================================
// Accepting
// =============================================================================

/// Run a non-blocking accept loop on a background thread until closed.
///
/// `on_error` decides whether a non-`WouldBlock` accept failure is fatal
/// (`false` stops the loop).
pub(crate) fn spawn_acceptor<A, E>(
    listener: TcpListener,
    lifetime: Arc<Lifetime>,
    mut on_accept: A,
    mut on_error: E,
) -> io::Result<JoinHandle<()>>
where
    A: FnMut(TcpStream, SocketAddr) + Send + 'static,
    E: FnMut(io::Error) -> bool + Send + 'static,
{
    listener.set_nonblocking(true)?;

    Ok(thread::spawn(move || {
        while !lifetime.is_closed() {
            match listener.accept() {
                Ok((stream, addr)) => {
                    // Accepted sockets may inherit non-blocking mode
                    let _ = stream.set_nonblocking(false);
                    on_accept(stream, addr);
                }
                Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                }
                Err(e) => {
                    if !on_error(e) {
                        break;
                    }
                    thread::sleep(ACCEPT_POLL);
                }
            }
        }
        // listener dropped here: port released
    }))
}

/// Wait for the peer's greeting and check its role.
pub(crate) fn expect_greeting(
    reader: &mut RecordReader<&TcpStream>,
    expected: Role,
    lifetime: &Lifetime,
) -> Result<Greeting> {
    let deadline = Instant::now() + GREETING_TIMEOUT;
    loop {
        if lifetime.is_closed() {
            return Err(NetError::Closed);
        }
        if let Some(greeting) = reader.read_greeting()? {
            if greeting.role != expected {
                return Err(NetError::Protocol(format!(
                    "expected {:?} peer, got {:?}",
                    expected, greeting.role
                )));
            }
            return Ok(greeting);
        }
        if Instant::now() >= deadline {
            return Err(NetError::Protocol("greeting timed out".into()));
        }
    }
}

// =============================================================================
// Connecting
// =============================================================================

/// Connect to `endpoint` and send `greeting`, retrying every `retry` until
/// it works or the lifetime closes. Returns `None` once closed.
pub(crate) fn connect_with_retry(
    endpoint: &Endpoint,
    greeting: &Greeting,
    retry: Duration,
    lifetime: &Lifetime,
) -> Option<TcpStream> {
    let mut attempts = 0u32;
    while !lifetime.is_closed() {
        let Some(result) = dial(endpoint, greeting, lifetime) else {
            break;
        };
        match result {
            Ok(stream) => {
                crate::debug!("net"; "connected to {}", endpoint);
                return Some(stream);
            }
            Err(e) => {
                if attempts == 0 {
                    crate::debug!("net"; "{} unreachable ({}), retrying", endpoint, e);
                }
                attempts = attempts.saturating_add(1);
                sleep_unless_closed(retry, lifetime);
            }
        }
    }
    None
}

/// Resolve and connect on a throwaway thread, waiting in `IO_TICK` steps.
///
/// Returns `None` as soon as the lifetime closes; a dial still in flight
/// then finishes on its own and drops its stream.
fn dial(
    endpoint: &Endpoint,
    greeting: &Greeting,
    lifetime: &Lifetime,
) -> Option<io::Result<TcpStream>> {
    let (tx, rx) = channel::bounded(1);
    let target = endpoint.clone();
    let greeting = greeting.clone();
    thread::spawn(move || {
        let _ = tx.send(try_connect(&target, &greeting));
    });

    while !lifetime.is_closed() {
        match rx.recv_timeout(IO_TICK) {
            Ok(result) => return Some(result),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                return Some(Err(io::Error::other("dial thread exited")));
            }
        }
    }
    None
}

fn try_connect(endpoint: &Endpoint, greeting: &Greeting) -> io::Result<TcpStream> {
    let mut last_error = None;
    for addr in endpoint.resolve()? {
        match TcpStream::connect_timeout(&addr, CONNECT_TIMEOUT) {
            Ok(mut stream) => {
                stream.set_nodelay(true)?;
                stream.set_read_timeout(Some(IO_TICK))?;
                stream.write_all(&greeting.encode())?;
                return Ok(stream);
            }
            Err(e) => last_error = Some(e),
        }
    }
    Err(last_error.unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no address")))
}

/// Sleep in small steps so a close is noticed quickly.
pub(crate) fn sleep_unless_closed(total: Duration, lifetime: &Lifetime) {
    let deadline = Instant::now() + total;
    while !lifetime.is_closed() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep((deadline - now).min(IO_TICK));
    }
}

/// Join worker threads, ignoring ones that panicked.
pub(crate) fn join_all(handles: impl IntoIterator<Item = JoinHandle<()>>) {
    for handle in handles {
        if handle.join().is_err() {
            crate::log!("net"; "worker thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifetime_close_shuts_tracked_streams() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = TcpStream::connect(addr).unwrap();
        let (server, _) = listener.accept().unwrap();

        let lifetime = Lifetime::new();
        let _tracked = lifetime.track(&server);
        lifetime.close();

        assert!(lifetime.is_closed());
        // Peer observes EOF once the tracked side is shut down
        let mut buf = [0u8; 1];
        client.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        assert_eq!(io::Read::read(&mut &client, &mut buf).unwrap(), 0);
    }

    #[test]
    fn test_tracked_guard_releases_registration() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();

        let lifetime = Lifetime::new();
        {
            let _tracked = lifetime.track(&client);
            assert_eq!(lifetime.streams.lock().len(), 1);
        }
        assert!(lifetime.streams.lock().is_empty());
    }

    #[test]
    fn test_connect_with_retry_gives_up_when_closed() {
        let lifetime = Lifetime::new();
        lifetime.close();
        // Port 1 on loopback is almost certainly closed; we never try anyway
        let endpoint = Endpoint::parse("127.0.0.1:1").unwrap();
        let stream = connect_with_retry(
            &endpoint,
            &Greeting::pusher(),
            Duration::from_millis(10),
            &lifetime,
        );
        assert!(stream.is_none());
    }

    #[test]
    fn test_acceptor_stops_and_releases_port() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let lifetime = Lifetime::new();
        let handle =
            spawn_acceptor(listener, Arc::clone(&lifetime), |_, _| {}, |_| true).unwrap();
        lifetime.adopt(handle);

        lifetime.close_and_join();

        // Port can be bound again after the acceptor exits
        assert!(TcpListener::bind(addr).is_ok());
    }
}
