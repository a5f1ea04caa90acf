//! Loopback fixtures shared by the fabric tests.

use std::io::Write;
use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use parking_lot::Mutex;

use super::NetOptions;
use super::error::Result;
use super::inbound::{Inbound, LogHandler};
use super::wire::{Greeting, Multipart, RecordReader};
use crate::core::Cancellation;

/// A loopback address that was free a moment ago.
pub fn free_addr() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// A loopback listener that never accepts, with its backlog filled so
/// further connects hang until they time out.
///
/// The returned streams hold the backlog; keep them alive with the listener.
pub fn saturated_listener() -> (TcpListener, Vec<TcpStream>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let mut held = Vec::new();
    for _ in 0..300 {
        match TcpStream::connect_timeout(&addr, Duration::from_millis(100)) {
            Ok(stream) => held.push(stream),
            Err(_) => break,
        }
    }
    (listener, held)
}

/// Poll `condition` every 10ms until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

/// Handler recording every callback as a short string.
#[derive(Debug, Clone, Default)]
pub struct Collected {
    events: Arc<Mutex<Vec<String>>>,
}

impl Collected {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter(|e| e.starts_with("line "))
            .collect()
    }

    pub fn push_frames(&self, message: &Multipart) {
        self.events.lock().push(Self::describe_frames(message.frames()));
    }

    pub fn describe_frames(frames: &[Bytes]) -> String {
        format!("{frames:?}")
    }
}

impl LogHandler for Collected {
    fn on_line(&mut self, source: &str, file: &str, text: &str) {
        self.events.lock().push(format!("line {source} {file} {text}"));
    }

    fn on_watch(&mut self, source: &str, file: &str) {
        self.events.lock().push(format!("watch {source} {file}"));
    }

    fn on_unwatch(&mut self, source: &str, file: &str) {
        self.events.lock().push(format!("unwatch {source} {file}"));
    }
}

/// Run a decoding multiplexer on its own thread.
pub fn listen_in_background(
    bind: Option<&str>,
    connect: &[String],
    options: NetOptions,
    handler: Collected,
    cancel: &Cancellation,
) -> JoinHandle<Result<()>> {
    let mut inbound = Inbound::new(bind, connect, options, handler).unwrap();
    let cancel = cancel.clone();
    thread::spawn(move || inbound.listen(&cancel))
}

fn connect_retrying(addr: &str, greeting: &Greeting) -> TcpStream {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match TcpStream::connect(addr) {
            Ok(mut stream) => {
                stream.write_all(&greeting.encode()).unwrap();
                return stream;
            }
            Err(_) if Instant::now() < deadline => thread::sleep(Duration::from_millis(10)),
            Err(e) => panic!("could not connect to {addr}: {e}"),
        }
    }
}

/// Bare pusher that writes hand-built frames, malformed ones included.
pub struct RawPush {
    stream: TcpStream,
}

impl RawPush {
    pub fn connect(addr: &str) -> Self {
        Self {
            stream: connect_retrying(addr, &Greeting::pusher()),
        }
    }

    pub fn send(&mut self, message: &Multipart) {
        self.stream.write_all(&message.encode().unwrap()).unwrap();
    }
}

/// Bare subscriber reading whatever the publisher forwards.
pub struct RawSub {
    reader: RecordReader<TcpStream>,
}

impl RawSub {
    pub fn connect(addr: &str, prefixes: &[&str]) -> Self {
        let prefixes = prefixes
            .iter()
            .map(|p| Bytes::copy_from_slice(p.as_bytes()))
            .collect();
        let stream = connect_retrying(addr, &Greeting::subscriber(prefixes));
        stream
            .set_read_timeout(Some(Duration::from_millis(20)))
            .unwrap();
        Self {
            reader: RecordReader::new(stream),
        }
    }

    /// Next message, or `None` if nothing arrives within `timeout` or the
    /// publisher hangs up.
    pub fn recv(&mut self, timeout: Duration) -> Option<Multipart> {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            match self.reader.read_message() {
                Ok(Some(message)) => return Some(message),
                Ok(None) => {}
                Err(_) => return None,
            }
        }
        None
    }
}
