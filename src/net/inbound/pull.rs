//! Pull endpoint: accept pushers, read until they hang up.

use std::io;
use std::net::{SocketAddr, TcpStream};
use std::sync::Arc;

use crossbeam::channel::Sender;

use super::{Event, ReadEnd, forward};
use crate::net::address::Endpoint;
use crate::net::conn::{IO_TICK, Lifetime, expect_greeting, spawn_acceptor};
use crate::net::error::{NetError, Result};
use crate::net::wire::{RecordReader, Role};

/// Bind `endpoint` and start accepting. Returns the bound address.
pub(super) fn spawn(
    endpoint: &Endpoint,
    tx: Sender<Event>,
    lifetime: &Arc<Lifetime>,
) -> Result<SocketAddr> {
    let listener = endpoint.bind()?;
    let local_addr = listener.local_addr()?;

    let accept_lifetime = Arc::clone(lifetime);
    let error_tx = tx.clone();
    let handle = spawn_acceptor(
        listener,
        Arc::clone(lifetime),
        move |stream, peer| {
            let lifetime = Arc::clone(&accept_lifetime);
            let tx = tx.clone();
            accept_lifetime.spawn(move || read_pusher(stream, peer, &tx, &lifetime));
        },
        move |e| {
            // Peer gave up between SYN and accept
            if e.kind() == io::ErrorKind::ConnectionAborted {
                return true;
            }
            let _ = error_tx.send(Event::Failed(NetError::Transport(e)));
            false
        },
    )?;
    lifetime.adopt(handle);

    Ok(local_addr)
}

fn read_pusher(stream: TcpStream, peer: SocketAddr, tx: &Sender<Event>, lifetime: &Lifetime) {
    if stream.set_read_timeout(Some(IO_TICK)).is_err() {
        return;
    }
    let _tracked = lifetime.track(&stream);

    let mut reader = RecordReader::new(&stream);
    if let Err(e) = expect_greeting(&mut reader, Role::Pusher, lifetime) {
        crate::debug!("net"; "rejecting {}: {}", peer, e);
        return;
    }
    crate::debug!("net"; "pusher connected: {}", peer);

    if let ReadEnd::Lost(e) = forward(&mut reader, tx, lifetime) {
        crate::debug!("net"; "pusher {} disconnected: {}", peer, e);
    }
}
