//! Subscription: connect to a publisher and keep reconnecting.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use crossbeam::channel::Sender;

use super::{Event, ReadEnd, forward};
use crate::net::address::Endpoint;
use crate::net::conn::{Lifetime, connect_with_retry, sleep_unless_closed};
use crate::net::topic::SUBSCRIPTION_PREFIX;
use crate::net::wire::{Greeting, RecordReader};

pub(super) fn spawn(
    endpoint: Endpoint,
    tx: Sender<Event>,
    lifetime: &Arc<Lifetime>,
    reconnect: Duration,
) {
    let worker_lifetime = Arc::clone(lifetime);
    lifetime.spawn(move || run(&endpoint, &tx, &worker_lifetime, reconnect));
}

fn run(endpoint: &Endpoint, tx: &Sender<Event>, lifetime: &Lifetime, reconnect: Duration) {
    let greeting = Greeting::subscriber(vec![Bytes::from_static(SUBSCRIPTION_PREFIX.as_bytes())]);

    while let Some(stream) = connect_with_retry(endpoint, &greeting, reconnect, lifetime) {
        let _tracked = lifetime.track(&stream);
        let mut reader = RecordReader::new(&stream);

        match forward(&mut reader, tx, lifetime) {
            ReadEnd::Stopped => break,
            ReadEnd::Lost(e) => {
                crate::debug!("net"; "lost publisher {}: {}, reconnecting", endpoint, e);
                sleep_unless_closed(reconnect, lifetime);
            }
        }
    }
}
