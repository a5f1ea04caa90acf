//! Relay: forward everything a backend multiplexer receives to a frontend
//! publisher and/or pusher, byte for byte.
//!
//! Frames are never decoded here, so relays chain to any depth. The only
//! filtering is the `log|` subscription prefix on the backend's
//! subscribe side.

use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use super::NetOptions;
use super::error::Result;
use super::inbound::{Inbound, RawHandler};
use super::publisher::Publisher;
use super::pusher::Pusher;
use super::wire::Multipart;
use crate::core::Cancellation;

/// Addresses for both sides of a relay.
#[derive(Debug, Clone, Default)]
pub struct RelayConfig {
    pub backend_bind: Option<String>,
    pub backend_connect: Vec<String>,
    pub frontend_bind: Option<String>,
    pub frontend_connect: Vec<String>,
    pub options: NetOptions,
}

/// Frontend outputs; either, both or neither may be active.
struct Frontend {
    publisher: Option<Publisher>,
    pusher: Option<Pusher>,
}

impl Frontend {
    fn close(&mut self) {
        if let Some(mut publisher) = self.publisher.take() {
            publisher.close();
        }
        if let Some(mut pusher) = self.pusher.take() {
            pusher.close();
        }
    }
}

impl RawHandler for Frontend {
    fn on_message(&mut self, message: Multipart) -> Result<()> {
        if let Some(publisher) = &self.publisher {
            publisher.send_multipart(&message)?;
        }
        if let Some(pusher) = &self.pusher {
            pusher.send_multipart(&message)?;
        }
        Ok(())
    }
}

/// One proxy session: backend multiplexer plus frontend outputs.
pub struct Relay {
    backend: Inbound<Frontend>,
    poll_interval: Duration,
}

impl Relay {
    /// Open the frontend, then prepare the backend.
    ///
    /// The backend sockets are opened by [`Relay::run`].
    pub fn open(config: &RelayConfig) -> Result<Self> {
        let publisher = config
            .frontend_bind
            .as_deref()
            .map(|addr| Publisher::open(addr, &config.options))
            .transpose()?;
        let pusher = if config.frontend_connect.is_empty() {
            None
        } else {
            Some(Pusher::open(&config.frontend_connect, &config.options)?)
        };

        if publisher.is_none() && pusher.is_none() {
            crate::log!("proxy"; "no frontend configured, received messages will be dropped");
        }

        let backend = Inbound::raw(
            config.backend_bind.as_deref(),
            &config.backend_connect,
            config.options.clone(),
            Frontend { publisher, pusher },
        )?;

        Ok(Self {
            backend,
            poll_interval: config.options.poll_interval,
        })
    }

    /// Address the frontend publisher is bound to, if any.
    pub fn frontend_addr(&self) -> Option<SocketAddr> {
        self.backend
            .handler()
            .publisher
            .as_ref()
            .map(Publisher::local_addr)
    }

    /// Relay until `cancel` is set, then close backend and frontend in
    /// that order.
    pub fn run(&mut self, cancel: &Cancellation) -> Result<()> {
        let result = if self.backend.is_idle() {
            crate::debug!("proxy"; "no backend configured, waiting for shutdown");
            while !cancel.is_cancelled() {
                thread::sleep(self.poll_interval);
            }
            Ok(())
        } else {
            self.backend.listen(cancel)
        };
        self.backend.handler_mut().close();
        crate::debug!("proxy"; "relay stopped");
        result
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::net::testing::{
        Collected, RawPush, RawSub, free_addr, listen_in_background, wait_until,
    };
    use crate::net::topic::Message;

    const WAIT: Duration = Duration::from_secs(5);

    fn fast_options() -> NetOptions {
        NetOptions {
            reconnect_interval: Duration::from_millis(20),
            poll_interval: Duration::from_millis(20),
            ..NetOptions::default()
        }
    }

    #[test]
    fn test_watch_through_relay_reaches_subscriber() {
        let backend = free_addr();
        let mut relay = Relay::open(&RelayConfig {
            backend_bind: Some(backend.clone()),
            frontend_bind: Some("127.0.0.1:0".into()),
            options: fast_options(),
            ..RelayConfig::default()
        })
        .unwrap();
        let frontend = relay.frontend_addr().unwrap().to_string();

        let cancel = Cancellation::new();
        let relay_cancel = cancel.clone();
        let relay_thread = thread::spawn(move || relay.run(&relay_cancel));

        let collected = Collected::default();
        let listener =
            listen_in_background(None, &[frontend], fast_options(), collected.clone(), &cancel);

        let pusher = Pusher::open(&[backend], &fast_options()).unwrap();
        // Keep sending until the relay's subscriber is attached (slow-joiner)
        assert!(wait_until(WAIT, || {
            pusher.send(Message::watch("host1", "/var/log/a.log")).unwrap();
            !collected.events().is_empty()
        }));

        cancel.cancel();
        relay_thread.join().unwrap().unwrap();
        listener.join().unwrap().unwrap();

        let events = collected.events();
        assert!(
            events
                .iter()
                .all(|e| e == "watch host1 /var/log/a.log"),
            "unexpected events: {events:?}"
        );
    }

    #[test]
    fn test_relay_forwards_identical_frames_to_both_frontends() {
        let backend = free_addr();
        let puller = free_addr();

        let pulled = Collected::default();
        let cancel = Cancellation::new();
        let pull_side = {
            let frames = pulled.clone();
            let cancel = cancel.clone();
            let mut inbound = Inbound::raw(
                Some(puller.as_str()),
                &[] as &[&str],
                fast_options(),
                move |message: Multipart| -> Result<()> {
                    frames.push_frames(&message);
                    Ok(())
                },
            )
            .unwrap();
            thread::spawn(move || inbound.listen(&cancel))
        };

        let mut relay = Relay::open(&RelayConfig {
            backend_bind: Some(backend.clone()),
            frontend_bind: Some("127.0.0.1:0".into()),
            frontend_connect: vec![puller],
            options: fast_options(),
            ..RelayConfig::default()
        })
        .unwrap();
        let frontend = relay.frontend_addr().unwrap().to_string();
        let mut sub = RawSub::connect(&frontend, &["log|"]);
        assert!(wait_until(WAIT, || {
            relay
                .backend
                .handler()
                .publisher
                .as_ref()
                .is_some_and(|p| p.subscriber_count() == 1)
        }));

        let relay_cancel = cancel.clone();
        let relay_thread = thread::spawn(move || relay.run(&relay_cancel));

        // Unknown kind and binary payloads: relays never decode
        let sent: Vec<Multipart> = (0u8..4)
            .map(|i| {
                Multipart::new(vec![
                    Bytes::from_static(b"log|custom|weird||field"),
                    Bytes::from(vec![0xff, i, 0xfe]),
                ])
            })
            .collect();
        let expected: Vec<String> = sent
            .iter()
            .map(|m| Collected::describe_frames(m.frames()))
            .collect();

        let mut push = RawPush::connect(&backend);
        for message in &sent {
            push.send(message);
        }

        let published: Vec<String> = (0..sent.len())
            .map(|_| Collected::describe_frames(sub.recv(WAIT).unwrap().frames()))
            .collect();
        assert!(wait_until(WAIT, || pulled.events().len() == sent.len()));

        cancel.cancel();
        relay_thread.join().unwrap().unwrap();
        pull_side.join().unwrap().unwrap();

        assert_eq!(published, expected);
        assert_eq!(pulled.events(), expected);
    }

    #[test]
    fn test_run_releases_both_sides() {
        let backend = free_addr();
        let mut relay = Relay::open(&RelayConfig {
            backend_bind: Some(backend.clone()),
            frontend_bind: Some("127.0.0.1:0".into()),
            options: fast_options(),
            ..RelayConfig::default()
        })
        .unwrap();
        let frontend = relay.frontend_addr().unwrap();

        let cancel = Cancellation::new();
        cancel.cancel();
        relay.run(&cancel).unwrap();

        assert!(std::net::TcpListener::bind(backend.as_str()).is_ok());
        assert!(std::net::TcpListener::bind(frontend).is_ok());
        // A second run on the spent backend is a lifecycle error
        assert!(matches!(relay.run(&cancel), Err(crate::net::NetError::Closed)));
    }

    #[test]
    fn test_run_without_backend_blocks_until_cancelled() {
        let mut relay = Relay::open(&RelayConfig {
            frontend_bind: Some("127.0.0.1:0".into()),
            options: fast_options(),
            ..RelayConfig::default()
        })
        .unwrap();
        let frontend = relay.frontend_addr().unwrap();

        let cancel = Cancellation::new();
        let relay_cancel = cancel.clone();
        let relay_thread = thread::spawn(move || relay.run(&relay_cancel));

        thread::sleep(Duration::from_millis(100));
        assert!(!relay_thread.is_finished());

        cancel.cancel();
        relay_thread.join().unwrap().unwrap();
        assert!(std::net::TcpListener::bind(frontend).is_ok());
    }
}
