//! `logmesh proxy`: relay messages between two sides.

use anyhow::{Context, Result};

use super::args::{PROXY_BACKEND_BIND, PROXY_FRONTEND_BIND, ProxyArgs};
use super::common::{default_addresses, join_addresses, net_options};
use crate::config::Config;
use crate::core::Cancellation;
use crate::log;
use crate::net::{Relay, RelayConfig};

/// Relay addresses with the default binds filled in.
pub fn relay_config(args: &ProxyArgs, config: &Config) -> RelayConfig {
    RelayConfig {
        backend_bind: default_addresses(
            args.backend_bind.as_deref(),
            &args.backend_connect,
            PROXY_BACKEND_BIND,
        ),
        backend_connect: args.backend_connect.clone(),
        frontend_bind: default_addresses(
            args.frontend_bind.as_deref(),
            &args.frontend_connect,
            PROXY_FRONTEND_BIND,
        ),
        frontend_connect: args.frontend_connect.clone(),
        options: net_options(config, args.interval),
    }
}

pub fn run_proxy(args: &ProxyArgs, config: &Config, cancel: &Cancellation) -> Result<()> {
    let relay_config = relay_config(args, config);

    log!(
        "proxy";
        "backend: bind {} / connect {}",
        relay_config.backend_bind.as_deref().unwrap_or("-"),
        join_addresses(&relay_config.backend_connect)
    );
    log!(
        "proxy";
        "frontend: bind {} / connect {}",
        relay_config.frontend_bind.as_deref().unwrap_or("-"),
        join_addresses(&relay_config.frontend_connect)
    );

    let mut relay = Relay::open(&relay_config).context("failed to open relay")?;
    if let Some(addr) = relay.frontend_addr() {
        crate::debug!("proxy"; "frontend bound to {}", addr);
    }
    relay.run(cancel).context("relay failed")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> ProxyArgs {
        ProxyArgs {
            backend_bind: None,
            backend_connect: Vec::new(),
            frontend_bind: None,
            frontend_connect: Vec::new(),
            interval: None,
            common: Default::default(),
        }
    }

    #[test]
    fn test_defaults_bind_both_sides() {
        let config = relay_config(&args(), &Config::default());
        assert_eq!(config.backend_bind.as_deref(), Some(PROXY_BACKEND_BIND));
        assert_eq!(config.frontend_bind.as_deref(), Some(PROXY_FRONTEND_BIND));
    }

    #[test]
    fn test_connect_suppresses_default_bind() {
        let args = ProxyArgs {
            backend_connect: vec!["10.0.0.1:9000".into()],
            frontend_connect: vec!["10.0.0.2:9001".into()],
            interval: Some(30),
            ..args()
        };
        let config = relay_config(&args, &Config::default());
        assert_eq!(config.backend_bind, None);
        assert_eq!(config.frontend_bind, None);
        assert_eq!(config.backend_connect, ["10.0.0.1:9000"]);
        assert_eq!(
            config.options.poll_interval,
            std::time::Duration::from_millis(30)
        );
    }
}
