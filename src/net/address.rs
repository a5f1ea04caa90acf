//! `<host>:<port>` endpoint addresses.

use std::io;
use std::net::{SocketAddr, TcpListener, ToSocketAddrs};

use super::error::{NetError, Result};

/// Optional scheme accepted in front of addresses (`tcp://127.0.0.1:9000`).
const SCHEME: &str = "tcp://";

/// Validated endpoint address, kept as the user wrote it minus the scheme.
///
/// Host names are resolved lazily (at bind/connect time) so a connect
/// address may name a peer that does not resolve yet.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint(String);

impl Endpoint {
    /// Parse and validate an address of the form `<host>:<port>`.
    pub fn parse(raw: &str) -> Result<Self> {
        let addr = raw.trim();
        let addr = addr.strip_prefix(SCHEME).unwrap_or(addr);

        let Some((host, port)) = addr.rsplit_once(':') else {
            return Err(NetError::InvalidAddress(raw.to_string()));
        };
        if host.is_empty() || port.parse::<u16>().is_err() {
            return Err(NetError::InvalidAddress(raw.to_string()));
        }

        Ok(Self(addr.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve to socket addresses (may hit DNS).
    pub fn resolve(&self) -> io::Result<Vec<SocketAddr>> {
        Ok(self.0.to_socket_addrs()?.collect())
    }

    /// Bind a listener on this address.
    pub fn bind(&self) -> Result<TcpListener> {
        TcpListener::bind(self.0.as_str()).map_err(|e| NetError::bind(self.0.as_str(), e))
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse a bind address; malformed input is reported as a bind failure.
pub fn parse_bind(raw: &str) -> Result<Endpoint> {
    Endpoint::parse(raw).map_err(|_| {
        NetError::bind(
            raw,
            io::Error::new(io::ErrorKind::InvalidInput, "expected <host>:<port>"),
        )
    })
}

/// Parse a list of connect addresses.
pub fn parse_connect<S: AsRef<str>>(raw: &[S]) -> Result<Vec<Endpoint>> {
    raw.iter().map(|a| Endpoint::parse(a.as_ref())).collect()
}
