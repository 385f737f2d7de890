//! Network addressing shared across the relay.
//!
//! [`ListenAddress`] is the relay's own `ip:port`, resolved from the bound
//! socket. It is what clients must see everywhere: in rewritten XML bodies and
//! in the LOCATION advertised over SSDP. [`UrlBuilder`] derives the URLs the
//! relay needs for both itself and the backend.

use std::fmt;
use std::net::SocketAddr;

use crate::protocol_constants::DESCRIPTION_PATH;

/// The relay's bound listen address.
///
/// Always built from the socket after binding, never from configuration,
/// so a configured port of `0` resolves to the port the OS assigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenAddress(SocketAddr);

impl ListenAddress {
    /// Wraps an already-resolved socket address.
    #[must_use]
    pub fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    /// Resolves the address a listener is actually bound to.
    pub fn from_listener(listener: &tokio::net::TcpListener) -> std::io::Result<Self> {
        listener.local_addr().map(Self)
    }

    /// Returns the underlying socket address.
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    /// Returns the bound port.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns a `UrlBuilder` rooted at this address.
    #[must_use]
    pub fn url_builder(&self) -> UrlBuilder {
        UrlBuilder::new(self.to_string())
    }
}

impl fmt::Display for ListenAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<SocketAddr> for ListenAddress {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

/// Builder for URLs on a single `host:port` authority.
#[derive(Debug, Clone)]
pub struct UrlBuilder {
    authority: String,
}

impl UrlBuilder {
    /// Creates a builder for the given `host:port`.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
        }
    }

    /// Returns the base URL (e.g., `http://192.168.1.50:8200`).
    #[must_use]
    pub fn base_url(&self) -> String {
        format!("http://{}", self.authority)
    }

    /// Returns the URL of the device-description document.
    #[must_use]
    pub fn description_url(&self) -> String {
        format!("{}{}", self.base_url(), DESCRIPTION_PATH)
    }

    /// Returns the URL for a request target (`/path?query`) on this authority.
    #[must_use]
    pub fn request_url(&self, path_and_query: &str) -> String {
        if path_and_query.starts_with('/') {
            format!("{}{}", self.base_url(), path_and_query)
        } else {
            format!("{}/{}", self.base_url(), path_and_query)
        }
    }
}
