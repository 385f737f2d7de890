//! Relay configuration as plain values.
//!
//! Built by the application layer from flags, files and environment; the
//! core only reads it.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use crate::context::UrlBuilder;
use crate::error::{RelayError, RelayResult};
use crate::identity::IdentityOverrides;
use crate::protocol_constants::{
    BOOTSTRAP_RETRY_SECS, DEFAULT_ALIVE_INTERVAL_SECS, DEFAULT_ENCODER_PROGRAM,
    DEFAULT_MAX_AGE_SECS,
};

/// Network interface SSDP sends and listens on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertiseInterface {
    /// Interface name (e.g., "eth0").
    pub name: String,
    /// IPv4 address on that interface.
    pub ip: Ipv4Addr,
}

/// Everything the relay needs to run.
#[derive(Debug, Clone)]
pub struct Config {
    pub interface: AdvertiseInterface,
    /// Address the HTTP listener binds.
    pub bind_ip: IpAddr,
    /// `0` lets the OS pick.
    pub bind_port: u16,
    /// `host:port` of the backend media server.
    pub backend: String,
    pub identity: IdentityOverrides,
    /// Transcode `audio/ogg` responses to FLAC.
    pub transcode: bool,
    /// Encoder executable used when transcoding.
    pub encoder_program: String,
    /// CACHE-CONTROL max-age in seconds.
    pub max_age: u32,
    /// Period of unsolicited alive announcements.
    pub alive_interval: Duration,
    /// Wait between failed description fetches.
    pub bootstrap_retry_interval: Duration,
}

impl Config {
    /// Creates a config with defaults, binding on the interface address.
    pub fn new(interface: AdvertiseInterface, backend: impl Into<String>) -> Self {
        Self {
            bind_ip: IpAddr::V4(interface.ip),
            interface,
            bind_port: 0,
            backend: backend.into(),
            identity: IdentityOverrides::default(),
            transcode: false,
            encoder_program: DEFAULT_ENCODER_PROGRAM.to_string(),
            max_age: DEFAULT_MAX_AGE_SECS,
            alive_interval: Duration::from_secs(DEFAULT_ALIVE_INTERVAL_SECS),
            bootstrap_retry_interval: Duration::from_secs(BOOTSTRAP_RETRY_SECS),
        }
    }

    /// Returns the socket address to bind.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip, self.bind_port)
    }

    /// Returns the URL builder for the backend.
    #[must_use]
    pub fn backend_urls(&self) -> UrlBuilder {
        UrlBuilder::new(self.backend.clone())
    }

    /// Rejects configurations the relay cannot start with.
    pub fn validate(&self) -> RelayResult<()> {
        if self.backend.trim().is_empty() {
            return Err(RelayError::Configuration(
                "backend address is required".into(),
            ));
        }

        let base = self.backend_urls().base_url() + "/";
        let url = reqwest::Url::parse(&base).map_err(|e| {
            RelayError::Configuration(format!("invalid backend '{}': {}", self.backend, e))
        })?;
        if url.host_str().is_none() || url.path() != "/" || url.query().is_some() {
            return Err(RelayError::Configuration(format!(
                "backend must be host:port, got '{}'",
                self.backend
            )));
        }

        if self.alive_interval.is_zero() {
            return Err(RelayError::Configuration(
                "alive interval must be greater than zero".into(),
            ));
        }
        if self.bootstrap_retry_interval.is_zero() {
            return Err(RelayError::Configuration(
                "bootstrap retry interval must be greater than zero".into(),
            ));
        }
        if self.transcode && self.encoder_program.trim().is_empty() {
            return Err(RelayError::Configuration(
                "transcoding needs an encoder program".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(backend: &str) -> Config {
        Config::new(
            AdvertiseInterface {
                name: "eth0".into(),
                ip: Ipv4Addr::new(192, 168, 1, 10),
            },
            backend,
        )
    }

    #[test]
    fn defaults_follow_interface() {
        let c = config("192.168.1.50:8200");
        assert_eq!(c.bind_addr().to_string(), "192.168.1.10:0");
        assert_eq!(c.max_age, 1800);
        assert_eq!(c.alive_interval, Duration::from_secs(10));
        assert_eq!(c.bootstrap_retry_interval, Duration::from_secs(60));
        assert_eq!(c.encoder_program, "ffmpeg");
        assert!(!c.transcode);
        assert!(c.validate().is_ok());
    }

    #[test]
    fn accepts_hostnames() {
        assert!(config("nas.local:8200").validate().is_ok());
        assert!(config("nas").validate().is_ok());
    }

    #[test]
    fn rejects_malformed_backend() {
        for bad in ["", "   ", "192.168.1.50:notaport", "host:8200/path", "host:1?x=1", "[::1"] {
            let err = config(bad).validate().unwrap_err();
            assert_eq!(err.code(), "configuration_error", "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_zero_intervals() {
        let mut c = config("192.168.1.50:8200");
        c.alive_interval = Duration::ZERO;
        assert!(c.validate().is_err());

        let mut c = config("192.168.1.50:8200");
        c.bootstrap_retry_interval = Duration::ZERO;
        assert!(c.validate().is_err());
    }

    #[test]
    fn transcoding_requires_encoder() {
        let mut c = config("192.168.1.50:8200");
        c.transcode = true;
        c.encoder_program = String::new();
        assert!(c.validate().is_err());
    }
}
