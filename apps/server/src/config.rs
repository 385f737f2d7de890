//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! Command-line flags are applied on top in `main.rs`.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use relay_core::protocol_constants::{
    BOOTSTRAP_RETRY_SECS, DEFAULT_ALIVE_INTERVAL_SECS, DEFAULT_ENCODER_PROGRAM,
    DEFAULT_MAX_AGE_SECS,
};
use relay_core::{AdvertiseInterface, IdentityOverrides};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interface to advertise on.
    /// Override: `RELAY_IFNAME`
    pub ifname: Option<String>,

    /// Address to bind the proxy to; must belong to a private interface.
    /// Override: `RELAY_BIND`
    pub bind: Option<Ipv4Addr>,

    /// Port to bind the proxy to (`0` = ephemeral).
    /// Override: `RELAY_PORT`
    pub port: u16,

    /// `host:port` of the backend media server.
    /// Override: `RELAY_TARGET`
    pub target: Option<String>,

    /// File receiving the process id.
    /// Override: `RELAY_PIDFILE`
    pub pidfile: Option<PathBuf>,

    /// Transcode OGG audio to FLAC (experimental).
    /// Override: `RELAY_TRANSCODE`
    pub transcode: bool,

    /// Encoder executable used for transcoding.
    /// Override: `RELAY_ENCODER`
    pub encoder: String,

    /// SSDP CACHE-CONTROL max-age in seconds.
    /// Override: `RELAY_MAX_AGE`
    pub max_age: u32,

    /// Seconds between alive announcements.
    /// Override: `RELAY_ALIVE_INTERVAL`
    pub alive_interval: u64,

    /// Seconds between failed `rootDesc.xml` fetches.
    /// Override: `RELAY_BOOTSTRAP_RETRY_INTERVAL`
    pub bootstrap_retry_interval: u64,

    /// Device UUID; skips waiting for the backend when set.
    /// Override: `RELAY_UUID`
    pub uuid: String,

    /// Override: `RELAY_FRIENDLY_NAME`
    pub friendly_name: String,

    /// Override: `RELAY_DEVICE_TYPE`
    pub device_type: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ifname: None,
            bind: None,
            port: 0,
            target: None,
            pidfile: None,
            transcode: false,
            encoder: DEFAULT_ENCODER_PROGRAM.to_string(),
            max_age: DEFAULT_MAX_AGE_SECS,
            alive_interval: DEFAULT_ALIVE_INTERVAL_SECS,
            bootstrap_retry_interval: BOOTSTRAP_RETRY_SECS,
            uuid: String::new(),
            friendly_name: String::new(),
            device_type: String::new(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `RELAY_*` overrides read through `lookup`.
    ///
    /// Values that fail to parse are ignored with a warning.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        fn parsed<T: std::str::FromStr>(key: &str, val: String) -> Option<T> {
            let parsed = val.parse().ok();
            if parsed.is_none() {
                log::warn!("Ignoring invalid {}={}", key, val);
            }
            parsed
        }

        if let Some(val) = lookup("RELAY_IFNAME") {
            self.ifname = Some(val);
        }
        if let Some(ip) = lookup("RELAY_BIND").and_then(|v| parsed("RELAY_BIND", v)) {
            self.bind = Some(ip);
        }
        if let Some(port) = lookup("RELAY_PORT").and_then(|v| parsed("RELAY_PORT", v)) {
            self.port = port;
        }
        if let Some(val) = lookup("RELAY_TARGET") {
            self.target = Some(val);
        }
        if let Some(val) = lookup("RELAY_PIDFILE") {
            self.pidfile = Some(PathBuf::from(val));
        }
        if let Some(on) = lookup("RELAY_TRANSCODE").and_then(|v| parsed("RELAY_TRANSCODE", v)) {
            self.transcode = on;
        }
        if let Some(val) = lookup("RELAY_ENCODER") {
            self.encoder = val;
        }
        if let Some(age) = lookup("RELAY_MAX_AGE").and_then(|v| parsed("RELAY_MAX_AGE", v)) {
            self.max_age = age;
        }
        if let Some(secs) =
            lookup("RELAY_ALIVE_INTERVAL").and_then(|v| parsed("RELAY_ALIVE_INTERVAL", v))
        {
            self.alive_interval = secs;
        }
        if let Some(secs) = lookup("RELAY_BOOTSTRAP_RETRY_INTERVAL")
            .and_then(|v| parsed("RELAY_BOOTSTRAP_RETRY_INTERVAL", v))
        {
            self.bootstrap_retry_interval = secs;
        }
        if let Some(val) = lookup("RELAY_UUID") {
            self.uuid = val;
        }
        if let Some(val) = lookup("RELAY_FRIENDLY_NAME") {
            self.friendly_name = val;
        }
        if let Some(val) = lookup("RELAY_DEVICE_TYPE") {
            self.device_type = val;
        }
    }

    /// Converts to relay-core's Config type for the selected interface.
    pub fn to_core_config(&self, interface: AdvertiseInterface) -> Result<relay_core::Config> {
        let target = self
            .target
            .clone()
            .filter(|t| !t.trim().is_empty())
            .context("No target specified (--target or RELAY_TARGET)")?;

        let mut config = relay_core::Config::new(interface, target);
        if let Some(bind) = self.bind {
            config.bind_ip = IpAddr::V4(bind);
        }
        config.bind_port = self.port;
        config.identity = IdentityOverrides {
            uuid: self.uuid.clone(),
            device_type: self.device_type.clone(),
            friendly_name: self.friendly_name.clone(),
        };
        config.transcode = self.transcode;
        config.encoder_program = self.encoder.clone();
        config.max_age = self.max_age;
        config.alive_interval = Duration::from_secs(self.alive_interval);
        config.bootstrap_retry_interval = Duration::from_secs(self.bootstrap_retry_interval);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn eth0() -> AdvertiseInterface {
        AdvertiseInterface {
            name: "eth0".into(),
            ip: Ipv4Addr::new(192, 168, 1, 10),
        }
    }

    #[test]
    fn defaults_match_relay_defaults() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 0);
        assert_eq!(config.max_age, 1800);
        assert_eq!(config.alive_interval, 10);
        assert_eq!(config.encoder, "ffmpeg");
        assert!(!config.transcode);
    }

    #[test]
    fn loads_partial_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "target: \"192.168.1.50:8200\"\nport: 9000\ntranscode: true\nfriendly_name: Relay"
        )
        .unwrap();

        let config = ServerConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.target.as_deref(), Some("192.168.1.50:8200"));
        assert_eq!(config.port, 9000);
        assert!(config.transcode);
        assert_eq!(config.friendly_name, "Relay");
        assert_eq!(config.max_age, 1800);
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "port: [not a port").unwrap();
        assert!(ServerConfig::load(Some(file.path())).is_err());
    }

    #[test]
    fn env_overrides_replace_file_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("RELAY_TARGET", "10.0.0.2:8200"),
            ("RELAY_PORT", "9100"),
            ("RELAY_BIND", "10.0.0.1"),
            ("RELAY_TRANSCODE", "true"),
            ("RELAY_ALIVE_INTERVAL", "nope"),
        ]);
        let mut config = ServerConfig {
            target: Some("192.168.1.50:8200".into()),
            ..Default::default()
        };

        config.apply_env_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.target.as_deref(), Some("10.0.0.2:8200"));
        assert_eq!(config.port, 9100);
        assert_eq!(config.bind, Some(Ipv4Addr::new(10, 0, 0, 1)));
        assert!(config.transcode);
        // Invalid values keep the previous setting.
        assert_eq!(config.alive_interval, 10);
    }

    #[test]
    fn core_config_carries_every_setting() {
        let config = ServerConfig {
            target: Some("192.168.1.50:8200".into()),
            port: 9000,
            uuid: "uuid:fixed".into(),
            alive_interval: 30,
            ..Default::default()
        };

        let core = config.to_core_config(eth0()).unwrap();
        assert_eq!(core.backend, "192.168.1.50:8200");
        assert_eq!(core.bind_addr().to_string(), "192.168.1.10:9000");
        assert_eq!(core.identity.uuid, "uuid:fixed");
        assert_eq!(core.alive_interval, Duration::from_secs(30));
        assert!(core.validate().is_ok());
    }

    #[test]
    fn bind_address_moves_only_the_listener() {
        let config = ServerConfig {
            target: Some("192.168.1.50:8200".into()),
            bind: Some(Ipv4Addr::new(10, 0, 0, 5)),
            port: 9000,
            ..Default::default()
        };

        let core = config.to_core_config(eth0()).unwrap();
        assert_eq!(core.bind_addr().to_string(), "10.0.0.5:9000");
        assert_eq!(core.interface.ip, Ipv4Addr::new(192, 168, 1, 10));
    }

    #[test]
    fn missing_target_is_an_error() {
        assert!(ServerConfig::default().to_core_config(eth0()).is_err());
        let blank = ServerConfig {
            target: Some("  ".into()),
            ..Default::default()
        };
        assert!(blank.to_core_config(eth0()).is_err());
    }
}
