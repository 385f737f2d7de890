//! Relay Server - standalone DLNA relay.
//!
//! Fronts a backend media server: advertises it over SSDP under its own
//! identity, proxies its HTTP traffic, and rewrites embedded addresses so
//! clients only ever talk to the relay.

mod config;
mod interfaces;
mod pidfile;

use std::net::Ipv4Addr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;

use crate::config::ServerConfig;
use crate::interfaces::{list_candidates, select_interface};
use crate::pidfile::PidFile;

/// Relay Server - DLNA/UPnP relay with SSDP advertisement.
#[derive(Parser, Debug)]
#[command(name = "relay-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file (YAML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(short, long, default_value = "info", env = "RELAY_LOG_LEVEL")]
    log_level: log::LevelFilter,

    /// Verbose mode: log every request and search (same as --log-level debug).
    #[arg(short, long)]
    verbose: bool,

    /// Interface to advertise on.
    #[arg(long)]
    ifname: Option<String>,

    /// Address to bind the proxy to.
    #[arg(long)]
    bind: Option<Ipv4Addr>,

    /// Port to bind the proxy to (0 = ephemeral).
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// IP and port of the backend media server.
    #[arg(short, long, value_name = "HOST:PORT")]
    target: Option<String>,

    /// Write the process id to this file.
    #[arg(long, value_name = "FILE")]
    pidfile: Option<PathBuf>,

    /// Transcode OGG audio to FLAC (experimental).
    #[arg(long)]
    transcode: bool,

    /// Encoder executable used for transcoding.
    #[arg(long, value_name = "PROGRAM")]
    encoder: Option<String>,

    /// SSDP CACHE-CONTROL max-age in seconds.
    #[arg(long = "maxage")]
    max_age: Option<u32>,

    /// Seconds between alive announcements.
    #[arg(long = "ai")]
    alive_interval: Option<u64>,

    /// Device UUID (skips reading it from the backend).
    #[arg(long)]
    uuid: Option<String>,

    /// Friendly name to advertise.
    #[arg(long)]
    friendly_name: Option<String>,

    /// Device type to advertise.
    #[arg(long)]
    device_type: Option<String>,
}

impl Args {
    /// Applies command-line flags over file and environment settings.
    fn apply_to(self, config: &mut ServerConfig) {
        if let Some(ifname) = self.ifname {
            config.ifname = Some(ifname);
        }
        if let Some(bind) = self.bind {
            config.bind = Some(bind);
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(target) = self.target {
            config.target = Some(target);
        }
        if let Some(pidfile) = self.pidfile {
            config.pidfile = Some(pidfile);
        }
        if self.transcode {
            config.transcode = true;
        }
        if let Some(encoder) = self.encoder {
            config.encoder = encoder;
        }
        if let Some(max_age) = self.max_age {
            config.max_age = max_age;
        }
        if let Some(secs) = self.alive_interval {
            config.alive_interval = secs;
        }
        if let Some(uuid) = self.uuid {
            config.uuid = uuid;
        }
        if let Some(name) = self.friendly_name {
            config.friendly_name = name;
        }
        if let Some(device_type) = self.device_type {
            config.device_type = device_type;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose {
        args.log_level.max(log::LevelFilter::Debug)
    } else {
        args.log_level
    };
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();

    log::info!("Relay Server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let mut config =
        ServerConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    let config_path = args.config.clone();
    args.apply_to(&mut config);
    if let Some(path) = config_path {
        log::info!("Loaded configuration from {}", path.display());
    }

    let candidates = list_candidates().context("Failed to list network interfaces")?;
    let interface = select_interface(&candidates, config.ifname.as_deref(), config.bind)?;
    log::info!(
        "Configuration: interface={} ({}), port={}, target={}",
        interface.name,
        interface.ip,
        config.port,
        config.target.as_deref().unwrap_or("-")
    );

    let core_config = config.to_core_config(interface)?;
    core_config.validate()?;

    let _pidfile = config
        .pidfile
        .as_deref()
        .map(PidFile::create)
        .transpose()?;

    // Signals cancel the relay; it withdraws its advertisement before returning.
    let shutdown = CancellationToken::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        log::info!("Shutdown signal received, cleaning up...");
        trigger.cancel();
    });

    relay_core::run(core_config, shutdown)
        .await
        .context("Relay failed")?;

    log::info!("Shutdown complete");
    Ok(())
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
