//! Relay startup and main loop.
//!
//! Strict order:
//! 1. bind and start the proxy in the background
//! 2. resolve the listen address from the bound socket
//! 3. resolve the device identity (may retry for a long time)
//! 4. start SSDP presence
//! 5. heartbeat until shutdown, then withdraw
//!
//! The proxy serves from step 1 on, even while the identity is still retrying.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::api::{ProxyServer, ProxyState, ServerError};
use crate::config::Config;
use crate::context::ListenAddress;
use crate::error::RelayResult;
use crate::identity::{DeviceIdentityResolver, HttpDescriptionFetcher, IdentityError};
use crate::lifecycle::run_heartbeat;
use crate::rewrite::{ExternalTranscoder, ResponseRewritePipeline};
use crate::ssdp::{
    bind_search_socket, AdvertisementSession, MulticastTransport, PresenceAdvertiser,
    SearchMonitor, SsdpTransport,
};

/// Runs the relay until `shutdown` is cancelled, announcing over multicast on
/// the configured interface.
///
/// Cancelling during identity bootstrap is a clean exit: nothing was ever
/// advertised, so nothing is withdrawn.
pub async fn run(config: Config, shutdown: CancellationToken) -> RelayResult<()> {
    config.validate()?;
    let transport = MulticastTransport::bind(config.interface.ip)?;
    run_with(config, Arc::new(transport), shutdown).await
}

/// Same as [`run`], announcing through `transport`.
pub async fn run_with(
    config: Config,
    transport: Arc<dyn SsdpTransport>,
    shutdown: CancellationToken,
) -> RelayResult<()> {
    config.validate()?;

    let server = ProxyServer::bind(config.bind_addr()).await?;
    let listen = server.listen_address();
    let state = ProxyState::new(config.backend_urls(), build_pipeline(&config, &listen))
        .map_err(ServerError::from)?;
    let proxy = spawn_proxy(server, state);

    let outcome = advertise(&config, listen, transport, &shutdown).await;

    proxy.abort();
    outcome
}

fn build_pipeline(config: &Config, listen: &ListenAddress) -> ResponseRewritePipeline {
    let pipeline = ResponseRewritePipeline::new(listen);
    if config.transcode {
        log::info!(
            "[Relay] Transcoding OGG to FLAC with '{}' (experimental)",
            config.encoder_program
        );
        pipeline.with_transcoder(Arc::new(ExternalTranscoder::ffmpeg(
            config.encoder_program.clone(),
        )))
    } else {
        pipeline
    }
}

fn spawn_proxy(server: ProxyServer, state: ProxyState) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = server.serve(state).await {
            log::error!("[Proxy] Server stopped: {}", e);
        }
    })
}

/// Steps 3 to 5.
async fn advertise(
    config: &Config,
    listen: ListenAddress,
    transport: Arc<dyn SsdpTransport>,
    shutdown: &CancellationToken,
) -> RelayResult<()> {
    let fetcher = HttpDescriptionFetcher::new(&config.backend_urls())?;
    log::info!("[Relay] Resolving device identity from {}", fetcher.url());
    let resolver =
        DeviceIdentityResolver::new(Arc::new(fetcher), config.bootstrap_retry_interval);

    let identity = match resolver.resolve(&config.identity, shutdown).await {
        Ok(identity) => identity,
        Err(IdentityError::Cancelled) => {
            log::info!("[Relay] Shutdown requested before identity was resolved");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    log::info!(
        "[Relay] deviceType {}, uuid {}, friendlyName {}",
        identity.device_type,
        identity.uuid,
        identity.friendly_name
    );

    let iface = config.interface.ip;
    let advertiser = Arc::new(PresenceAdvertiser::new(transport));
    advertiser.start(AdvertisementSession::new(
        iface,
        identity,
        listen.url_builder().description_url(),
        config.max_age,
    ))?;

    // Without the search socket the relay still advertises on the heartbeat.
    let monitor = match bind_search_socket(iface) {
        Ok(socket) => Some(SearchMonitor::spawn(
            socket,
            advertiser.clone(),
            shutdown.child_token(),
        )),
        Err(e) => {
            log::warn!(
                "[Ssdp] Not answering searches on {} ({}): {}",
                config.interface.name,
                iface,
                e
            );
            None
        }
    };

    let withdrawn = run_heartbeat(&advertiser, config.alive_interval, shutdown).await;

    if let Some(monitor) = monitor {
        monitor.stop().await;
    }
    if let Err(e) = withdrawn {
        log::warn!("[Ssdp] Failed to send bye: {}", e);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdvertiseInterface;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    fn loopback_config(backend: String) -> Config {
        Config::new(
            AdvertiseInterface {
                name: "lo".into(),
                ip: Ipv4Addr::LOCALHOST,
            },
            backend,
        )
    }

    #[tokio::test]
    async fn invalid_config_fails_before_binding() {
        let err = run(loopback_config(String::new()), CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err.code(), "configuration_error");
    }

    #[tokio::test]
    async fn shutdown_during_bootstrap_is_a_clean_exit() {
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            canceller.cancel();
        });

        let outcome = tokio::time::timeout(
            Duration::from_secs(10),
            run(loopback_config(closed.to_string()), token),
        )
        .await
        .expect("bootstrap must be interruptible");
        assert!(outcome.is_ok());
    }

    #[tokio::test]
    async fn advertises_assigned_port_and_withdraws_once() {
        use crate::identity::IdentityOverrides;
        use crate::ssdp::advertiser::tests::RecordingTransport;

        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let mut config = loopback_config(closed.to_string());
        config.bind_port = 0;
        config.identity = IdentityOverrides {
            uuid: "uuid:relay-e2e".into(),
            device_type: "urn:schemas-upnp-org:device:MediaServer:1".into(),
            friendly_name: "Relay".into(),
        };

        let transport = Arc::new(RecordingTransport::default());
        let token = CancellationToken::new();
        let relay = tokio::spawn(run_with(config, transport.clone(), token.clone()));

        let alive = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Some(m) = transport
                    .messages()
                    .into_iter()
                    .find(|m| m.contains("NTS: ssdp:alive\r\n"))
                {
                    return m;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("relay should announce once identity is known");

        let location = alive
            .lines()
            .find_map(|l| l.strip_prefix("LOCATION: "))
            .unwrap()
            .to_string();
        let port: u16 = location
            .strip_prefix("http://127.0.0.1:")
            .and_then(|rest| rest.strip_suffix("/rootDesc.xml"))
            .and_then(|p| p.parse().ok())
            .unwrap_or_else(|| panic!("unexpected LOCATION {location}"));
        assert_ne!(port, 0);
        assert!(alive.contains("USN: uuid:relay-e2e\r\n"));

        // The advertised port is the one actually serving: the backend is
        // closed, so the relay answers 502 itself.
        let resp = reqwest::get(&location).await.unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::BAD_GATEWAY);

        token.cancel();
        assert!(relay.await.unwrap().is_ok());

        let messages = transport.messages();
        assert_eq!(transport.count("ssdp:byebye"), 1);
        assert!(messages.last().is_some_and(|m| m.contains("NTS: ssdp:byebye\r\n")));
        assert!(transport.count("ssdp:alive") >= 1);
    }

    #[tokio::test]
    async fn blank_uuid_override_fails_to_advertise() {
        use crate::identity::IdentityOverrides;
        use crate::ssdp::advertiser::tests::RecordingTransport;

        let mut config = loopback_config("127.0.0.1:1".into());
        config.identity = IdentityOverrides {
            uuid: " ".into(),
            device_type: "t".into(),
            friendly_name: "n".into(),
        };
        let transport = Arc::new(RecordingTransport::default());

        let err = run_with(config, transport.clone(), CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.code(), "ssdp_missing_uuid");
        assert!(transport.messages().is_empty());
    }

    #[tokio::test]
    async fn proxy_serves_while_identity_is_pending() {
        use axum::{http::header, routing::get, Router};

        // Backend without rootDesc.xml: bootstrap keeps retrying.
        let backend = Router::new().route(
            "/ctl/ContentDir",
            get(|| async { ([(header::CONTENT_TYPE, "text/xml")], "<u>127.0.0.1:1</u>") }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let backend_addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, backend).await });

        // Reserve a port for the relay so the test knows where it listens.
        let relay_port = {
            let probe = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            probe.local_addr().unwrap().port()
        };
        let mut config = loopback_config(backend_addr.to_string());
        config.bind_port = relay_port;

        let token = CancellationToken::new();
        let relay = tokio::spawn(run(config, token.clone()));

        let url = format!("http://127.0.0.1:{}/ctl/ContentDir", relay_port);
        let body = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(resp) = reqwest::get(&url).await {
                    return resp.text().await.unwrap();
                }
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("relay should serve before identity resolves");
        assert_eq!(body, format!("<u>127.0.0.1:{}</u>", relay_port));

        token.cancel();
        assert!(relay.await.unwrap().is_ok());
    }
}
