//! Background listener dispatching M-SEARCH queries to the advertiser.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::advertiser::PresenceAdvertiser;
use super::message::parse_search;
use crate::protocol_constants::SSDP_MAX_DATAGRAM;

/// Handle to the running search listener.
pub struct SearchMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl SearchMonitor {
    /// Spawns the listener on `socket`. It runs until `cancel` fires or
    /// [`stop`](Self::stop) is called.
    pub fn spawn(
        socket: UdpSocket,
        advertiser: Arc<PresenceAdvertiser>,
        cancel: CancellationToken,
    ) -> Self {
        let handle = tokio::spawn(run(socket, advertiser, cancel.clone()));
        Self { cancel, handle }
    }

    /// Stops the listener and waits for it to exit.
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            log::warn!("[Ssdp] Search monitor task failed: {}", e);
        }
    }
}

async fn run(socket: UdpSocket, advertiser: Arc<PresenceAdvertiser>, cancel: CancellationToken) {
    let mut buf = [0u8; SSDP_MAX_DATAGRAM];
    log::debug!(
        "[Ssdp] Search monitor listening on {:?}",
        socket.local_addr().ok()
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((len, source)) => {
                    let Some(request) = parse_search(&buf[..len], source) else {
                        continue;
                    };
                    if let Err(e) = advertiser.on_search(&request) {
                        log::warn!("[Ssdp] Failed to answer search from {}: {}", source, e);
                    }
                }
                Err(e) => log::debug!("[Ssdp] Receive error: {}", e),
            },
        }
    }

    log::debug!("[Ssdp] Search monitor stopped");
}
