//! HTTP reverse-proxy layer.
//!
//! [`ProxyServer`] splits binding from serving so the bound
//! [`ListenAddress`] is known before anything downstream needs it.

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

use crate::context::ListenAddress;

pub mod http;

pub use http::{create_router, ProxyError, ProxyState};

/// Errors that can occur when starting or running the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Failed to bind the listen address.
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The server stopped with an I/O error.
    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),

    /// The upstream HTTP client could not be built.
    #[error("Failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}

/// A bound, not yet serving, proxy listener.
pub struct ProxyServer {
    listener: TcpListener,
    listen: ListenAddress,
}

impl ProxyServer {
    /// Binds `addr`. Port `0` picks an ephemeral port.
    pub async fn bind(addr: SocketAddr) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let listen = ListenAddress::from_listener(&listener)
            .map_err(|source| ServerError::Bind { addr, source })?;
        Ok(Self { listener, listen })
    }

    /// Returns the address actually bound.
    #[must_use]
    pub fn listen_address(&self) -> ListenAddress {
        self.listen
    }

    /// Serves until the task is dropped or aborted.
    ///
    /// There is no graceful drain: in-flight requests end with the process.
    pub async fn serve(self, state: ProxyState) -> Result<(), ServerError> {
        log::info!("[Proxy] Listening on {}", self.listen);
        let app = create_router(state);

        // ConnectInfo<SocketAddr> gives the handler the client address.
        axum::serve(
            self.listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await?;
        Ok(())
    }
}
