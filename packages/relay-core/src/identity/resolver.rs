//! Identity resolution with unbounded, cancellable retry.

use std::io;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::TryStreamExt;
use reqwest::Client;
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;

use super::description::{parse_description, DescriptionFields};
use super::{DeviceIdentity, IdentityError, IdentityOverrides, IdentityResult};
use crate::context::UrlBuilder;
use crate::protocol_constants::DESCRIPTION_FETCH_TIMEOUT_SECS;

/// Source of the backend's device-description fields.
#[async_trait]
pub trait DescriptionFetcher: Send + Sync {
    /// Fetches and parses the description document once.
    async fn fetch(&self) -> IdentityResult<DescriptionFields>;
}

/// Fetches `rootDesc.xml` from the backend over HTTP.
///
/// The body is fed to the parser as it arrives rather than buffered whole.
pub struct HttpDescriptionFetcher {
    client: Client,
    url: String,
}

impl HttpDescriptionFetcher {
    /// Creates a fetcher for the description document of `backend`.
    pub fn new(backend: &UrlBuilder) -> IdentityResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DESCRIPTION_FETCH_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_client(client, backend))
    }

    /// Creates a fetcher using an existing client.
    pub fn with_client(client: Client, backend: &UrlBuilder) -> Self {
        Self {
            client,
            url: backend.description_url(),
        }
    }

    /// Returns the URL being fetched.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl DescriptionFetcher for HttpDescriptionFetcher {
    async fn fetch(&self) -> IdentityResult<DescriptionFields> {
        let response = self.client.get(&self.url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(IdentityError::HttpStatus(status.as_u16()));
        }

        let body = Box::pin(response.bytes_stream().map_err(io::Error::other));
        Ok(parse_description(StreamReader::new(body)).await?)
    }
}

/// Resolves the identity the relay advertises.
pub struct DeviceIdentityResolver {
    fetcher: Arc<dyn DescriptionFetcher>,
    retry_interval: Duration,
}

impl DeviceIdentityResolver {
    pub fn new(fetcher: Arc<dyn DescriptionFetcher>, retry_interval: Duration) -> Self {
        Self {
            fetcher,
            retry_interval,
        }
    }

    /// Resolves the identity, retrying until the backend yields a UDN.
    ///
    /// - All overrides supplied: returns them without any fetch.
    /// - UUID supplied: one best-effort fetch fills the other fields.
    /// - Otherwise: fetches until a non-empty UDN is extracted, waiting
    ///   `retry_interval` between attempts. There is no attempt limit.
    ///
    /// Returns [`IdentityError::Cancelled`] as soon as `shutdown` fires.
    pub async fn resolve(
        &self,
        overrides: &IdentityOverrides,
        shutdown: &CancellationToken,
    ) -> IdentityResult<DeviceIdentity> {
        if overrides.is_complete() {
            log::info!("[Identity] Using configured identity, skipping backend lookup");
            return Ok(overrides.merge(DescriptionFields::default()));
        }

        if overrides.has_uuid() {
            let fields = match self.fetch_once(shutdown).await {
                Ok(fields) => fields,
                Err(IdentityError::Cancelled) => return Err(IdentityError::Cancelled),
                Err(e) => {
                    log::warn!("[Identity] Could not fill missing identity fields: {}", e);
                    DescriptionFields::default()
                }
            };
            return Ok(overrides.merge(fields));
        }

        let mut attempt: u64 = 0;
        loop {
            attempt += 1;
            match self.fetch_once(shutdown).await {
                Ok(fields) if fields.has_uuid() => {
                    return Ok(overrides.merge(fields));
                }
                Ok(_) => log::warn!(
                    "[Identity] Description has no UDN (attempt {}), retrying in {:?}",
                    attempt,
                    self.retry_interval
                ),
                Err(IdentityError::Cancelled) => return Err(IdentityError::Cancelled),
                Err(e) => log::warn!(
                    "[Identity] Failed to get rootDesc (attempt {}): {}, retrying in {:?}",
                    attempt,
                    e,
                    self.retry_interval
                ),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Err(IdentityError::Cancelled),
                _ = tokio::time::sleep(self.retry_interval) => {}
            }
        }
    }

    async fn fetch_once(&self, shutdown: &CancellationToken) -> IdentityResult<DescriptionFields> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => Err(IdentityError::Cancelled),
            result = self.fetcher.fetch() => result,
        }
    }
}
