//! Relay Core - a DLNA/UPnP relay for media servers on another host or port.
//!
//! The relay fronts a backend media server. It advertises itself on the local
//! network over SSDP under the backend's identity, and proxies every HTTP
//! request to the backend. XML responses are rewritten so every embedded
//! `ip:port` points at the relay. OGG audio can be transcoded to FLAC for
//! clients that cannot play it.
//!
//! # Architecture
//!
//! - [`rewrite`]: address substitution, audio transcoding, and the pipeline
//!   that picks between them per response
//! - [`identity`]: device identity bootstrap from `rootDesc.xml`
//! - [`ssdp`]: presence advertisement and search handling
//! - [`api`]: the reverse-proxy HTTP server
//! - [`lifecycle`]: heartbeat and withdrawal
//! - [`bootstrap`]: the startup sequence tying them together
//! - [`config`], [`context`], [`error`]: values shared across modules
//!
//! # Abstraction Traits
//!
//! - [`AudioTranscoder`](rewrite::AudioTranscoder): payload re-encoding
//! - [`DescriptionFetcher`](identity::DescriptionFetcher): identity source
//! - [`SsdpTransport`](ssdp::SsdpTransport): multicast datagram sink

#![warn(clippy::all)]

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod lifecycle;
pub mod protocol_constants;
pub mod rewrite;
pub mod ssdp;

// Re-export commonly used types at the crate root
pub use bootstrap::{run, run_with};
pub use config::{AdvertiseInterface, Config};
pub use context::{ListenAddress, UrlBuilder};
pub use error::{ErrorCode, RelayError, RelayResult};
pub use identity::{DeviceIdentity, IdentityOverrides};

// Re-export component types
pub use api::{ProxyServer, ProxyState, ServerError};
pub use rewrite::{AddressRewriter, AudioTranscoder, ExternalTranscoder, ResponseRewritePipeline};
pub use ssdp::{PresenceAdvertiser, SearchRequest, SsdpTransport};
