//! SSDP presence for the relay.
//!
//! The relay never answers an M-SEARCH with a unicast reply. A matching
//! search triggers a multicast alive instead, which serves as the answer.
//!
//! - [`message`]: NOTIFY builders and M-SEARCH parsing
//! - [`transport`]: multicast sockets bound to one interface
//! - [`advertiser`]: the `Uninitialized → Advertising → Withdrawn` state machine
//! - [`monitor`]: background task dispatching searches to the advertiser

pub mod advertiser;
pub mod message;
pub mod monitor;
pub mod transport;

use std::io;
use std::net::Ipv4Addr;

use thiserror::Error;

pub use advertiser::{AdvertisementSession, PresenceAdvertiser, PresencePhase};
pub use message::SearchRequest;
pub use monitor::SearchMonitor;
pub use transport::{bind_search_socket, MulticastTransport, SsdpTransport};

/// Errors from SSDP sockets and the presence state machine.
#[derive(Debug, Error)]
pub enum SsdpError {
    #[error("failed to set up SSDP socket: {0}")]
    SocketBind(#[source] io::Error),

    #[error("failed to join the SSDP group on {iface}: {source}")]
    JoinMulticast {
        iface: Ipv4Addr,
        #[source]
        source: io::Error,
    },

    #[error("failed to send SSDP datagram: {0}")]
    Send(#[source] io::Error),

    #[error("advertisement already started")]
    AlreadyStarted,

    #[error("advertisement has been withdrawn")]
    Withdrawn,

    #[error("device identity has no uuid to advertise")]
    MissingUuid,
}

/// Result alias for SSDP operations.
pub type SsdpResult<T> = Result<T, SsdpError>;
