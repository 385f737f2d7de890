//! Fixed protocol constants that should NOT be changed.
//!
//! These values are defined by external specifications (UPnP, SSDP, DLNA) or by
//! the backend media servers the relay sits in front of.

// ─────────────────────────────────────────────────────────────────────────────
// SSDP
// ─────────────────────────────────────────────────────────────────────────────

/// SSDP multicast group.
pub const SSDP_MULTICAST_IP: std::net::Ipv4Addr = std::net::Ipv4Addr::new(239, 255, 255, 250);

/// SSDP port.
pub const SSDP_PORT: u16 = 1900;

/// Value of the HOST header on every NOTIFY (protocol specification).
pub const SSDP_HOST: &str = "239.255.255.250:1900";

/// UPnP 1.0 recommends a TTL of 4 for SSDP multicast.
pub const SSDP_MULTICAST_TTL: u32 = 4;

/// Largest SSDP datagram we expect to receive.
pub const SSDP_MAX_DATAGRAM: usize = 2048;

/// Search-target fragments that make the relay re-announce itself.
///
/// Matched as substrings, so `urn:schemas-upnp-org:device:MediaServer:1`
/// matches `device:MediaServer`.
pub const ANSWERED_SEARCH_TARGETS: [&str; 4] = [
    "ssdp:all",
    "service:ContentDirectory",
    "service:ConnectionManager",
    "device:MediaServer",
];

// ─────────────────────────────────────────────────────────────────────────────
// UPnP device description
// ─────────────────────────────────────────────────────────────────────────────

/// Well-known path of the device-description document on the backend
/// (and, after rewriting, on the relay).
pub const DESCRIPTION_PATH: &str = "/rootDesc.xml";

/// Upper bound on a single description fetch (seconds).
pub const DESCRIPTION_FETCH_TIMEOUT_SECS: u64 = 10;

/// XML path of the root device type.
pub const DEVICE_TYPE_PATH: &str = "root/device/deviceType";

/// XML path of the root device UDN (advertised as USN).
pub const UDN_PATH: &str = "root/device/UDN";

/// XML path of the root device friendly name (advertised as SERVER).
pub const FRIENDLY_NAME_PATH: &str = "root/device/friendlyName";

// ─────────────────────────────────────────────────────────────────────────────
// Response rewriting
// ─────────────────────────────────────────────────────────────────────────────

/// Content-Type fragment selecting address rewriting.
pub const XML_CONTENT_MARKER: &str = "xml";

/// Content-Type fragment selecting transcoding (when enabled).
pub const OGG_CONTENT_MARKER: &str = "audio/ogg";

/// Content-Type of transcoded responses.
pub const FLAC_CONTENT_TYPE: &str = "audio/flac";

// ─────────────────────────────────────────────────────────────────────────────
// Defaults
// ─────────────────────────────────────────────────────────────────────────────

/// Default CACHE-CONTROL max-age advertised over SSDP (seconds).
pub const DEFAULT_MAX_AGE_SECS: u32 = 1800;

/// Default heartbeat period between unsolicited alive announcements (seconds).
pub const DEFAULT_ALIVE_INTERVAL_SECS: u64 = 10;

/// Back-off between failed device-description fetches (seconds).
pub const BOOTSTRAP_RETRY_SECS: u64 = 60;

/// Default external encoder executable.
pub const DEFAULT_ENCODER_PROGRAM: &str = "ffmpeg";
