//! SSDP datagram building and parsing.

use std::net::SocketAddr;

use crate::identity::DeviceIdentity;
use crate::protocol_constants::{ANSWERED_SEARCH_TARGETS, SSDP_HOST};

/// Checks if `s` starts with `prefix` (ASCII case-insensitive, no allocation).
#[inline]
fn starts_with_ignore_ascii_case(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len() && s.as_bytes()[..prefix.len()].eq_ignore_ascii_case(prefix.as_bytes())
}

/// Builds the `ssdp:alive` NOTIFY.
///
/// The device type goes out as NT, the UUID as USN and the friendly name as
/// SERVER.
pub fn build_alive(identity: &DeviceIdentity, location: &str, max_age: u32) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:alive\r\n\
         USN: {}\r\n\
         LOCATION: {}\r\n\
         SERVER: {}\r\n\
         CACHE-CONTROL: max-age={}\r\n\r\n",
        SSDP_HOST,
        identity.device_type,
        identity.uuid,
        location,
        identity.friendly_name,
        max_age
    )
}

/// Builds the `ssdp:byebye` NOTIFY.
pub fn build_bye(identity: &DeviceIdentity) -> String {
    format!(
        "NOTIFY * HTTP/1.1\r\n\
         HOST: {}\r\n\
         NT: {}\r\n\
         NTS: ssdp:byebye\r\n\
         USN: {}\r\n\r\n",
        SSDP_HOST, identity.device_type, identity.uuid
    )
}

/// An inbound discovery query. Consumed immediately, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchRequest {
    pub source: SocketAddr,
    /// The ST header, empty when absent.
    pub search_type: String,
}

impl SearchRequest {
    /// Returns whether this search should trigger an alive announcement.
    #[must_use]
    pub fn should_answer(&self) -> bool {
        ANSWERED_SEARCH_TARGETS
            .iter()
            .any(|target| self.search_type.contains(target))
    }
}

/// Parses an M-SEARCH datagram. Anything else (NOTIFY, responses, garbage)
/// yields `None`.
pub fn parse_search(datagram: &[u8], source: SocketAddr) -> Option<SearchRequest> {
    let text = std::str::from_utf8(datagram).ok()?;
    let mut lines = text.lines();

    if !starts_with_ignore_ascii_case(lines.next()?.trim_start(), "M-SEARCH ") {
        return None;
    }

    let search_type = lines
        .take_while(|l| !l.trim().is_empty())
        .find(|l| starts_with_ignore_ascii_case(l, "st:"))
        .map(|l| l[3..].trim().to_string())
        .unwrap_or_default();

    Some(SearchRequest {
        source,
        search_type,
    })
}
