//! `ip:port` substitution for XML payloads.
//!
//! UPnP descriptors and SOAP responses embed absolute endpoint URLs
//! (presentation URL, icons, control URLs, resource URIs). Every one of them
//! has to point back at the relay, so every dotted-quad-plus-port in the body
//! is replaced, whichever address it was.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::{NoExpand, Regex};

use crate::context::ListenAddress;

/// Dotted quad followed by a port. Deliberately loose: `999.1.1.1:0` matches too.
static IP_PORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}\.[0-9]{1,3}:[0-9]+")
        .expect("ip:port pattern is valid")
});

/// Replaces every `ip:port` occurrence with the relay's listen address.
#[derive(Debug, Clone)]
pub struct AddressRewriter {
    replacement: Vec<u8>,
}

impl AddressRewriter {
    /// Creates a rewriter substituting `listen`.
    #[must_use]
    pub fn new(listen: &ListenAddress) -> Self {
        Self {
            replacement: listen.to_string().into_bytes(),
        }
    }

    /// Rewrites `body`, borrowing it unchanged when nothing matches.
    ///
    /// The caller owns updating Content-Length to the returned length.
    pub fn rewrite<'a>(&self, body: &'a [u8]) -> Cow<'a, [u8]> {
        IP_PORT.replace_all(body, NoExpand(&self.replacement))
    }
}
