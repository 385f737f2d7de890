//! Device identity bootstrap.
//!
//! The relay advertises itself under the backend's own identity: its UDN,
//! device type and friendly name. They come from operator overrides or from
//! the backend's `rootDesc.xml`.

pub mod description;
pub mod resolver;

use thiserror::Error;

pub use description::{parse_description, DescriptionFields};
pub use resolver::{DescriptionFetcher, DeviceIdentityResolver, HttpDescriptionFetcher};

/// Identity advertised over SSDP. Immutable once resolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Sent as USN.
    pub uuid: String,
    /// Sent as NT/ST.
    pub device_type: String,
    /// Sent as SERVER.
    pub friendly_name: String,
}

impl DeviceIdentity {
    /// Returns whether the identity may be advertised.
    #[must_use]
    pub fn is_advertisable(&self) -> bool {
        !self.uuid.trim().is_empty()
    }
}

/// Operator-supplied identity fields. Empty strings mean "not supplied".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityOverrides {
    pub uuid: String,
    pub device_type: String,
    pub friendly_name: String,
}

impl IdentityOverrides {
    /// All three fields were supplied, so no fetch is needed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.uuid.is_empty() && !self.device_type.is_empty() && !self.friendly_name.is_empty()
    }

    /// A UUID was supplied, so the retry loop has nothing to wait for.
    #[must_use]
    pub fn has_uuid(&self) -> bool {
        !self.uuid.is_empty()
    }

    /// Combines overrides with extracted fields. A supplied override always wins.
    #[must_use]
    pub fn merge(&self, fields: DescriptionFields) -> DeviceIdentity {
        fn pick(over: &str, found: Option<String>) -> String {
            if over.is_empty() {
                found.unwrap_or_default()
            } else {
                over.to_string()
            }
        }

        DeviceIdentity {
            uuid: pick(&self.uuid, fields.uuid),
            device_type: pick(&self.device_type, fields.device_type),
            friendly_name: pick(&self.friendly_name, fields.friendly_name),
        }
    }
}

/// Errors from a single bootstrap attempt.
///
/// Everything except [`IdentityError::Cancelled`] is transient and retried.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("description request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("description request returned HTTP {0}")]
    HttpStatus(u16),

    #[error("malformed description document: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("identity bootstrap cancelled")]
    Cancelled,
}

/// Result alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;
