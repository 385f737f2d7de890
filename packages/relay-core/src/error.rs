//! Centralized error types for the relay core library.
//!
//! Each component owns a `thiserror` enum. [`RelayError`] wraps them for the
//! startup path, where every error is fatal, and exposes a machine-readable
//! code for each failure.

use thiserror::Error;

use crate::api::ServerError;
use crate::identity::IdentityError;
use crate::ssdp::SsdpError;

/// Trait for error types that provide machine-readable error codes.
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

impl ErrorCode for SsdpError {
    fn code(&self) -> &'static str {
        match self {
            Self::SocketBind(_) => "ssdp_socket_failed",
            Self::JoinMulticast { .. } => "ssdp_join_failed",
            Self::Send(_) => "ssdp_send_failed",
            Self::AlreadyStarted => "ssdp_already_started",
            Self::Withdrawn => "ssdp_withdrawn",
            Self::MissingUuid => "ssdp_missing_uuid",
        }
    }
}

impl ErrorCode for IdentityError {
    fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "http_request_failed",
            Self::HttpStatus(_) => "http_error_status",
            Self::Xml(_) => "description_parse_error",
            Self::Cancelled => "bootstrap_cancelled",
        }
    }
}

impl ErrorCode for ServerError {
    fn code(&self) -> &'static str {
        match self {
            Self::Bind { .. } => "bind_failed",
            Self::Serve(_) => "serve_failed",
            Self::Client(_) => "http_client_failed",
        }
    }
}

/// Top-level error for running the relay.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Invalid or incomplete configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The proxy listener could not be set up.
    #[error("Server error: {0}")]
    Server(#[from] ServerError),

    /// SSDP sockets or announcements failed.
    #[error("SSDP error: {0}")]
    Ssdp(#[from] SsdpError),

    /// Identity bootstrap ended without an identity.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),
}

impl RelayError {
    /// Returns a machine-readable error code.
    ///
    /// Wrapped component errors report their own, more specific code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Server(e) => e.code(),
            Self::Ssdp(e) => e.code(),
            Self::Identity(e) => e.code(),
        }
    }

    /// Returns whether this error only reports a requested shutdown.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Identity(IdentityError::Cancelled))
    }
}

/// Convenient Result alias for relay-wide operations.
pub type RelayResult<T> = Result<T, RelayError>;
