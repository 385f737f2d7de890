//! Response interception between the backend and the client.
//!
//! Runs once per completed backend response. The Content-Type selects at most
//! one transformation:
//!
//! | Content-Type contains | transcoding | action |
//! |---|---|---|
//! | `xml` | any | rewrite `ip:port` occurrences |
//! | `audio/ogg` | enabled | transcode to FLAC |
//! | anything else | any | pass through untouched |
//!
//! All state lives in the response value itself, so concurrent requests never
//! observe each other's work.

use std::borrow::Cow;
use std::sync::Arc;

use axum::body::Body;
use axum::http::header::{CONTENT_LENGTH, CONTENT_TYPE, TRANSFER_ENCODING};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use bytes::Bytes;
use thiserror::Error;

use crate::context::ListenAddress;
use crate::protocol_constants::{FLAC_CONTENT_TYPE, OGG_CONTENT_MARKER, XML_CONTENT_MARKER};
use crate::rewrite::address::AddressRewriter;
use crate::rewrite::transcode::AudioTranscoder;

/// The in-flight response being relayed to a client.
pub type ProxyResponse = Response<Body>;

/// Errors that fail a single rewritten response.
#[derive(Debug, Error)]
pub enum RewriteError {
    /// The backend body could not be read to completion.
    #[error("failed to read backend response body: {0}")]
    ReadBody(#[source] axum::Error),
}

/// What the pipeline does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewriteAction {
    /// Substitute the relay's address into the body.
    RewriteAddresses,
    /// Re-encode the audio payload as FLAC.
    Transcode,
    /// Relay the response exactly as received.
    PassThrough,
}

/// Composes address rewriting and audio transcoding.
#[derive(Clone)]
pub struct ResponseRewritePipeline {
    addresses: AddressRewriter,
    /// Present only when transcoding is enabled.
    transcoder: Option<Arc<dyn AudioTranscoder>>,
}

impl ResponseRewritePipeline {
    /// Creates a pipeline substituting `listen`, with transcoding disabled.
    #[must_use]
    pub fn new(listen: &ListenAddress) -> Self {
        Self {
            addresses: AddressRewriter::new(listen),
            transcoder: None,
        }
    }

    /// Enables transcoding through `transcoder`.
    #[must_use]
    pub fn with_transcoder(mut self, transcoder: Arc<dyn AudioTranscoder>) -> Self {
        self.transcoder = Some(transcoder);
        self
    }

    /// Returns whether OGG responses are transcoded.
    #[must_use]
    pub fn transcoding_enabled(&self) -> bool {
        self.transcoder.is_some()
    }

    /// Chooses the action for a response from its Content-Type values.
    ///
    /// XML wins over audio if both were ever to match.
    #[must_use]
    pub fn classify(&self, headers: &HeaderMap) -> RewriteAction {
        let content_types: Vec<&str> = headers
            .get_all(CONTENT_TYPE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();

        if content_types
            .iter()
            .any(|ct| ct.contains(XML_CONTENT_MARKER))
        {
            RewriteAction::RewriteAddresses
        } else if self.transcoding_enabled()
            && content_types
                .iter()
                .any(|ct| ct.contains(OGG_CONTENT_MARKER))
        {
            RewriteAction::Transcode
        } else {
            RewriteAction::PassThrough
        }
    }

    /// Applies the selected action to `response` in place.
    ///
    /// Pass-through responses are not touched at all: the body is never
    /// polled and no header is modified.
    pub async fn apply(&self, response: &mut ProxyResponse) -> Result<RewriteAction, RewriteError> {
        let action = self.classify(response.headers());
        match action {
            RewriteAction::PassThrough => {}
            RewriteAction::RewriteAddresses => {
                let body = read_body(response).await?;
                let rewritten = match self.addresses.rewrite(&body) {
                    Cow::Owned(bytes) => Some(bytes),
                    Cow::Borrowed(_) => None,
                };
                let body = rewritten.map(Bytes::from).unwrap_or(body);
                log::debug!("[Rewrite] Rewrote XML response ({} bytes)", body.len());
                replace_body(response, body);
            }
            RewriteAction::Transcode => {
                let Some(transcoder) = self.transcoder.as_ref() else {
                    return Ok(RewriteAction::PassThrough);
                };
                log::info!("[Rewrite] OGG audio will be transcoded to FLAC");
                let body = read_body(response).await?;
                let encoded = transcoder.transcode(body).await;
                replace_body(response, encoded);
                response
                    .headers_mut()
                    .insert(CONTENT_TYPE, HeaderValue::from_static(FLAC_CONTENT_TYPE));
            }
        }
        Ok(action)
    }
}

/// Drains the whole backend body into memory.
async fn read_body(response: &mut ProxyResponse) -> Result<Bytes, RewriteError> {
    let body = std::mem::take(response.body_mut());
    axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(RewriteError::ReadBody)
}

/// Installs a fully buffered body and makes the framing headers agree with it.
fn replace_body(response: &mut ProxyResponse, body: Bytes) {
    let headers = response.headers_mut();
    headers.remove(TRANSFER_ENCODING);
    headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
    *response.body_mut() = Body::from(body);
}
