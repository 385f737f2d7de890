//! Reverse-proxy request handling.
//!
//! Every method and path lands in one fallback handler which forwards to the
//! fixed backend and relays the answer through the rewrite pipeline.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{connect_info::ConnectInfo, Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Router,
};
use reqwest::Client;
use thiserror::Error;

use crate::context::UrlBuilder;
use crate::error::ErrorCode;
use crate::rewrite::{ResponseRewritePipeline, RewriteError};

/// Headers that describe one connection and are never forwarded.
const HOP_BY_HOP_HEADERS: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

/// Errors that fail a single proxied request.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("backend request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),
}

impl ErrorCode for ProxyError {
    fn code(&self) -> &'static str {
        match self {
            Self::Upstream(_) => "backend_unreachable",
            Self::Rewrite(_) => "rewrite_failed",
        }
    }
}

impl ProxyError {
    /// Both failures are the backend's: either it could not be reached or
    /// its response could not be read.
    pub fn status_code(&self) -> StatusCode {
        StatusCode::BAD_GATEWAY
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        log::warn!("[Proxy] {} ({})", self, self.code());
        (self.status_code(), self.to_string()).into_response()
    }
}

/// Shared state for the proxy handler.
#[derive(Clone)]
pub struct ProxyState {
    client: Client,
    backend: UrlBuilder,
    pipeline: Arc<ResponseRewritePipeline>,
}

impl ProxyState {
    /// Creates proxy state with a client that relays redirects instead of
    /// following them.
    pub fn new(backend: UrlBuilder, pipeline: ResponseRewritePipeline) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            backend,
            pipeline: Arc::new(pipeline),
        })
    }
}

/// Creates the router: a single fallback that proxies everything.
pub fn create_router(state: ProxyState) -> Router {
    Router::new().fallback(proxy_request).with_state(state)
}

async fn proxy_request(
    State(state): State<ProxyState>,
    ConnectInfo(remote): ConnectInfo<SocketAddr>,
    request: Request,
) -> Result<Response, ProxyError> {
    let target = request
        .uri()
        .path_and_query()
        .map_or("/", |pq| pq.as_str())
        .to_string();
    log::debug!("[Proxy] {} requests {}", remote, target);

    let (parts, body) = request.into_parts();
    let mut headers = parts.headers;
    strip_hop_by_hop(&mut headers);
    // The client derives Host from the backend URL.
    headers.remove(header::HOST);
    append_forwarded_for(&mut headers, remote.ip());

    let mut upstream = state
        .client
        .request(parts.method, state.backend.request_url(&target))
        .headers(headers);
    if !is_empty_body(&body) {
        upstream = upstream.body(reqwest::Body::wrap_stream(body.into_data_stream()));
    }
    let upstream = upstream.send().await?;

    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;

    state.pipeline.apply(&mut response).await?;
    Ok(response)
}

fn is_empty_body(body: &Body) -> bool {
    use axum::body::HttpBody;
    body.size_hint().exact() == Some(0)
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(name);
    }
}

/// Appends the client address to any existing `X-Forwarded-For` chain.
fn append_forwarded_for(headers: &mut HeaderMap, client: IpAddr) {
    let prior: Vec<&str> = headers
        .get_all(&X_FORWARDED_FOR)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect();

    let chain = if prior.is_empty() {
        client.to_string()
    } else {
        format!("{}, {}", prior.join(", "), client)
    };

    if let Ok(value) = HeaderValue::from_str(&chain) {
        headers.insert(X_FORWARDED_FOR.clone(), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ProxyServer;
    use crate::context::ListenAddress;
    use crate::rewrite::AudioTranscoder;
    use async_trait::async_trait;
    use axum::routing::get;
    use bytes::Bytes;

    const DESC: &str = "<root><URLBase>http://192.168.1.50:8200/</URLBase>\
                        <icon>http://192.168.1.50:8200/icons/sm.png</icon></root>";
    const OGG: &[u8] = b"OggS\x00\x02 vorbis 192.168.1.50:8200";

    struct FakeFlac;

    #[async_trait]
    impl AudioTranscoder for FakeFlac {
        async fn transcode(&self, _input: Bytes) -> Bytes {
            Bytes::from_static(b"fLaC\x00\x00\x00\x22")
        }
    }

    fn backend_router() -> Router {
        Router::new()
            .route(
                "/rootDesc.xml",
                get(|| async { ([(header::CONTENT_TYPE, "text/xml; charset=\"utf-8\"")], DESC) }),
            )
            .route(
                "/MediaItems/22.ogg",
                get(|| async { ([(header::CONTENT_TYPE, "audio/ogg")], OGG) }),
            )
            .route(
                "/echo",
                get(|headers: HeaderMap, uri: axum::http::Uri| async move {
                    let field = |name: &str| {
                        headers
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or("-")
                            .to_string()
                    };
                    format!(
                        "host={}\nxff={}\nsecret={}\nuri={}",
                        field("host"),
                        field("x-forwarded-for"),
                        field("x-secret"),
                        uri
                    )
                }),
            )
            .route(
                "/moved",
                get(|| async {
                    (
                        StatusCode::FOUND,
                        [(header::LOCATION, "http://192.168.1.50:8200/elsewhere")],
                    )
                }),
            )
    }

    async fn spawn_backend() -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, backend_router()).await });
        addr
    }

    async fn spawn_relay(
        backend: SocketAddr,
        transcoder: Option<Arc<dyn AudioTranscoder>>,
    ) -> ListenAddress {
        let server = ProxyServer::bind("127.0.0.1:0".parse().unwrap())
            .await
            .unwrap();
        let listen = server.listen_address();
        let mut pipeline = ResponseRewritePipeline::new(&listen);
        if let Some(t) = transcoder {
            pipeline = pipeline.with_transcoder(t);
        }
        let state = ProxyState::new(UrlBuilder::new(backend.to_string()), pipeline).unwrap();
        tokio::spawn(server.serve(state));
        listen
    }

    fn client() -> Client {
        Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn xml_is_rewritten_to_relay_address() {
        let backend = spawn_backend().await;
        let listen = spawn_relay(backend, None).await;

        let resp = client()
            .get(listen.url_builder().description_url())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let length: usize = resp.headers()[header::CONTENT_LENGTH]
            .to_str()
            .unwrap()
            .parse()
            .unwrap();
        let body = resp.text().await.unwrap();

        assert!(body.contains(&format!("http://{}/", listen)));
        assert_eq!(body.matches(&listen.to_string()).count(), 2);
        assert!(!body.contains("192.168.1.50:8200"));
        assert_eq!(length, body.len());
    }

    #[tokio::test]
    async fn ogg_passes_through_without_transcoder() {
        let backend = spawn_backend().await;
        let listen = spawn_relay(backend, None).await;

        let resp = client()
            .get(listen.url_builder().request_url("/MediaItems/22.ogg"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/ogg");
        assert_eq!(&resp.bytes().await.unwrap()[..], OGG);
    }

    #[tokio::test]
    async fn ogg_is_transcoded_when_enabled() {
        let backend = spawn_backend().await;
        let listen = spawn_relay(backend, Some(Arc::new(FakeFlac))).await;

        let resp = client()
            .get(listen.url_builder().request_url("/MediaItems/22.ogg"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "audio/flac");
        assert_eq!(resp.headers()[header::CONTENT_LENGTH], "8");
        assert_eq!(&resp.bytes().await.unwrap()[..], b"fLaC\x00\x00\x00\x22");
    }

    #[tokio::test]
    async fn forwards_path_query_and_client_headers() {
        let backend = spawn_backend().await;
        let listen = spawn_relay(backend, None).await;

        let body = client()
            .get(listen.url_builder().request_url("/echo?id=64$1&start=0"))
            .header("x-forwarded-for", "10.9.9.9")
            .header("connection", "x-secret")
            .header("x-secret", "hunter2")
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert!(body.contains(&format!("host={}\n", backend)), "{body}");
        assert!(body.contains("xff=10.9.9.9, 127.0.0.1\n"), "{body}");
        assert!(body.contains("secret=-\n"), "{body}");
        assert!(body.contains("uri=/echo?id=64$1&start=0"), "{body}");
    }

    #[tokio::test]
    async fn redirects_are_relayed_not_followed() {
        let backend = spawn_backend().await;
        let listen = spawn_relay(backend, None).await;

        let resp = client()
            .get(listen.url_builder().request_url("/moved"))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(
            resp.headers()[header::LOCATION],
            "http://192.168.1.50:8200/elsewhere"
        );
    }

    #[tokio::test]
    async fn unreachable_backend_is_bad_gateway() {
        let closed = {
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };
        let listen = spawn_relay(closed, None).await;

        let resp = client()
            .get(listen.url_builder().description_url())
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn strips_connection_listed_and_standard_hop_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, X-Trace"));
        headers.insert("x-trace", HeaderValue::from_static("1"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/xml"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "text/xml");
    }

    #[test]
    fn forwarded_for_starts_a_chain() {
        let mut headers = HeaderMap::new();
        append_forwarded_for(&mut headers, "192.168.1.77".parse().unwrap());
        assert_eq!(headers[&X_FORWARDED_FOR], "192.168.1.77");
    }
}
