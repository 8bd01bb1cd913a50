//! Upstream forwarding.
//!
//! # Responsibilities
//! - Rewrite the request target onto the resolved upstream
//! - Strip hop-by-hop headers and set X-Forwarded-* headers
//! - Bound the upstream round trip by the configured timeout
//! - Stream request and response bodies without buffering
//!
//! # Design Decisions
//! - `Forwarder` is a trait so dispatch can be exercised without sockets
//! - Timed-out round trips map to 504, every other failure to 502
//! - The upstream's status code is passed through unchanged

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::header::HOST;
use axum::http::{HeaderValue, Request, Response, StatusCode, Uri, Version};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::{TokioExecutor, TokioTimer};
use thiserror::Error;

use crate::lifecycle::runtime::Runtime;
use crate::routing::Upstream;
use crate::security::headers::{set_forwarded, strip_hop_by_hop};

/// Failure talking to an upstream.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("upstream target '{0}' is not a valid URI")]
    InvalidTarget(String),

    #[error("upstream did not answer within {0:?}")]
    Timeout(Duration),

    #[error("upstream request failed: {0}")]
    Request(#[source] hyper_util::client::legacy::Error),
}

impl UpstreamError {
    /// Downstream status reported for this failure.
    pub fn status(&self) -> StatusCode {
        match self {
            UpstreamError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            UpstreamError::InvalidTarget(_) | UpstreamError::Request(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

/// Sends a decorated downstream request to an upstream.
#[async_trait]
pub trait Forwarder: Send + Sync {
    async fn forward(
        &self,
        upstream: &Upstream,
        request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError>;
}

/// Pooled HTTP/1.1 forwarder built on the hyper client.
#[derive(Clone)]
pub struct HyperForwarder {
    client: Client<HttpConnector, Body>,
    round_trip: Duration,
    tls_downstream: bool,
}

impl HyperForwarder {
    pub fn new(runtime: &Runtime) -> Self {
        let upstream = runtime.upstream();

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(upstream.connect));
        connector.set_nodelay(true);
        connector.enforce_http(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(upstream.pool_idle)
            .pool_max_idle_per_host(upstream.pool_max_idle_per_host)
            .pool_timer(TokioTimer::new())
            .build(connector);

        Self {
            client,
            round_trip: runtime.timeouts().round_trip,
            tls_downstream: runtime.is_tls_mode(),
        }
    }

    fn prepare(&self, upstream: &Upstream, request: Request<Body>) -> Result<Request<Body>, UpstreamError> {
        let (mut parts, body) = request.into_parts();

        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");
        let target = format!("{}://{}{}", upstream.scheme, upstream.authority(), path_and_query);
        let uri: Uri = target
            .parse()
            .map_err(|_| UpstreamError::InvalidTarget(target.clone()))?;

        let client_ip = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        let host = parts.headers.get(HOST).cloned().or_else(|| {
            parts
                .uri
                .authority()
                .and_then(|authority| HeaderValue::from_str(authority.as_str()).ok())
        });

        strip_hop_by_hop(&mut parts.headers);
        set_forwarded(&mut parts.headers, client_ip, self.tls_downstream, host);
        parts.headers.remove(HOST);
        parts.uri = uri;
        parts.version = Version::HTTP_11;

        Ok(Request::from_parts(parts, body))
    }
}

#[async_trait]
impl Forwarder for HyperForwarder {
    async fn forward(
        &self,
        upstream: &Upstream,
        request: Request<Body>,
    ) -> Result<Response<Body>, UpstreamError> {
        let request = self.prepare(upstream, request)?;

        let response = tokio::time::timeout(self.round_trip, self.client.request(request))
            .await
            .map_err(|_| UpstreamError::Timeout(self.round_trip))?
            .map_err(UpstreamError::Request)?;

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);
        Ok(Response::from_parts(parts, Body::new(body)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use crate::lifecycle::startup::prepare;

    fn forwarder() -> HyperForwarder {
        let config = parse_config(
            r#"
            [[routes]]
            path = "/"
            resource = "about"
            "#,
        )
        .unwrap();
        HyperForwarder::new(&prepare(&config).unwrap())
    }

    fn upstream() -> Upstream {
        Upstream {
            scheme: "http".into(),
            host: "10.0.0.7".into(),
            port: 8081,
        }
    }

    #[tokio::test]
    async fn rewrites_target_and_headers() {
        let mut request = Request::builder()
            .version(Version::HTTP_2)
            .uri("/api/items?page=2")
            .header(HOST, "proxy.example.org")
            .header("connection", "close")
            .header("x-request-id", "XR-a-b")
            .body(Body::empty())
            .unwrap();
        request
            .extensions_mut()
            .insert(ConnectInfo::<SocketAddr>("192.0.2.9:5000".parse().unwrap()));

        let prepared = forwarder().prepare(&upstream(), request).unwrap();

        assert_eq!(prepared.uri(), "http://10.0.0.7:8081/api/items?page=2");
        assert_eq!(prepared.version(), Version::HTTP_11);
        assert!(prepared.headers().get(HOST).is_none());
        assert!(prepared.headers().get("connection").is_none());
        assert_eq!(prepared.headers()["x-request-id"], "XR-a-b");
        assert_eq!(prepared.headers()["x-forwarded-for"], "192.0.2.9");
        assert_eq!(prepared.headers()["x-forwarded-proto"], "http");
        assert_eq!(prepared.headers()["x-forwarded-host"], "proxy.example.org");
    }

    #[tokio::test]
    async fn refused_connection_is_bad_gateway() {
        let closed = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = closed.local_addr().unwrap().port();
        drop(closed);

        let target = Upstream {
            scheme: "http".into(),
            host: "127.0.0.1".into(),
            port,
        };
        let request = Request::builder().uri("/").body(Body::empty()).unwrap();

        let err = forwarder().forward(&target, request).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn timeout_is_gateway_timeout() {
        assert_eq!(
            UpstreamError::Timeout(Duration::from_secs(1)).status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
