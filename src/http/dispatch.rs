//! Request dispatch.
//!
//! # Data Flow
//! ```text
//! Request
//!     → decorate (X-Request-ID)
//!     → ProxyContext
//!     → RouteTable::match_target (first match wins)
//!         about route   → about document
//!         proxy route   → resolve upstream → Forwarder
//!         no match      → 404
//!         unmapped      → 503
//!     → completion log, stats, metrics (exactly once)
//! ```

use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::Request;
use axum::response::Response;

use crate::error::DispatchError;
use crate::http::about::send_about;
use crate::http::context::ProxyContext;
use crate::http::request::decorate_request;
use crate::http::response::{send_status_response, NONE};
use crate::http::upstream::Forwarder;
use crate::lifecycle::runtime::Runtime;
use crate::observability::{metrics, ServerStats};
use crate::routing::{ResourceKind, UpstreamBinding};
use crate::security::headers::write_standard_headers;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<Runtime>,
    pub forwarder: Arc<dyn Forwarder>,
    pub stats: Arc<ServerStats>,
}

/// Axum entry point for every request.
pub async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    dispatch(&state, request).await
}

/// Handle one downstream request end to end.
pub async fn dispatch(state: &AppState, mut request: Request<Body>) -> Response {
    let request_id = decorate_request(&mut request, &state.runtime.identity().instance_id);
    let mut ctx = ProxyContext::new(&request, request_id);

    tracing::trace!(
        request_id = %ctx.request_id,
        method = %ctx.downstream.method,
        target = %ctx.downstream.target,
        "Dispatching request"
    );

    let response = match route_request(state, &mut ctx, request).await {
        Ok(response) => response,
        Err(e) => fail(&state.runtime, &mut ctx, e),
    };

    ctx.log_completion();
    state.stats.record(ctx.downstream.status);
    metrics::record_request(
        ctx.downstream.method.as_str(),
        ctx.downstream.status.as_u16(),
        ctx.upstream_label(),
        ctx.started,
    );
    response
}

async fn route_request(
    state: &AppState,
    ctx: &mut ProxyContext,
    request: Request<Body>,
) -> Result<Response, DispatchError> {
    let runtime = &state.runtime;
    let route = runtime
        .routes()
        .match_target(&ctx.downstream.target)
        .ok_or_else(|| DispatchError::NoRouteMatch(ctx.downstream.target.clone()))?;

    match route.kind() {
        ResourceKind::About => Ok(send_about(runtime, ctx)),
        ResourceKind::Proxy(_) => {
            let binding = route.resolve()?;
            ctx.bind_upstream(binding);
            forward(state, ctx, binding, request).await
        }
    }
}

async fn forward(
    state: &AppState,
    ctx: &mut ProxyContext,
    binding: &UpstreamBinding,
    request: Request<Body>,
) -> Result<Response, DispatchError> {
    tracing::debug!(
        request_id = %ctx.request_id,
        upstream = %binding.upstream,
        label = %binding.label,
        "Forwarding request"
    );

    let mut response = state.forwarder.forward(&binding.upstream, request).await?;

    let status = response.status();
    ctx.record_upstream_status(status);
    ctx.respond_with(status, "");
    write_standard_headers(response.headers_mut(), &state.runtime, &ctx.request_id);
    Ok(response)
}

fn fail(runtime: &Runtime, ctx: &mut ProxyContext, error: DispatchError) -> Response {
    match &error {
        DispatchError::NoRouteMatch(_) => {
            tracing::debug!(request_id = %ctx.request_id, error = %error, "No route matched");
        }
        DispatchError::RouteUnmapped(_) => {
            tracing::error!(request_id = %ctx.request_id, error = %error, "Route has no upstream");
        }
        DispatchError::Upstream(_) => {
            tracing::warn!(request_id = %ctx.request_id, error = %error, "Upstream request failed");
        }
    }

    ctx.respond_with(error.status(), NONE);
    send_status_response(runtime, ctx)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::http::StatusCode;

    use super::*;
    use crate::config::parse_config;
    use crate::http::request::X_REQUEST_ID;
    use crate::http::response::StatusBody;
    use crate::http::upstream::UpstreamError;
    use crate::lifecycle::startup::prepare;
    use crate::routing::Upstream;

    const CONFIG: &str = r#"
        [server]
        instance_id = "unit"

        [[routes]]
        path = "/about"
        resource = "about"

        [[routes]]
        path = "/api"
        resource = "backend"

        [[routes]]
        path = "/slow"
        resource = "slow"

        [[routes]]
        path = "/orphan"
        resource = "missing"

        [[resources.backend]]
        url = "http://10.0.0.1:8081"

        [[resources.slow]]
        url = "http://10.0.0.2:8081"
    "#;

    /// Answers 201 for 10.0.0.1 and times out for everything else.
    #[derive(Default)]
    struct ScriptedForwarder {
        calls: AtomicUsize,
        seen_request_ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Forwarder for ScriptedForwarder {
        async fn forward(
            &self,
            upstream: &Upstream,
            request: Request<Body>,
        ) -> Result<Response<Body>, UpstreamError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let id = request.headers()[&X_REQUEST_ID].to_str().unwrap().to_string();
            self.seen_request_ids.lock().unwrap().push(id);

            if upstream.host == "10.0.0.1" {
                let mut response = Response::new(Body::from("created"));
                *response.status_mut() = StatusCode::CREATED;
                response
                    .headers_mut()
                    .insert("strict-transport-security", "max-age=1".parse().unwrap());
                Ok(response)
            } else {
                Err(UpstreamError::Timeout(Duration::from_secs(1)))
            }
        }
    }

    fn state() -> (AppState, Arc<ScriptedForwarder>) {
        let runtime = prepare(&parse_config(CONFIG).unwrap()).unwrap();
        let forwarder = Arc::new(ScriptedForwarder::default());
        let state = AppState {
            runtime: Arc::new(runtime),
            forwarder: forwarder.clone(),
            stats: Arc::new(ServerStats::new()),
        };
        (state, forwarder)
    }

    fn get(target: &str) -> Request<Body> {
        Request::builder()
            .uri(target)
            .header(X_REQUEST_ID, "client-chosen")
            .body(Body::empty())
            .unwrap()
    }

    async fn status_body(response: Response) -> StatusBody {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn unmatched_target_is_not_found() {
        let (state, forwarder) = state();

        let response = dispatch(&state, get("/nowhere")).await;

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let id = response.headers()[&X_REQUEST_ID].to_str().unwrap().to_string();
        assert!(id.starts_with("XR-unit-"));
        let body = status_body(response).await;
        assert_eq!(body.code, 404);
        assert_eq!(body.message, "not found");
        assert_eq!(body.request_id, id);
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unmapped_route_is_service_unavailable() {
        let (state, forwarder) = state();

        let response = dispatch(&state, get("/orphan/x")).await;

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_body(response).await.message, "service unavailable");
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn proxies_upstream_status_with_standard_headers() {
        let (state, forwarder) = state();

        let response = dispatch(&state, get("/api/items")).await;

        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(response.headers().get("strict-transport-security").is_none());
        assert_eq!(response.headers()["x-frame-options"], "sameorigin");

        let sent = forwarder.seen_request_ids.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_ne!(sent[0], "client-chosen");
        assert_eq!(response.headers()[&X_REQUEST_ID], sent[0].as_str());
    }

    #[tokio::test]
    async fn upstream_timeout_is_gateway_timeout() {
        let (state, _) = state();

        let response = dispatch(&state, get("/slow")).await;

        assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(status_body(response).await.message, "gateway timeout");
    }

    #[tokio::test]
    async fn about_route_is_served_locally() {
        let (state, forwarder) = state();

        let response = dispatch(&state, get("/about")).await;

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let about: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(about["serverID"], "unit");
        assert_eq!(forwarder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn every_request_is_counted_once() {
        let (state, _) = state();

        for target in ["/nowhere", "/orphan", "/api", "/slow", "/about"] {
            dispatch(&state, get(target)).await;
        }

        let snapshot = state.stats.snapshot();
        assert_eq!(snapshot.requests, 5);
        assert_eq!(snapshot.success, 2);
        assert_eq!(snapshot.client_error, 1);
        assert_eq!(snapshot.server_error, 2);
    }
}
