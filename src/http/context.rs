//! Per-request proxy context.
//!
//! One `ProxyContext` lives for exactly one downstream request. The dispatcher
//! fills it in as the request moves through routing and forwarding, and it is
//! the single source for the completion log line.

use std::time::{Duration, Instant};

use axum::http::header::USER_AGENT;
use axum::http::{Method, Request, StatusCode};

use crate::http::request::{accepts_gzip, RequestId};
use crate::routing::UpstreamBinding;

/// Downstream leg of the exchange.
#[derive(Debug, Clone)]
pub struct Downstream {
    pub method: Method,
    /// Path and query exactly as the client sent them.
    pub target: String,
    pub user_agent: Option<String>,
    pub accepts_gzip: bool,
    pub status: StatusCode,
    pub message: String,
}

/// Upstream leg of the exchange, present once a route resolved to an upstream.
#[derive(Debug, Clone)]
pub struct UpstreamLeg {
    pub binding: UpstreamBinding,
    pub status: Option<StatusCode>,
}

#[derive(Debug, Clone)]
pub struct ProxyContext {
    pub request_id: RequestId,
    pub started: Instant,
    pub downstream: Downstream,
    pub upstream: Option<UpstreamLeg>,
}

impl ProxyContext {
    pub fn new<B>(request: &Request<B>, request_id: RequestId) -> Self {
        let target = request
            .uri()
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| request.uri().path().to_string());

        Self {
            request_id,
            started: Instant::now(),
            downstream: Downstream {
                method: request.method().clone(),
                target,
                user_agent: request
                    .headers()
                    .get(USER_AGENT)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string),
                accepts_gzip: accepts_gzip(request.headers()),
                status: StatusCode::OK,
                message: String::new(),
            },
            upstream: None,
        }
    }

    /// Set the downstream status and message.
    pub fn respond_with(&mut self, status: StatusCode, message: impl Into<String>) {
        self.downstream.status = status;
        self.downstream.message = message.into();
    }

    pub fn bind_upstream(&mut self, binding: &UpstreamBinding) {
        self.upstream = Some(UpstreamLeg {
            binding: binding.clone(),
            status: None,
        });
    }

    pub fn record_upstream_status(&mut self, status: StatusCode) {
        if let Some(leg) = self.upstream.as_mut() {
            leg.status = Some(status);
        }
    }

    /// Label of the resolved upstream, or "none".
    pub fn upstream_label(&self) -> &str {
        self.upstream
            .as_ref()
            .map(|leg| leg.binding.label.as_str())
            .unwrap_or("none")
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Emit the completion record for this request.
    pub fn log_completion(&self) {
        let elapsed_ms = self.elapsed().as_secs_f64() * 1000.0;
        let upstream = self.upstream.as_ref();
        let upstream_addr = upstream.map(|leg| leg.binding.upstream.to_string());
        tracing::info!(
            request_id = %self.request_id,
            method = %self.downstream.method,
            target = %self.downstream.target,
            user_agent = self.downstream.user_agent.as_deref().unwrap_or(""),
            upstream = upstream_addr.as_deref(),
            label = upstream.map(|leg| leg.binding.label.as_str()),
            upstream_status = upstream.and_then(|leg| leg.status).map(|s| s.as_u16()),
            status = self.downstream.status.as_u16(),
            elapsed_ms,
            "Request served"
        );
    }
}
