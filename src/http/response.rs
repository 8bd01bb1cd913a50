//! Response writing.
//!
//! # Responsibilities
//! - Render proxy-generated status responses as JSON
//! - Substitute default messages for empty or "none" messages
//! - Apply the standard headers and gzip when the client accepts it
//!
//! # Design Decisions
//! - Every proxy-generated response goes through `send_json`, so headers and
//!   encoding are decided in one place
//! - A body that fails to serialize turns the response into a 500 status
//!   document rather than dropping the connection

use std::io::{self, Write};

use axum::body::Body;
use axum::http::header::{CONTENT_ENCODING, CONTENT_TYPE, VARY};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};

use crate::http::context::ProxyContext;
use crate::lifecycle::runtime::Runtime;
use crate::security::headers::write_standard_headers;

/// Placeholder message meaning "use the default for this status".
pub const NONE: &str = "none";

/// Default message for a status code.
pub fn default_message(status: StatusCode) -> &'static str {
    match status.as_u16() {
        200 => "ok",
        400 => "bad request",
        404 => "not found",
        408 => "request timeout",
        500 => "internal server error",
        502 => "bad gateway",
        503 => "service unavailable",
        504 => "gateway timeout",
        _ => "unknown status",
    }
}

/// JSON document sent for proxy-generated statuses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusBody {
    pub code: u16,
    pub message: String,
    #[serde(rename = "requestID")]
    pub request_id: String,
}

/// Send the context's downstream status as a JSON status document.
pub fn send_status_response(runtime: &Runtime, ctx: &mut ProxyContext) -> Response {
    if ctx.downstream.message.is_empty() || ctx.downstream.message == NONE {
        ctx.downstream.message = default_message(ctx.downstream.status).to_string();
    }

    let body = StatusBody {
        code: ctx.downstream.status.as_u16(),
        message: ctx.downstream.message.clone(),
        request_id: ctx.request_id.to_string(),
    };
    send_json(runtime, ctx, &body)
}

/// Serialize `value` and send it with the context's downstream status.
///
/// If `value` cannot be serialized the context is switched to 500 and a
/// minimal status document is sent instead.
pub fn send_json<T: Serialize>(runtime: &Runtime, ctx: &mut ProxyContext, value: &T) -> Response {
    let json = match serde_json::to_vec(value) {
        Ok(json) => json,
        Err(e) => {
            tracing::error!(request_id = %ctx.request_id, error = %e, "Failed to serialize response body");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            ctx.respond_with(status, default_message(status));
            fallback_body(ctx)
        }
    };

    let mut headers = HeaderMap::new();
    write_standard_headers(&mut headers, runtime, &ctx.request_id);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    let body = if ctx.downstream.accepts_gzip {
        match gzip(&json) {
            Ok(compressed) => {
                headers.insert(CONTENT_ENCODING, HeaderValue::from_static("gzip"));
                headers.insert(VARY, HeaderValue::from_static("accept-encoding"));
                compressed
            }
            Err(e) => {
                tracing::warn!(request_id = %ctx.request_id, error = %e, "Gzip failed, sending identity");
                json
            }
        }
    } else {
        json
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = ctx.downstream.status;
    *response.headers_mut() = headers;
    response
}

/// Status document assembled by hand. Request ids only carry
/// `[A-Za-z0-9._-]`, so no escaping is needed.
fn fallback_body(ctx: &ProxyContext) -> Vec<u8> {
    format!(
        r#"{{"code":{},"message":"{}","requestID":"{}"}}"#,
        ctx.downstream.status.as_u16(),
        ctx.downstream.message,
        ctx.request_id
    )
    .into_bytes()
}

/// Gzip `bytes` in memory.
pub fn gzip(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(bytes.len() / 2 + 32), Compression::default());
    encoder.write_all(bytes)?;
    encoder.finish()
}
