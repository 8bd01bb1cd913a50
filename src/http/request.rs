//! Request decoration.
//!
//! # Responsibilities
//! - Generate a unique request ID for every inbound request
//! - Overwrite any client-supplied X-Request-ID before anything else reads it
//! - Extract content negotiation facts (gzip acceptance)
//!
//! # Design Decisions
//! - Request ID format is `XR-{instance}-{uuid v4}`
//! - Request ID added as early as possible for tracing

use std::fmt;

use axum::http::header::ACCEPT_ENCODING;
use axum::http::{HeaderMap, HeaderName, HeaderValue, Request};
use uuid::Uuid;

use crate::lifecycle::runtime::InstanceId;

/// Header carrying the request ID, on requests and responses.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Unique identifier attached to a request and its response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new request ID for this instance.
    pub fn generate(instance: &InstanceId) -> Self {
        Self(format!("XR-{}-{}", instance, Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The ID as a header value.
    pub fn header_value(&self) -> HeaderValue {
        // Instance IDs and UUIDs are restricted to visible ASCII.
        HeaderValue::from_str(&self.0).unwrap_or_else(|_| HeaderValue::from_static("XR-invalid"))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stamp a fresh request ID onto the request, replacing any the client sent.
pub fn decorate_request<B>(request: &mut Request<B>, instance: &InstanceId) -> RequestId {
    let request_id = RequestId::generate(instance);

    if let Some(previous) = request.headers().get(&X_REQUEST_ID) {
        tracing::trace!(
            request_id = %request_id,
            client_value = ?previous,
            "Replacing client supplied request ID"
        );
    }

    request
        .headers_mut()
        .insert(X_REQUEST_ID, request_id.header_value());
    request_id
}

/// Whether the client accepts a gzip encoded response.
///
/// Honors `q=0` as a refusal. An explicit `gzip` entry decides; `*` only
/// applies when gzip is not listed.
pub fn accepts_gzip(headers: &HeaderMap) -> bool {
    let mut gzip = None;
    let mut wildcard = None;

    for entry in headers
        .get_all(ACCEPT_ENCODING)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
    {
        let mut parts = entry.split(';');
        let coding = parts.next().unwrap_or_default().trim();
        let accepted = parts
            .filter_map(|param| param.trim().strip_prefix("q="))
            .all(|q| q.trim().parse::<f32>().map(|q| q > 0.0).unwrap_or(false));

        if coding.eq_ignore_ascii_case("gzip") {
            gzip = Some(gzip.unwrap_or(false) || accepted);
        } else if coding == "*" {
            wildcard = Some(wildcard.unwrap_or(false) || accepted);
        }
    }

    gzip.or(wildcard).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance() -> InstanceId {
        InstanceId::new(Some("edge1"))
    }

    #[test]
    fn request_id_format() {
        let id = RequestId::generate(&instance());
        let uuid = id.as_str().strip_prefix("XR-edge1-").unwrap();
        assert!(Uuid::parse_str(uuid).is_ok());
    }

    #[test]
    fn decorate_overwrites_client_header() {
        let mut request = Request::builder()
            .uri("/api")
            .header("X-REQUEST-ID", "spoofed")
            .body(())
            .unwrap();

        let id = decorate_request(&mut request, &instance());

        let values: Vec<_> = request.headers().get_all(&X_REQUEST_ID).iter().collect();
        assert_eq!(values.len(), 1);
        assert_eq!(values[0], id.as_str());
    }

    #[test]
    fn ids_are_unique() {
        let instance = instance();
        let ids: std::collections::HashSet<_> =
            (0..1000).map(|_| RequestId::generate(&instance)).map(|id| id.0).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn gzip_negotiation() {
        let cases = [
            ("gzip", true),
            ("deflate, gzip;q=0.8", true),
            ("GZIP", true),
            ("*", true),
            ("gzip;q=0", false),
            ("gzip; q=0.0", false),
            ("gzip;q=0, *", false),
            ("*, gzip;q=0", false),
            ("br, *;q=0.5", true),
            ("*;q=0", false),
            ("br, deflate", false),
            ("", false),
        ];
        for (value, expected) in cases {
            let mut headers = HeaderMap::new();
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_str(value).unwrap());
            assert_eq!(accepts_gzip(&headers), expected, "{value}");
        }
        assert!(!accepts_gzip(&HeaderMap::new()));
    }
}
