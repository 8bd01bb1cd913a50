//! Header manipulation and security headers.
//!
//! # Responsibilities
//! - Write the standard response headers on every downstream response
//! - Add X-Forwarded-For, X-Forwarded-Proto, X-Forwarded-Host
//! - Strip hop-by-hop headers in both directions
//!
//! # Design Decisions
//! - HSTS is sent only when the runtime terminates TLS, never on plaintext
//! - Existing X-Forwarded-* values from clients are replaced, not extended
//! - Standard headers overwrite whatever an upstream sent under the same name

use std::net::IpAddr;

use axum::http::header::{
    CACHE_CONTROL, CONNECTION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, SERVER,
    STRICT_TRANSPORT_SECURITY, TE, TRAILER, TRANSFER_ENCODING, UPGRADE, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderName, HeaderValue};

use crate::http::request::{RequestId, X_REQUEST_ID};
use crate::lifecycle::runtime::Runtime;

pub const CACHE_CONTROL_VALUE: &str = "no-store, no-cache, must-revalidate, proxy-revalidate";
pub const HSTS_VALUE: &str = "max-age=31536000";
pub const XSS_PROTECTION_VALUE: &str = "1;mode=block";
pub const CONTENT_TYPE_OPTIONS_VALUE: &str = "nosniff";
pub const FRAME_OPTIONS_VALUE: &str = "sameorigin";

pub const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
pub const X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");
pub const X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");

const KEEP_ALIVE: HeaderName = HeaderName::from_static("keep-alive");

/// Headers meaningful only for a single transport hop (RFC 9110 section 7.6.1).
const HOP_BY_HOP: [HeaderName; 8] = [
    CONNECTION,
    KEEP_ALIVE,
    PROXY_AUTHENTICATE,
    PROXY_AUTHORIZATION,
    TE,
    TRAILER,
    TRANSFER_ENCODING,
    UPGRADE,
];

/// Write the headers every downstream response carries.
pub fn write_standard_headers(headers: &mut HeaderMap, runtime: &Runtime, request_id: &RequestId) {
    match HeaderValue::from_str(&runtime.identity().server_header()) {
        Ok(server) => {
            headers.insert(SERVER, server);
        }
        Err(_) => {
            headers.remove(SERVER);
        }
    }
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(CACHE_CONTROL_VALUE));

    if runtime.is_tls_mode() {
        headers.insert(STRICT_TRANSPORT_SECURITY, HeaderValue::from_static(HSTS_VALUE));
    } else {
        headers.remove(STRICT_TRANSPORT_SECURITY);
    }

    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static(XSS_PROTECTION_VALUE));
    headers.insert(
        X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static(CONTENT_TYPE_OPTIONS_VALUE),
    );
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static(FRAME_OPTIONS_VALUE));
    headers.insert(X_REQUEST_ID, request_id.header_value());
}

/// Remove hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|token| HeaderName::from_bytes(token.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP {
        headers.remove(name);
    }
}

/// Replace the X-Forwarded-* headers with what this hop observed.
pub fn set_forwarded(headers: &mut HeaderMap, client: Option<IpAddr>, tls: bool, host: Option<HeaderValue>) {
    match client.and_then(|ip| HeaderValue::from_str(&ip.to_string()).ok()) {
        Some(value) => {
            headers.insert(X_FORWARDED_FOR, value);
        }
        None => {
            headers.remove(X_FORWARDED_FOR);
        }
    }

    let proto = if tls { "https" } else { "http" };
    headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static(proto));

    match host {
        Some(host) => {
            headers.insert(X_FORWARDED_HOST, host);
        }
        None => {
            headers.remove(X_FORWARDED_HOST);
        }
    }
}
