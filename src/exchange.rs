//! Snapshot of one proxied HTTP transaction

use bytes::Bytes;
use hyper::header::CONTENT_TYPE;
use hyper::{HeaderMap, Method, StatusCode};

/// One proxied request/response pair, fully materialized.
///
/// The body is an owned [`Bytes`] view, so an exchange can be persisted at any
/// later point without keeping the upstream connection open.
#[derive(Debug, Clone)]
pub struct CapturedExchange {
    /// Request method
    pub method: Method,
    /// Request path, without the query string
    pub path: String,
    /// Request headers as forwarded to the target
    pub request_headers: HeaderMap,
    /// Upstream status
    pub status: StatusCode,
    /// Upstream response headers
    pub response_headers: HeaderMap,
    /// Upstream response body
    pub body: Bytes,
}

impl CapturedExchange {
    /// Raw `Content-Type` of the response, if present and readable
    #[must_use]
    pub fn content_type(&self) -> Option<&str> {
        self.response_headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}
