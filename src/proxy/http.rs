//! HTTP handler that records while it proxies

use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Body, Bytes};
use hyper::header::HOST;
use hyper::{HeaderMap, Method, Request, Response, StatusCode};
use tracing::{debug, warn};

use super::client::{build_uri, UpstreamClient};
use super::headers::strip_hop_by_hop;
use super::{read_body, BoxError};
use crate::capture::HandOff;
use crate::config::RecorderConfig;
use crate::exchange::CapturedExchange;
use crate::{RecorderError, Result};

/// Forwards every inbound request to the target and records the answer
pub struct RecordingProxy {
    forwarder: Arc<Forwarder>,
    max_request_size: usize,
}

/// The part of the proxy a forwarded exchange needs after the inbound
/// connection is gone
struct Forwarder {
    target: String,
    client: UpstreamClient,
    handoff: HandOff,
    max_response_size: usize,
}

impl RecordingProxy {
    /// Create a proxy for `config.target` that hands exchanges to `handoff`
    ///
    /// # Errors
    ///
    /// Returns error if the upstream client cannot be built
    pub fn new(config: &RecorderConfig, handoff: HandOff) -> Result<Self> {
        Ok(Self {
            forwarder: Arc::new(Forwarder {
                target: config.target.clone(),
                client: UpstreamClient::new(config.timeouts.upstream())?,
                handoff,
                max_response_size: config.limits.max_response_size,
            }),
            max_request_size: config.limits.max_request_size,
        })
    }

    /// Handle one inbound request.
    ///
    /// Failures never panic and never produce an artifact; the caller gets an
    /// error status instead. Once the request body has been read, forwarding
    /// and recording run on their own task, so a caller that disconnects
    /// early does not cancel the recording.
    pub async fn handle<B>(&self, request: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let method = request.method().clone();
        let uri = request.uri().clone();

        match self.record(request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Failed to proxy {} {}: {}", method, uri, e);
                error_response(&e)
            }
        }
    }

    async fn record<B>(&self, request: Request<B>) -> Result<Response<Full<Bytes>>>
    where
        B: Body,
        B::Error: Into<BoxError>,
    {
        let (parts, body) = request.into_parts();
        debug!("Received {} {}", parts.method, parts.uri);

        let body = read_body(body, self.max_request_size)
            .await
            .map_err(|e| match e {
                RecorderError::DataTooLarge { .. } => e,
                other => RecorderError::Validation(other.to_string()),
            })?;

        let uri = build_uri(&self.forwarder.target, parts.uri.path_and_query())?;

        let mut headers = parts.headers;
        strip_hop_by_hop(&mut headers);
        headers.remove(HOST);

        let mut outbound = Request::builder()
            .method(parts.method.clone())
            .uri(uri)
            .body(Full::new(body))
            .map_err(|e| RecorderError::Other(format!("Failed to build request: {e}")))?;
        *outbound.headers_mut() = headers.clone();

        let method = parts.method;
        let path = parts.uri.path().to_string();
        let forwarder = Arc::clone(&self.forwarder);
        tokio::spawn(async move { forwarder.forward(method, path, headers, outbound).await })
            .await
            .map_err(|e| RecorderError::Other(format!("Forwarding task failed: {e}")))?
    }
}

impl Forwarder {
    /// Send `outbound` upstream, hand the exchange to the pipeline and return
    /// the caller's copy of the response
    async fn forward(
        &self,
        method: Method,
        path: String,
        request_headers: HeaderMap,
        outbound: Request<Full<Bytes>>,
    ) -> Result<Response<Full<Bytes>>> {
        let upstream = self
            .client
            .fetch(outbound, self.max_response_size)
            .await?;

        let (response, exchange) = tee_response(method, path, request_headers, upstream);
        let recorded_path = exchange.path.clone();

        if let Err(e) = self.handoff.hand_off(exchange).await {
            warn!("Exchange for {} not recorded: {}", recorded_path, e);
        }

        Ok(response)
    }
}

/// Split a drained upstream response into the caller's copy and the
/// pipeline's copy. Both share the same buffer.
fn tee_response(
    method: Method,
    path: String,
    request_headers: HeaderMap,
    upstream: Response<Bytes>,
) -> (Response<Full<Bytes>>, CapturedExchange) {
    let (mut parts, body) = upstream.into_parts();

    let exchange = CapturedExchange {
        method,
        path,
        request_headers,
        status: parts.status,
        response_headers: parts.headers.clone(),
        body: body.clone(),
    };

    strip_hop_by_hop(&mut parts.headers);
    (Response::from_parts(parts, Full::new(body)), exchange)
}

/// Map an error to the status the caller sees
fn error_response(error: &RecorderError) -> Response<Full<Bytes>> {
    let status = match error {
        RecorderError::Validation(_) => StatusCode::BAD_REQUEST,
        RecorderError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        RecorderError::Upstream(_) => StatusCode::BAD_GATEWAY,
        RecorderError::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let mut response = Response::new(Full::new(Bytes::from(format!("Error: {error}"))));
    *response.status_mut() = status;
    response
}
