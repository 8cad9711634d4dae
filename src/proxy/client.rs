//! HTTP client for forwarding requests to the target

use std::time::Duration;

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::http::uri::PathAndQuery;
use hyper::{Request, Response, Uri};
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use super::read_body;
use crate::{RecorderError, Result};

type HttpsClient = Client<HttpsConnector<HttpConnector>, Full<Bytes>>;

/// Client that forwards requests to the target and drains the answer
pub struct UpstreamClient {
    client: HttpsClient,
    timeout: Duration,
}

impl UpstreamClient {
    /// Create a client that speaks http and https.
    ///
    /// `timeout` bounds a whole exchange: connect, headers and body.
    ///
    /// # Errors
    ///
    /// Returns error if the TLS configuration cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let connector = HttpsConnectorBuilder::new()
            .with_provider_and_webpki_roots(rustls::crypto::ring::default_provider())
            .map_err(|e| RecorderError::Other(format!("Failed to configure TLS: {e}")))?
            .https_or_http()
            .enable_http1()
            .build();

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(connector);

        Ok(Self { client, timeout })
    }

    /// Forward `request` and read the full response body.
    ///
    /// The body is drained completely before this returns, so the upstream
    /// connection is released and the bytes can be shared freely.
    ///
    /// # Errors
    ///
    /// Returns [`RecorderError::UpstreamTimeout`] if the exchange takes longer
    /// than the configured timeout, and [`RecorderError::Upstream`] for
    /// transport failures or bodies over `max_response_size`.
    pub async fn fetch(
        &self,
        request: Request<Full<Bytes>>,
        max_response_size: usize,
    ) -> Result<Response<Bytes>> {
        debug!("Forwarding {} to {}", request.method(), request.uri());

        let exchange = async {
            let response = self.client.request(request).await.map_err(|e| {
                warn!("Request failed: {e}");
                RecorderError::Upstream(e.to_string())
            })?;

            let (parts, body) = response.into_parts();
            let body = read_body(body, max_response_size)
                .await
                .map_err(|e| RecorderError::Upstream(format!("Failed to read response body: {e}")))?;

            Ok::<_, RecorderError>(Response::from_parts(parts, body))
        };

        tokio::time::timeout(self.timeout, exchange)
            .await
            .map_err(|_| RecorderError::UpstreamTimeout(self.timeout))?
    }
}

/// Build the upstream URI: `target` followed by the inbound path and query
///
/// # Errors
///
/// Returns error if the result is not a valid URI
pub fn build_uri(target: &str, path_and_query: Option<&PathAndQuery>) -> Result<Uri> {
    let suffix = path_and_query.map_or("/", PathAndQuery::as_str);
    let uri = format!("{target}{suffix}");

    uri.parse::<Uri>()
        .map_err(|e| RecorderError::Other(format!("Invalid URI '{uri}': {e}")))
}
