//! Mock artifacts: the persisted form of a captured exchange

mod factory;
mod json;
pub mod mimetypes;

use std::collections::BTreeMap;
use std::path::Path;

use hyper::HeaderMap;
use serde::{Deserialize, Serialize};

use crate::exchange::CapturedExchange;
use crate::Result;

pub use factory::{WriterConstructor, WriterRegistry};
pub use json::{JsonArtifactWriter, JsonBody};

/// Extension every artifact file carries
pub const ARTIFACT_EXTENSION: &str = ".json";

/// Header name to values, sorted by name for stable output
pub type HeaderFields = BTreeMap<String, Vec<String>>;

/// Persisted representation of one exchange
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MockArtifact<B> {
    /// What was asked
    pub request: ArtifactRequest,
    /// What the target answered
    pub response: ArtifactResponse<B>,
}

/// Request half of an artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRequest {
    /// Request headers
    pub headers: HeaderFields,
    /// Request method
    pub method: String,
    /// Request path
    pub path: String,
}

/// Response half of an artifact, generic over the decoded body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactResponse<B> {
    /// Upstream status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderFields,
    /// Decoded body
    pub body: B,
}

impl<B> MockArtifact<B> {
    /// Compose an artifact from an exchange and its decoded body
    pub fn from_exchange(exchange: &CapturedExchange, body: B) -> Self {
        Self {
            request: ArtifactRequest {
                headers: header_fields(&exchange.request_headers),
                method: exchange.method.as_str().to_string(),
                path: exchange.path.clone(),
            },
            response: ArtifactResponse {
                status: exchange.status.as_u16(),
                headers: header_fields(&exchange.response_headers),
                body,
            },
        }
    }
}

/// Flatten a header map, keeping repeated headers as multiple values
#[must_use]
pub fn header_fields(headers: &HeaderMap) -> HeaderFields {
    let mut fields = HeaderFields::new();
    for (name, value) in headers {
        fields
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    fields
}

/// File name of the artifact recorded for `request_path`.
///
/// Every `/` becomes `_`, so `/users/42` maps to `_users_42.json`. The mapping
/// is deterministic: recording the same path again overwrites the same file.
#[must_use]
pub fn mock_file_name(request_path: &str) -> String {
    let mut name = request_path.replace('/', "_");
    name.push_str(ARTIFACT_EXTENSION);
    name
}

/// Writes one artifact and releases its resources on close.
///
/// Implementations are driven from a blocking context, one artifact per
/// writer. Callers must call [`ArtifactWriter::close`] after every
/// [`ArtifactWriter::write`] attempt, whether it succeeded or not.
pub trait ArtifactWriter: Send {
    /// Persist `exchange`
    ///
    /// # Errors
    ///
    /// Returns error if the body cannot be decoded or the artifact cannot be
    /// written
    fn write(&mut self, exchange: &CapturedExchange) -> Result<()>;

    /// Flush and release the underlying handle
    ///
    /// # Errors
    ///
    /// Returns error if flushing or syncing fails
    fn close(self: Box<Self>) -> Result<()>;

    /// Where the artifact lands
    fn destination(&self) -> &Path;
}
