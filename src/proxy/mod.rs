//! Recording proxy: forwards to the target and hands a copy of every
//! exchange to the capture pipeline

mod client;
mod headers;
mod http;

pub use client::{build_uri, UpstreamClient};
pub use headers::strip_hop_by_hop;
pub use http::RecordingProxy;

use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::{Body, Bytes};

use crate::{RecorderError, Result};

/// Boxed error type hyper bodies convert into
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Read a whole body, refusing to buffer more than `limit` bytes
///
/// # Errors
///
/// Returns [`RecorderError::DataTooLarge`] past the limit, or
/// [`RecorderError::Other`] if the body stream fails
pub async fn read_body<B>(body: B, limit: usize) -> Result<Bytes>
where
    B: Body,
    B::Error: Into<BoxError>,
{
    match Limited::new(body, limit).collect().await {
        Ok(collected) => Ok(collected.to_bytes()),
        Err(e) if e.is::<LengthLimitError>() => Err(RecorderError::DataTooLarge { limit }),
        Err(e) => Err(RecorderError::Other(format!("Failed to read body: {e}"))),
    }
}
