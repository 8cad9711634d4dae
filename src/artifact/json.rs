//! JSON body artifacts

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use super::{ArtifactWriter, MockArtifact};
use crate::exchange::CapturedExchange;
use crate::{RecorderError, Result};

/// Decoded JSON object body
pub type JsonBody = Map<String, Value>;

/// Writes an exchange whose body is a JSON object as a pretty-printed artifact.
///
/// The destination file is only opened once the body has decoded, so a body
/// that is not JSON leaves any earlier artifact at that path untouched.
pub struct JsonArtifactWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
}

impl JsonArtifactWriter {
    /// Create a writer targeting `path`
    #[must_use]
    pub fn new(path: PathBuf) -> Self {
        Self { path, out: None }
    }

    /// Constructor suitable for a [`super::WriterRegistry`]
    #[must_use]
    pub fn boxed(path: PathBuf) -> Box<dyn ArtifactWriter> {
        Box::new(Self::new(path))
    }
}

impl ArtifactWriter for JsonArtifactWriter {
    fn write(&mut self, exchange: &CapturedExchange) -> Result<()> {
        let body: JsonBody = serde_json::from_slice(&exchange.body)?;
        let artifact = MockArtifact::from_exchange(exchange, body);

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        let out = self.out.insert(BufWriter::new(file));

        serde_json::to_writer_pretty(&mut *out, &artifact).map_err(io::Error::from)?;
        out.write_all(b"\n")?;

        Ok(())
    }

    fn close(self: Box<Self>) -> Result<()> {
        let Some(out) = self.out else {
            return Ok(());
        };

        let file = out
            .into_inner()
            .map_err(|e| RecorderError::Io(e.into_error()))?;
        file.sync_all()?;

        Ok(())
    }

    fn destination(&self) -> &Path {
        &self.path
    }
}
