//! Content type to writer registry

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use super::json::JsonArtifactWriter;
use super::mimetypes::{self, APPLICATION_JSON};
use super::{mock_file_name, ArtifactWriter};

/// Builds a writer for the given destination file
pub type WriterConstructor = fn(PathBuf) -> Box<dyn ArtifactWriter>;

/// Maps response content types to artifact writers.
///
/// Keys are MIME essences (`type/subtype`), so `application/json;
/// charset=utf-8` resolves to the `application/json` entry.
#[derive(Clone)]
pub struct WriterRegistry {
    writers: HashMap<String, WriterConstructor>,
}

impl WriterRegistry {
    /// Registry with no formats
    #[must_use]
    pub fn empty() -> Self {
        Self {
            writers: HashMap::new(),
        }
    }

    /// Register (or replace) the writer for `content_type`
    #[must_use]
    pub fn register(mut self, content_type: &str, constructor: WriterConstructor) -> Self {
        self.writers
            .insert(mimetypes::essence(content_type), constructor);
        self
    }

    /// Pick a writer for a response.
    ///
    /// Returns `None` when the content type is missing or has no registered
    /// writer; such responses are not recorded.
    #[must_use]
    pub fn resolve(
        &self,
        content_type: Option<&str>,
        destination_dir: &Path,
        request_path: &str,
    ) -> Option<Box<dyn ArtifactWriter>> {
        let constructor = self.writers.get(&mimetypes::essence(content_type?))?;
        let destination = destination_dir.join(mock_file_name(request_path));
        Some(constructor(destination))
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::empty().register(APPLICATION_JSON, JsonArtifactWriter::boxed)
    }
}

impl fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut content_types: Vec<_> = self.writers.keys().collect();
        content_types.sort();
        f.debug_struct("WriterRegistry")
            .field("content_types", &content_types)
            .finish()
    }
}
