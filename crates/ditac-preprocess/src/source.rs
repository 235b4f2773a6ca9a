//! Where document text comes from.

use crate::error::{PreprocessError, Result};
use std::collections::HashMap;
use url::Url;

/// Fetches the text of a document given its absolute URL.
///
/// The document cache calls this at most once per URL and run.
pub trait DocumentSource {
    fn fetch(&self, url: &Url) -> Result<String>;
}

/// Reads `file:` URLs from the local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileSystemSource;

impl DocumentSource for FileSystemSource {
    fn fetch(&self, url: &Url) -> Result<String> {
        if url.scheme() != "file" {
            return Err(PreprocessError::load(url, "only file: URLs can be read"));
        }
        let path = url
            .to_file_path()
            .map_err(|()| PreprocessError::load(url, "not a local file path"))?;
        std::fs::read_to_string(&path).map_err(|e| PreprocessError::load(url, e))
    }
}

/// Documents held in memory, keyed by URL without fragment.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    documents: HashMap<String, String>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `text` under `url`, which must be absolute.
    pub fn insert(&mut self, url: &str, text: impl Into<String>) {
        self.documents.insert(url.to_string(), text.into());
    }

    /// Builder form of [`MemorySource::insert`].
    pub fn with(mut self, url: &str, text: impl Into<String>) -> Self {
        self.insert(url, text);
        self
    }
}

impl DocumentSource for MemorySource {
    fn fetch(&self, url: &Url) -> Result<String> {
        let mut key = url.clone();
        key.set_fragment(None);
        self.documents
            .get(key.as_str())
            .cloned()
            .ok_or_else(|| PreprocessError::load(url, "no such document"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_source_ignores_fragment() {
        let source = MemorySource::new().with("file:///doc/a.dita", "<topic id='a'/>");
        let url = Url::parse("file:///doc/a.dita#a").unwrap();
        assert_eq!(source.fetch(&url).unwrap(), "<topic id='a'/>");
        let missing = Url::parse("file:///doc/b.dita").unwrap();
        assert!(source.fetch(&missing).is_err());
    }

    #[test]
    fn test_file_system_source_rejects_http() {
        let url = Url::parse("http://example.com/a.dita").unwrap();
        assert!(FileSystemSource.fetch(&url).is_err());
    }
}
