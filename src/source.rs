//! Byte-sequence sources for topology and spatial data
//!
//! Everything downstream works on in-memory bytes. Adapters that turn a
//! path (or anything else) into bytes live here and nowhere else.

use crate::error::{LyraError, LyraResult};
use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tracing::debug;

/// A readable source of bytes with a stable identity
#[async_trait]
pub trait ByteSource: Send + Sync {
    /// Read the complete contents
    async fn read(&self) -> LyraResult<Vec<u8>>;

    /// Identity used in cache keys; equal identities mean equal contents
    fn identity(&self) -> String;
}

/// File on the local filesystem
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ByteSource for FileSource {
    async fn read(&self) -> LyraResult<Vec<u8>> {
        debug!("Reading {}", self.path.display());
        fs::read(&self.path)
            .await
            .map_err(|e| LyraError::io(format!("reading {}", self.path.display()), e))
    }

    fn identity(&self) -> String {
        // Absolute so that the same file always maps to the same cache key
        std::path::absolute(&self.path)
            .unwrap_or_else(|_| self.path.clone())
            .display()
            .to_string()
    }
}

/// Bytes already in memory, e.g. an upload
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    bytes: Vec<u8>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[async_trait]
impl ByteSource for MemorySource {
    async fn read(&self) -> LyraResult<Vec<u8>> {
        Ok(self.bytes.clone())
    }

    fn identity(&self) -> String {
        self.name.clone()
    }
}

/// Tabular encodings understood by the record parsers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    GeoJson,
    Csv,
}

impl SourceFormat {
    /// Sniff the format from the first non-whitespace byte
    pub fn detect(bytes: &[u8]) -> Self {
        match bytes.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Self::GeoJson,
            _ => Self::Csv,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn file_source_reads_contents() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("rsb.csv");
        std::fs::write(&path, "CatchIDN,DwnCatchIDN\n10,24\n").unwrap();

        let source = FileSource::new(&path);
        assert_eq!(source.read().await.unwrap(), b"CatchIDN,DwnCatchIDN\n10,24\n");
        assert!(source.identity().ends_with("rsb.csv"));
    }

    #[tokio::test]
    async fn missing_file_is_io_error() {
        let source = FileSource::new("/nonexistent/rsb.json");
        assert!(matches!(source.read().await, Err(LyraError::Io { .. })));
    }

    #[test]
    fn detects_format() {
        assert_eq!(
            SourceFormat::detect(b"  \n{\"type\":\"FeatureCollection\"}"),
            SourceFormat::GeoJson
        );
        assert_eq!(SourceFormat::detect(b"CatchIDN,DwnCatchIDN"), SourceFormat::Csv);
    }
}
