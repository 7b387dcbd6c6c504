//! Image sources: where the bytes of a file come from.
//!
//! Every file handle in the crate is created through an [`ImageSource`]. The
//! scene reader opens one handle for the file structure, and every lazy block
//! opens its own handle when it is forced, so a source must be cheap to share
//! across tasks.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;
use crate::io::{LocalFileReader, MemoryRangeReader, RangeReader};

// =============================================================================
// ImageSource Trait
// =============================================================================

/// Trait for creating range readers from paths.
///
/// This abstraction lets the scene reader and its lazy blocks work with
/// different storage backends (local files, in-memory byte streams) without
/// being tied to a specific implementation.
#[async_trait]
pub trait ImageSource: Send + Sync + 'static {
    /// The type of range reader this source creates.
    type Reader: RangeReader + 'static;

    /// Open a new handle on the file at `path`.
    async fn create_reader(&self, path: &str) -> Result<Self::Reader, IoError>;
}

// =============================================================================
// LocalFileSource
// =============================================================================

/// Opens files on the local filesystem.
///
/// Relative paths are resolved against an optional root directory.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSource {
    root: Option<PathBuf>,
}

impl LocalFileSource {
    /// Source resolving paths against the current directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source resolving relative paths against `root`.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        match &self.root {
            Some(root) if Path::new(path).is_relative() => root.join(path),
            _ => PathBuf::from(path),
        }
    }
}

#[async_trait]
impl ImageSource for LocalFileSource {
    type Reader = LocalFileReader;

    async fn create_reader(&self, path: &str) -> Result<Self::Reader, IoError> {
        LocalFileReader::open(self.resolve(path)).await
    }
}

// =============================================================================
// MemorySource
// =============================================================================

/// Serves in-memory byte streams by name.
///
/// Cloning shares the files and the open counter.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: Arc<HashMap<String, Bytes>>,
    opens: Arc<AtomicUsize>,
}

impl MemorySource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source holding a single byte stream.
    pub fn single(name: &str, data: impl Into<Bytes>) -> Self {
        Self::new().with_file(name, data)
    }

    /// Add a byte stream under `name`.
    pub fn with_file(mut self, name: &str, data: impl Into<Bytes>) -> Self {
        Arc::make_mut(&mut self.files).insert(name.to_string(), data.into());
        self
    }

    /// Number of handles opened so far.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageSource for MemorySource {
    type Reader = MemoryRangeReader;

    async fn create_reader(&self, path: &str) -> Result<Self::Reader, IoError> {
        let data = self
            .files
            .get(path)
            .cloned()
            .ok_or_else(|| IoError::NotFound(path.to_string()))?;
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryRangeReader::new(data, path))
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_memory_source_counts_opens() {
        let source = MemorySource::single("a.tif", vec![1u8, 2, 3]);
        let shared = source.clone();

        let reader = source.create_reader("a.tif").await.unwrap();
        assert_eq!(reader.size(), 3);
        assert_eq!(reader.identifier(), "memory://a.tif");
        shared.create_reader("a.tif").await.unwrap();

        assert_eq!(source.open_count(), 2);
    }

    #[tokio::test]
    async fn test_memory_source_missing() {
        let source = MemorySource::new().with_file("a.tif", vec![0u8]);
        let result = source.create_reader("b.tif").await;
        assert!(matches!(result, Err(IoError::NotFound(_))));
        assert_eq!(source.open_count(), 0);
    }

    #[tokio::test]
    async fn test_local_source_with_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("stack.tif")).unwrap();
        file.write_all(&[7u8; 16]).unwrap();

        let source = LocalFileSource::with_root(dir.path());
        let reader = source.create_reader("stack.tif").await.unwrap();
        assert_eq!(reader.size(), 16);

        assert!(source.create_reader("missing.tif").await.is_err());
    }
}
