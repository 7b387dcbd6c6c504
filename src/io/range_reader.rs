use async_trait::async_trait;
use bytes::Bytes;

use crate::error::IoError;

/// Trait for reading byte ranges from an image file.
///
/// This abstraction allows the TIFF parser and the lazy block loaders to work
/// with files without reading them entirely. Implementations must be
/// thread-safe so that independently scheduled blocks can each hold one.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Read exactly `len` bytes starting at `offset`.
    ///
    /// Returns an error if the range is out of bounds or if the read fails.
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError>;

    /// Get the total size of the resource in bytes.
    fn size(&self) -> u64;

    /// Get a unique identifier for this resource (for logging).
    ///
    /// For local files this is the path, for in-memory streams `memory://<name>`.
    fn identifier(&self) -> &str;
}

/// Check that `offset..offset + len` lies within a resource of `size` bytes.
pub(crate) fn check_range(offset: u64, len: usize, size: u64) -> Result<(), IoError> {
    match offset.checked_add(len as u64) {
        Some(end) if end <= size => Ok(()),
        _ => Err(IoError::RangeOutOfBounds {
            offset,
            requested: len as u64,
            size,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_range() {
        assert!(check_range(0, 10, 10).is_ok());
        assert!(check_range(5, 0, 5).is_ok());
        assert!(matches!(
            check_range(5, 6, 10),
            Err(IoError::RangeOutOfBounds {
                offset: 5,
                requested: 6,
                size: 10
            })
        ));
        assert!(check_range(u64::MAX, 2, 10).is_err());
    }
}
