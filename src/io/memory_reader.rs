use async_trait::async_trait;
use bytes::Bytes;

use super::{check_range, RangeReader};
use crate::error::IoError;

/// In-memory implementation of RangeReader.
///
/// Backs byte-stream inputs. Cloning is cheap: the underlying buffer is
/// reference counted.
#[derive(Debug, Clone)]
pub struct MemoryRangeReader {
    data: Bytes,
    identifier: String,
}

impl MemoryRangeReader {
    /// Create a reader over `data`, identified as `memory://<name>`.
    pub fn new(data: impl Into<Bytes>, name: &str) -> Self {
        Self {
            data: data.into(),
            identifier: format!("memory://{}", name),
        }
    }
}

#[async_trait]
impl RangeReader for MemoryRangeReader {
    async fn read_exact_at(&self, offset: u64, len: usize) -> Result<Bytes, IoError> {
        check_range(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data.slice(start..start + len))
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    fn identifier(&self) -> &str {
        &self.identifier
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_reader() {
        let reader = MemoryRangeReader::new(vec![1u8, 2, 3, 4], "stack.tif");
        assert_eq!(reader.identifier(), "memory://stack.tif");
        assert_eq!(reader.size(), 4);
        assert_eq!(&reader.read_exact_at(1, 2).await.unwrap()[..], &[2, 3]);
        assert!(reader.read_exact_at(3, 2).await.is_err());
    }
}
