//! Byte-level access to image files.
//!
//! Every read in the crate goes through the [`RangeReader`] trait, so the TIFF
//! parser never needs the whole file in memory. Handles are cheap to create
//! and are wrapped in a [`BlockCache`] to coalesce the many small reads that
//! IFD parsing produces.

mod block_cache;
mod file_reader;
mod memory_reader;
mod range_reader;

pub use block_cache::{BlockCache, DEFAULT_BLOCK_CACHE_CAPACITY, DEFAULT_BLOCK_SIZE};
pub use file_reader::LocalFileReader;
pub use memory_reader::MemoryRangeReader;
pub use range_reader::RangeReader;

pub(crate) use range_reader::check_range;
