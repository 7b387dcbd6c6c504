//! # tiffscene
//!
//! Lazy, dimension-labeled access to multi-scene microscopy TIFF images.
//!
//! A TIFF file holds one or more series of pages. Each series is exposed as a
//! scene (`Image:<n>`) with axis labels, a shape and an element type. Scenes
//! are read as [`LabeledArray`]s: either fully in memory, or as a grid of
//! lazy blocks that each open the file only when they are forced.
//!
//! ## Features
//!
//! - **Axis inference**: placeholders such as `QYX` are resolved from the shape
//! - **Chunk plans**: choose which axes are read whole inside each block
//! - **Region reads**: only blocks intersecting a region are loaded
//! - **Physical pixel sizes**: resolution tags and ImageJ calibration in micrometers
//! - **TIFF and BigTIFF**: both byte orders; uncompressed, LZW, PackBits, Deflate and JPEG data
//!
//! ## Architecture
//!
//! - [`io`] - range readers and the LRU block cache
//! - [`mod@format`] - TIFF parsing, series grouping and pixel decoding
//! - [`source`] - where file handles come from
//! - [`dimensions`] - axis labels and dimension-order inference
//! - [`chunk_plan`] - partition of axes into a block grid
//! - [`grid`] - lazy blocks and their assembly
//! - [`metadata`] - pixel sizes, unit table and tag dumps
//! - [`reader`] - the scene reader
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use tiffscene::{LocalFileSource, ReaderOptions, TiffReader};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tiffscene::ReaderError> {
//!     let options = ReaderOptions::default().with_chunk_dims("ZYX".chars());
//!     let reader = TiffReader::open(LocalFileSource::new(), "stack.tif", options).await?;
//!
//!     println!("scenes: {:?}", reader.scenes().await?);
//!     let lazy = reader.read_lazy().await?;
//!     let data = lazy.compute().await?;
//!     println!("{} {:?}", data.dims_string(), data.data.shape());
//!     Ok(())
//! }
//! ```

pub mod array;
pub mod chunk_plan;
pub mod config;
pub mod dimensions;
pub mod error;
pub mod format;
pub mod grid;
pub mod io;
pub mod metadata;
pub mod reader;
pub mod source;

// Re-export commonly used types
pub use array::{DataType, ImageData, Statistics};
pub use chunk_plan::ChunkPlan;
pub use config::{Cli, Command};
pub use dimensions::{infer, DimensionGuesser, GreedyMerge, DEFAULT_CHUNK_DIMS, REQUIRED_CHUNK_DIMS};
pub use error::{IoError, PixelSizeError, ReaderError, TiffError};
pub use format::tiff::{TagValue, TiffFile};
pub use format::{detect_dialect, is_tiff_header, Series, TiffDialect};
pub use grid::{BlockLoader, LazyArray, LazyBlock};
pub use io::{BlockCache, LocalFileReader, MemoryRangeReader, RangeReader};
pub use metadata::{Attributes, PhysicalPixelSizes};
pub use reader::{
    ChannelNames, DimOrder, LabeledArray, ReaderOptions, SceneRef, SceneSummary, TiffReader,
    SUPPORTED_EXTENSIONS,
};
pub use source::{ImageSource, LocalFileSource, MemorySource};
