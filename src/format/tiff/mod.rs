//! TIFF container parsing.
//!
//! This module handles the structure of TIFF and BigTIFF files: the header,
//! the chain of IFDs, tag values, and the resolution of each IFD into a
//! decodable [`Page`].
//!
//! # Key Concepts
//!
//! - **Byte order**: TIFF files declare their endianness (II = little-endian, MM = big-endian)
//!   in the header. All multi-byte values must be read respecting this order.
//!
//! - **Classic TIFF vs BigTIFF**: Classic TIFF uses 32-bit offsets (max 4GB files),
//!   while BigTIFF uses 64-bit offsets. The parser handles both transparently.
//!
//! - **IFD (Image File Directory)**: One per page. Microscopy files store z-planes,
//!   channels and time points as consecutive pages.
//!
//! - **Inline vs offset values**: Small values are stored inline in the IFD entry,
//!   larger values are stored at an offset pointed to by the entry.

mod page;
mod parser;
mod tags;
mod values;

pub use page::{Page, SegmentLayout, TiffFile};
pub use parser::{ByteOrder, Ifd, IfdEntry, TiffHeader, BIGTIFF_HEADER_SIZE, TIFF_HEADER_SIZE};
pub use tags::{Compression, FieldType, ResolutionUnit, SampleFormat, TiffTag};
pub use values::{decode_value, TagValue, ValueReader};
