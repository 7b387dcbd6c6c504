//! TIFF reading: container structure, series grouping and pixel decoding.
//!
//! # Format Detection
//!
//! [`detect::is_tiff_header`] checks the magic bytes of a byte stream, and
//! [`detect::detect_dialect`] identifies the writer convention of a parsed
//! file, which decides how its pages are grouped into series.
//!
//! # Reading
//!
//! [`tiff::TiffFile::open`] parses every page, [`series::group_series`] groups
//! pages into n-dimensional series, and [`decode::read_selection`] decodes the
//! pages a selection touches.

pub mod decode;
pub mod detect;
pub mod jpeg;
pub mod series;
pub mod tiff;

pub use decode::{read_page, read_selection};
pub use detect::{detect_dialect, is_tiff_header, TiffDialect};
pub use series::{group_series, ImageJMetadata, Series, SeriesKind};
