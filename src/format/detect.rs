//! Writer-convention detection.
//!
//! The first full-resolution page's ImageDescription tells which program
//! wrote the file, and with it how pages are grouped into scenes:
//!
//! - **ImageJ**: description starts with `ImageJ=`; the first series is a
//!   hyperstack sized by the description
//! - **Shaped**: description is a JSON object with a `shape` key; each series
//!   starts at a page carrying such a description
//! - **OME-TIFF**: description is OME-XML, which is not interpreted; pages are
//!   grouped generically
//! - **Plain**: anything else; pages are grouped generically
//!
//! [`is_tiff_header`] is the magic-byte check [`TiffFile::open`] runs before
//! parsing anything else.
//!
//! [`TiffFile::open`]: super::tiff::TiffFile::open

use super::tiff::{ByteOrder, Page, TIFF_HEADER_SIZE};

const IMAGEJ_MARKER: &str = "ImageJ=";
const OME_MARKER: &str = "<OME";
const SHAPE_MARKER: &str = "\"shape\"";

/// Writer convention of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiffDialect {
    /// ImageJ hyperstack
    ImageJ,

    /// OME-TIFF (OME-XML in the first description)
    Ome,

    /// JSON `{"shape": ...}` descriptions
    Shaped,

    /// No recognized writer convention
    Plain,
}

impl TiffDialect {
    /// Human-readable name.
    pub const fn name(&self) -> &'static str {
        match self {
            TiffDialect::ImageJ => "ImageJ TIFF",
            TiffDialect::Ome => "OME-TIFF",
            TiffDialect::Shaped => "Shaped TIFF",
            TiffDialect::Plain => "TIFF",
        }
    }

    /// Classify an ImageDescription.
    pub fn from_description(description: &str) -> Self {
        let trimmed = description.trim_start();
        if trimmed.starts_with(IMAGEJ_MARKER) {
            TiffDialect::ImageJ
        } else if trimmed.contains(OME_MARKER) {
            TiffDialect::Ome
        } else if trimmed.starts_with('{') && trimmed.contains(SHAPE_MARKER) {
            TiffDialect::Shaped
        } else {
            TiffDialect::Plain
        }
    }
}

/// Dialect of a parsed file, from its first full-resolution page.
pub fn detect_dialect(pages: &[Page]) -> TiffDialect {
    pages
        .iter()
        .find(|p| !p.is_reduced())
        .and_then(Page::description)
        .map(TiffDialect::from_description)
        .unwrap_or(TiffDialect::Plain)
}

/// Whether `bytes` start with a TIFF or BigTIFF header (`II`/`MM`, version 42/43).
pub fn is_tiff_header(bytes: &[u8]) -> bool {
    if bytes.len() < TIFF_HEADER_SIZE {
        return false;
    }

    let byte_order = match &bytes[..2] {
        b"II" => ByteOrder::LittleEndian,
        b"MM" => ByteOrder::BigEndian,
        _ => return false,
    };

    matches!(byte_order.read_u16(&bytes[2..4]), 42 | 43)
}
