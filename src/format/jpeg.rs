//! JPEG segment handling.
//!
//! TIFF writers commonly store JPEG segments as "abbreviated streams": each
//! strip or tile lacks the quantization (DQT) and Huffman (DHT) tables, which
//! are stored once in the page's `JPEGTables` tag. Such segments must be
//! merged with the tables before a standard decoder can read them.
//!
//! # Merging Process
//!
//! 1. JPEGTables starts with SOI (FFD8) and ends with EOI (FFD9)
//! 2. Segment data also starts with SOI and ends with EOI
//! 3. To merge: strip EOI from tables, strip SOI from segment, concatenate

use bytes::{Bytes, BytesMut};
use image::ImageFormat;

// =============================================================================
// JPEG Markers
// =============================================================================

/// Start Of Image marker
pub const SOI: [u8; 2] = [0xFF, 0xD8];

/// End Of Image marker
pub const EOI: [u8; 2] = [0xFF, 0xD9];

/// Define Huffman Table marker
pub const DHT: [u8; 2] = [0xFF, 0xC4];

/// Define Quantization Table marker
pub const DQT: [u8; 2] = [0xFF, 0xDB];

/// Start Of Scan marker
pub const SOS: [u8; 2] = [0xFF, 0xDA];

// =============================================================================
// Stream Analysis
// =============================================================================

/// Check whether a JPEG stream carries its own tables.
///
/// Walks the marker segments after SOI and reports whether a DQT or DHT
/// segment appears before the first SOS.
pub fn has_tables(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut pos = 2;
    while pos + 3 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }

        let marker = [data[pos], data[pos + 1]];
        if marker == DQT || marker == DHT {
            return true;
        }
        if marker == SOS {
            return false;
        }

        // Standalone markers have no length field
        if matches!(marker[1], 0x00 | 0x01 | 0xD0..=0xD9 | 0xFF) {
            pos += if marker[1] == 0xFF { 1 } else { 2 };
        } else {
            let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            pos += 2 + length;
        }
    }

    false
}

// =============================================================================
// Tables Merging
// =============================================================================

/// Merge JPEGTables with abbreviated segment data.
///
/// The result keeps proper JPEG structure: SOI + tables + scan data + EOI.
pub fn merge_jpeg_tables(tables: &[u8], segment: &[u8]) -> Bytes {
    if tables.is_empty() {
        return Bytes::copy_from_slice(segment);
    }
    if segment.is_empty() {
        return Bytes::new();
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let segment_start = if segment.starts_with(&SOI) { 2 } else { 0 };

    let mut result = BytesMut::with_capacity(tables_end + segment.len() - segment_start);
    result.extend_from_slice(&tables[..tables_end]);
    result.extend_from_slice(&segment[segment_start..]);
    result.freeze()
}

/// Complete a segment with the page's tables when it needs them.
pub fn prepare_segment(tables: Option<&[u8]>, segment: &[u8]) -> Bytes {
    match tables {
        Some(tables) if !has_tables(segment) => merge_jpeg_tables(tables, segment),
        _ => Bytes::copy_from_slice(segment),
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// Decode a JPEG segment into interleaved 8-bit samples.
///
/// Returns `(width, height, samples)`. Only one (gray) or three (color)
/// samples per pixel are supported; YCbCr data is converted to RGB.
pub fn decode_segment(
    tables: Option<&[u8]>,
    segment: &[u8],
    samples_per_pixel: usize,
) -> Result<(u32, u32, Vec<u8>), String> {
    let stream = prepare_segment(tables, segment);
    let image = image::load_from_memory_with_format(&stream, ImageFormat::Jpeg)
        .map_err(|e| e.to_string())?;
    let (width, height) = (image.width(), image.height());

    let samples = match samples_per_pixel {
        1 => image.into_luma8().into_raw(),
        3 => image.into_rgb8().into_raw(),
        n => return Err(format!("JPEG with {} samples per pixel", n)),
    };

    Ok((width, height, samples))
}

// =============================================================================
// Tests
// =============================================================================
