//! Page and series decoding.
//!
//! Pages are decoded segment by segment (strip or tile) into one packed
//! buffer in the file's byte order, laid out like [`Page::shape`]. Series
//! selections stack the decoded pages they touch and drop the axes that were
//! fixed to a single index.
//!
//! Supported segment encodings:
//! - no compression
//! - LZW (MSB-first codes with the TIFF early code-size switch)
//! - PackBits run-length encoding
//! - Deflate / Adobe Deflate (zlib streams)
//! - JPEG, including abbreviated streams completed from JPEGTables
//!
//! The horizontal predictor (2) is undone for integer samples.

use std::io::Read;
use std::ops::Range;

use flate2::read::ZlibDecoder;
use tracing::trace;
use weezl::{decode::Decoder as LzwDecoder, BitOrder};

use crate::array::{unravel_index, ImageData};
use crate::error::TiffError;
use crate::io::RangeReader;

use super::jpeg;
use super::series::Series;
use super::tiff::{ByteOrder, Compression, Page, SegmentLayout, TiffFile};

// =============================================================================
// Constants
// =============================================================================

/// Predictor: no prediction
const PREDICTOR_NONE: u16 = 1;

/// Predictor: horizontal differencing
const PREDICTOR_HORIZONTAL: u16 = 2;

// =============================================================================
// Segment geometry
// =============================================================================

/// Placement of one decoded segment inside its page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SegmentRegion {
    /// Sample plane (always 0 for chunky pages)
    plane: usize,

    /// First row covered by the segment
    y0: usize,

    /// First column covered by the segment
    x0: usize,

    /// Stored width of the segment (tile width or page width)
    stored_width: usize,

    /// Stored rows of the segment (full tile height, or the strip's rows)
    stored_rows: usize,

    /// Columns that fall inside the page
    width: usize,

    /// Rows that fall inside the page
    rows: usize,
}

fn segment_region(page: &Page, segment: usize) -> SegmentRegion {
    let per_plane = page.segments_per_plane().max(1);
    let plane = segment / per_plane;
    let local = segment % per_plane;
    let (page_w, page_h) = (page.width as usize, page.height as usize);

    match page.layout {
        SegmentLayout::Strips { rows_per_strip } => {
            let rps = rows_per_strip as usize;
            let y0 = local * rps;
            let rows = rps.min(page_h.saturating_sub(y0));
            SegmentRegion {
                plane,
                y0,
                x0: 0,
                stored_width: page_w,
                stored_rows: rows,
                width: page_w,
                rows,
            }
        }
        SegmentLayout::Tiles {
            tile_width,
            tile_height,
        } => {
            let (tw, th) = (tile_width as usize, tile_height as usize);
            let across = page_w.div_ceil(tw);
            let (y0, x0) = ((local / across) * th, (local % across) * tw);
            SegmentRegion {
                plane,
                y0,
                x0,
                stored_width: tw,
                stored_rows: th,
                width: tw.min(page_w - x0),
                rows: th.min(page_h - y0),
            }
        }
    }
}

// =============================================================================
// Segment decoding
// =============================================================================

/// Check that a page's encoding can be decoded.
///
/// # Errors
/// - `UnsupportedCompression` for compression schemes or predictors that
///   are not implemented
/// - `UnsupportedSampleFormat` for JPEG pages that are not 8-bit
pub fn check_decodable(page: &Page) -> Result<(), TiffError> {
    let compression = Compression::from_u16(page.compression)
        .filter(|c| c.is_supported())
        .ok_or_else(|| {
            let name = Compression::from_u16(page.compression)
                .map(|c| c.name().to_string())
                .unwrap_or_else(|| format!("code {}", page.compression));
            TiffError::UnsupportedCompression(name)
        })?;

    if compression == Compression::Jpeg && page.bits_per_sample != 8 {
        return Err(TiffError::UnsupportedSampleFormat {
            bits_per_sample: page.bits_per_sample,
            sample_format: page.sample_format,
        });
    }

    match page.predictor {
        PREDICTOR_NONE => Ok(()),
        PREDICTOR_HORIZONTAL if page.sample_format != 3 => Ok(()),
        other => Err(TiffError::UnsupportedCompression(format!(
            "predictor {} for sample format {}",
            other, page.sample_format
        ))),
    }
}

/// Decompress one segment into packed samples.
fn decompress(
    page: &Page,
    segment: usize,
    raw: &[u8],
    region: &SegmentRegion,
) -> Result<Vec<u8>, TiffError> {
    let decode_err = |message: String| TiffError::Decode { segment, message };

    match Compression::from_u16(page.compression) {
        Some(Compression::None) => Ok(raw.to_vec()),
        Some(Compression::Lzw) => decode_lzw(raw).map_err(decode_err),
        Some(Compression::PackBits) => unpack_bits(raw).map_err(decode_err),
        Some(Compression::Deflate) | Some(Compression::AdobeDeflate) => {
            let mut out = Vec::new();
            ZlibDecoder::new(raw)
                .read_to_end(&mut out)
                .map_err(|e| decode_err(e.to_string()))?;
            Ok(out)
        }
        Some(Compression::Jpeg) => {
            let (width, _, samples) = jpeg::decode_segment(
                page.jpeg_tables.as_deref(),
                raw,
                page.samples_per_segment(),
            )
            .map_err(decode_err)?;
            if width as usize != region.stored_width {
                return Err(decode_err(format!(
                    "JPEG width {} does not match segment width {}",
                    width, region.stored_width
                )));
            }
            Ok(samples)
        }
        _ => Err(TiffError::UnsupportedCompression(format!(
            "code {}",
            page.compression
        ))),
    }
}

/// Decode a TIFF LZW stream.
///
/// Streams without an end-of-information code are accepted.
fn decode_lzw(raw: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    let mut decoder = LzwDecoder::with_tiff_size_switch(BitOrder::Msb, 8);
    decoder
        .into_vec(&mut out)
        .decode(raw)
        .status
        .map_err(|e| format!("LZW: {}", e))?;
    Ok(out)
}

/// Expand PackBits runs.
///
/// A header byte `n` in `0..=127` copies the next `n + 1` bytes, `-127..=-1`
/// repeats the next byte `1 - n` times, and `-128` is a no-op.
fn unpack_bits(raw: &[u8]) -> Result<Vec<u8>, String> {
    let mut out = Vec::with_capacity(raw.len() * 2);
    let mut pos = 0;

    while pos < raw.len() {
        let header = raw[pos] as i8;
        pos += 1;
        match header {
            -128 => {}
            0..=127 => {
                let n = header as usize + 1;
                let literal = raw.get(pos..pos + n).ok_or_else(|| {
                    format!("PackBits literal of {} bytes runs past the segment", n)
                })?;
                out.extend_from_slice(literal);
                pos += n;
            }
            _ => {
                let n = (1 - header as i16) as usize;
                let value = *raw
                    .get(pos)
                    .ok_or_else(|| "PackBits run without a value byte".to_string())?;
                out.resize(out.len() + n, value);
                pos += 1;
            }
        }
    }

    Ok(out)
}

/// Undo horizontal differencing, row by row, in place.
fn undo_horizontal_predictor(
    data: &mut [u8],
    row_samples: usize,
    samples_per_pixel: usize,
    bytes_per_sample: usize,
    byte_order: ByteOrder,
) {
    let row_bytes = row_samples * bytes_per_sample;
    if row_bytes == 0 {
        return;
    }

    for row in data.chunks_exact_mut(row_bytes) {
        for i in samples_per_pixel..row_samples {
            let cur = i * bytes_per_sample;
            let prev = (i - samples_per_pixel) * bytes_per_sample;
            match bytes_per_sample {
                1 => row[cur] = row[cur].wrapping_add(row[prev]),
                2 => {
                    let v = byte_order
                        .read_u16(&row[cur..])
                        .wrapping_add(byte_order.read_u16(&row[prev..]));
                    row[cur..cur + 2].copy_from_slice(&match byte_order {
                        ByteOrder::LittleEndian => v.to_le_bytes(),
                        ByteOrder::BigEndian => v.to_be_bytes(),
                    });
                }
                4 => {
                    let v = byte_order
                        .read_u32(&row[cur..])
                        .wrapping_add(byte_order.read_u32(&row[prev..]));
                    row[cur..cur + 4].copy_from_slice(&match byte_order {
                        ByteOrder::LittleEndian => v.to_le_bytes(),
                        ByteOrder::BigEndian => v.to_be_bytes(),
                    });
                }
                8 => {
                    let v = byte_order
                        .read_u64(&row[cur..])
                        .wrapping_add(byte_order.read_u64(&row[prev..]));
                    row[cur..cur + 8].copy_from_slice(&match byte_order {
                        ByteOrder::LittleEndian => v.to_le_bytes(),
                        ByteOrder::BigEndian => v.to_be_bytes(),
                    });
                }
                _ => {}
            }
        }
    }
}

// =============================================================================
// Page decoding
// =============================================================================

/// Decode a whole page into packed samples in the file's byte order.
///
/// The buffer is laid out like [`Page::shape`]. Segments with a byte count
/// of zero are left as zeros.
pub async fn read_page<R: RangeReader>(
    reader: &R,
    page: &Page,
    byte_order: ByteOrder,
) -> Result<Vec<u8>, TiffError> {
    check_decodable(page)?;

    let bps = page.bits_per_sample as usize / 8;
    let sps = page.samples_per_segment();
    let (page_w, page_h) = (page.width as usize, page.height as usize);
    let mut out = vec![0u8; page.byte_size()];

    for segment in 0..page.segment_count() {
        let (offset, count) = (
            page.segment_offsets[segment],
            page.segment_byte_counts[segment],
        );
        if count == 0 {
            continue;
        }

        let region = segment_region(page, segment);
        let len = usize::try_from(count).map_err(|_| TiffError::Decode {
            segment,
            message: format!("segment of {} bytes does not fit in memory", count),
        })?;
        let raw = reader.read_exact_at(offset, len).await?;
        let mut decoded = decompress(page, segment, &raw, &region)?;

        let stored_row_bytes = region.stored_width * sps * bps;
        let needed = region.rows * stored_row_bytes;
        if decoded.len() < needed {
            return Err(TiffError::Decode {
                segment,
                message: format!("decoded {} bytes, expected {}", decoded.len(), needed),
            });
        }

        if page.predictor == PREDICTOR_HORIZONTAL {
            let rows_present = (decoded.len() / stored_row_bytes).min(region.stored_rows);
            undo_horizontal_predictor(
                &mut decoded[..rows_present * stored_row_bytes],
                region.stored_width * sps,
                sps,
                bps,
                byte_order,
            );
        }

        let copy_bytes = region.width * sps * bps;
        let plane_base = region.plane * page_h * page_w;
        for r in 0..region.rows {
            let src = r * stored_row_bytes;
            let dst = (plane_base + ((region.y0 + r) * page_w + region.x0) * sps) * bps;
            out[dst..dst + copy_bytes].copy_from_slice(&decoded[src..src + copy_bytes]);
        }

        trace!(page = page.index, segment, bytes = count, "Decoded segment");
    }

    Ok(out)
}

// =============================================================================
// Series selection
// =============================================================================

/// Read part of a series.
///
/// `selection` holds one entry per series axis: `Some(i)` fixes the axis to
/// index `i` and removes it from the result, `None` keeps the full axis. Only
/// pages touched by the selection are decoded.
pub async fn read_selection<R: RangeReader>(
    reader: &R,
    file: &TiffFile,
    series: &Series,
    selection: &[Option<usize>],
) -> Result<ImageData, TiffError> {
    if selection.len() != series.shape.len() {
        return Err(TiffError::InvalidTagValue {
            tag: "selection",
            message: format!(
                "{} indices for a series with {} axes",
                selection.len(),
                series.shape.len()
            ),
        });
    }
    for (axis, (&index, &size)) in selection.iter().zip(&series.shape).enumerate() {
        if let Some(index) = index {
            if index >= size {
                return Err(TiffError::IndexOutOfBounds { axis, index, size });
            }
        }
    }

    let stack_ndim = series.stack_ndim();
    let stack_shape = &series.shape[..stack_ndim];
    let ranges: Vec<Range<usize>> = selection[..stack_ndim]
        .iter()
        .zip(stack_shape)
        .map(|(sel, &size)| match sel {
            Some(i) => *i..*i + 1,
            None => 0..size,
        })
        .collect();
    let sub_shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
    let sub_count: usize = sub_shape.iter().product();

    let mut buffer = Vec::new();
    for flat in 0..sub_count {
        let local = unravel_index(flat, &sub_shape);
        let page_pos = local
            .iter()
            .zip(&ranges)
            .zip(stack_shape)
            .fold(0, |acc, ((&i, range), &size)| acc * size + range.start + i);
        let page_index = series.pages[page_pos];
        let page = &file.pages[page_index];
        buffer.extend(read_page(reader, page, file.byte_order()).await?);
    }

    let mut full_shape = sub_shape;
    full_shape.extend(&series.shape[stack_ndim..]);
    let mut data = ImageData::from_raw(series.dtype, &full_shape, &buffer, file.byte_order())
        .map_err(|e| TiffError::Decode {
            segment: 0,
            message: format!("series {}: {}", series.index, e),
        })?;

    // Highest axis first so lower axis numbers stay valid
    for (axis, sel) in selection.iter().enumerate().rev() {
        if let Some(index) = *sel {
            let within = if axis < stack_ndim { 0 } else { index };
            data = data.index_axis(axis, within);
        }
    }

    Ok(data)
}

// =============================================================================
// Tests
// =============================================================================
