//! Pages of a TIFF file.
//!
//! A [`TiffFile`] is the header plus every IFD in the next-IFD chain, each
//! resolved into a [`Page`]: its geometry, element type, segment layout and
//! the full set of decoded tag values.
//!
//! # Page Layout
//!
//! Pixel data of a page is split into segments, either strips (full-width
//! bands of rows) or tiles. With planar configuration 2 every sample plane
//! has its own set of segments, stored plane after plane.

use std::collections::{BTreeMap, HashSet};

use bytes::Bytes;
use tracing::debug;

use crate::array::DataType;
use crate::error::TiffError;
use crate::format::detect::is_tiff_header;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, TiffHeader, BIGTIFF_HEADER_SIZE};
use super::tags::{SampleFormat, TiffTag};
use super::values::{TagValue, ValueReader};

// =============================================================================
// Constants
// =============================================================================

/// Maximum number of IFDs to parse (safety limit)
const MAX_PAGES: usize = 1_000_000;

/// PlanarConfiguration value for separate sample planes
const PLANAR_SEPARATE: u64 = 2;

// =============================================================================
// SegmentLayout
// =============================================================================

/// How a page's pixel data is split into segments.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentLayout {
    /// Full-width bands of `rows_per_strip` rows
    Strips { rows_per_strip: u32 },

    /// Rectangular tiles, padded to full size at the right and bottom edges
    Tiles { tile_width: u32, tile_height: u32 },
}

// =============================================================================
// Page
// =============================================================================

/// One IFD resolved into the information needed to decode it.
#[derive(Debug, Clone)]
pub struct Page {
    /// Index of this page in the IFD chain
    pub index: usize,

    /// Image width in pixels
    pub width: u32,

    /// Image height in pixels
    pub height: u32,

    /// Components per pixel
    pub samples_per_pixel: u16,

    /// Bits of each component (uniform across components)
    pub bits_per_sample: u16,

    /// Interpretation of each component
    pub sample_format: u16,

    /// Whether each component is stored in its own plane
    pub planar: bool,

    /// Compression code
    pub compression: u16,

    /// Predictor code (1 = none, 2 = horizontal differencing)
    pub predictor: u16,

    /// Photometric interpretation code
    pub photometric: u16,

    /// NewSubfileType flags
    pub subfile_type: u32,

    /// Strip or tile layout
    pub layout: SegmentLayout,

    /// File offset of each segment
    pub segment_offsets: Vec<u64>,

    /// Byte count of each segment
    pub segment_byte_counts: Vec<u64>,

    /// JPEGTables for abbreviated JPEG segments
    pub jpeg_tables: Option<Bytes>,

    /// Every decoded tag of the IFD
    pub tags: BTreeMap<u16, TagValue>,
}

impl Page {
    /// Resolve a page from its decoded tags.
    ///
    /// # Errors
    /// - `MissingTag` if a structural tag is absent
    /// - `InvalidTagValue` if segment arrays do not cover the page
    pub fn from_tags(index: usize, tags: BTreeMap<u16, TagValue>) -> Result<Self, TiffError> {
        let get = |tag: TiffTag| tags.get(&tag.as_u16());
        let scalar = |tag: TiffTag, default: u64| get(tag).and_then(TagValue::as_u64).unwrap_or(default);
        let required = |tag: TiffTag| {
            get(tag)
                .and_then(TagValue::as_u64)
                .ok_or(TiffError::MissingTag(tag.name()))
        };

        let width = to_u32(required(TiffTag::ImageWidth)?, TiffTag::ImageWidth)?;
        let height = to_u32(required(TiffTag::ImageLength)?, TiffTag::ImageLength)?;
        let samples_per_pixel = scalar(TiffTag::SamplesPerPixel, 1).max(1) as u16;

        let bits_per_sample = match get(TiffTag::BitsPerSample).and_then(TagValue::as_u64_vec) {
            Some(bits) if !bits.is_empty() => {
                if bits.iter().any(|&b| b != bits[0]) {
                    return Err(TiffError::InvalidTagValue {
                        tag: TiffTag::BitsPerSample.name(),
                        message: format!("mixed bit depths {:?}", bits),
                    });
                }
                bits[0] as u16
            }
            _ => 1,
        };

        let planar = samples_per_pixel > 1 && scalar(TiffTag::PlanarConfiguration, 1) == PLANAR_SEPARATE;

        let (layout, offsets_tag, counts_tag) = if get(TiffTag::TileOffsets).is_some() {
            let tile_width = to_u32(required(TiffTag::TileWidth)?, TiffTag::TileWidth)?;
            let tile_height = to_u32(required(TiffTag::TileLength)?, TiffTag::TileLength)?;
            (
                SegmentLayout::Tiles {
                    tile_width,
                    tile_height,
                },
                TiffTag::TileOffsets,
                TiffTag::TileByteCounts,
            )
        } else {
            // RowsPerStrip defaults to "the whole image" and is often 2^32 - 1
            let rows = scalar(TiffTag::RowsPerStrip, height as u64).clamp(1, height.max(1) as u64);
            (
                SegmentLayout::Strips {
                    rows_per_strip: rows as u32,
                },
                TiffTag::StripOffsets,
                TiffTag::StripByteCounts,
            )
        };

        let segment_offsets = get(offsets_tag)
            .and_then(TagValue::as_u64_vec)
            .ok_or(TiffError::MissingTag(offsets_tag.name()))?
            .to_vec();
        let segment_byte_counts = get(counts_tag)
            .and_then(TagValue::as_u64_vec)
            .ok_or(TiffError::MissingTag(counts_tag.name()))?
            .to_vec();

        let jpeg_tables = get(TiffTag::JpegTables)
            .and_then(TagValue::as_bytes)
            .map(Bytes::from);
        let sample_format = scalar(TiffTag::SampleFormat, 1) as u16;
        let compression = scalar(TiffTag::Compression, 1) as u16;
        let predictor = scalar(TiffTag::Predictor, 1) as u16;
        let photometric = scalar(TiffTag::PhotometricInterpretation, 1) as u16;
        let subfile_type = scalar(TiffTag::NewSubfileType, 0) as u32;

        let page = Page {
            index,
            width,
            height,
            samples_per_pixel,
            bits_per_sample,
            sample_format,
            planar,
            compression,
            predictor,
            photometric,
            subfile_type,
            layout,
            segment_offsets,
            segment_byte_counts,
            jpeg_tables,
            tags,
        };

        let expected = page.segment_count();
        if page.segment_offsets.len() < expected || page.segment_byte_counts.len() < expected {
            return Err(TiffError::InvalidTagValue {
                tag: offsets_tag.name(),
                message: format!(
                    "page {} needs {} segments, found {} offsets and {} byte counts",
                    index,
                    expected,
                    page.segment_offsets.len(),
                    page.segment_byte_counts.len()
                ),
            });
        }

        Ok(page)
    }

    /// Element type from BitsPerSample and SampleFormat.
    ///
    /// # Errors
    /// `UnsupportedSampleFormat` for bit depths other than 8/16/32/64, 8-bit
    /// floats, or unknown sample formats.
    pub fn dtype(&self) -> Result<DataType, TiffError> {
        let unsupported = || TiffError::UnsupportedSampleFormat {
            bits_per_sample: self.bits_per_sample,
            sample_format: self.sample_format,
        };
        let format = SampleFormat::from_u16(self.sample_format).ok_or_else(unsupported)?;

        match (format, self.bits_per_sample) {
            (SampleFormat::Uint, 8) => Ok(DataType::U8),
            (SampleFormat::Uint, 16) => Ok(DataType::U16),
            (SampleFormat::Uint, 32) => Ok(DataType::U32),
            (SampleFormat::Uint, 64) => Ok(DataType::U64),
            (SampleFormat::Int, 8) => Ok(DataType::I8),
            (SampleFormat::Int, 16) => Ok(DataType::I16),
            (SampleFormat::Int, 32) => Ok(DataType::I32),
            (SampleFormat::Int, 64) => Ok(DataType::I64),
            (SampleFormat::Float, 32) => Ok(DataType::F32),
            (SampleFormat::Float, 64) => Ok(DataType::F64),
            _ => Err(unsupported()),
        }
    }

    /// Shape of the decoded page: `(Y, X[, S])` chunky or `(S, Y, X)` planar.
    ///
    /// The sample axis is omitted when there is one sample per pixel.
    pub fn shape(&self) -> Vec<usize> {
        let (h, w, s) = (
            self.height as usize,
            self.width as usize,
            self.samples_per_pixel as usize,
        );
        match (s, self.planar) {
            (1, _) => vec![h, w],
            (_, true) => vec![s, h, w],
            (_, false) => vec![h, w, s],
        }
    }

    /// Axis labels matching [`Page::shape`].
    pub fn axes(&self) -> &'static str {
        match (self.samples_per_pixel, self.planar) {
            (1, _) => "YX",
            (_, true) => "SYX",
            (_, false) => "YXS",
        }
    }

    /// Number of sample planes holding their own segments.
    pub fn planes(&self) -> usize {
        if self.planar {
            self.samples_per_pixel as usize
        } else {
            1
        }
    }

    /// Samples interleaved inside each segment.
    pub fn samples_per_segment(&self) -> usize {
        if self.planar {
            1
        } else {
            self.samples_per_pixel as usize
        }
    }

    /// Number of segments per sample plane.
    pub fn segments_per_plane(&self) -> usize {
        match self.layout {
            SegmentLayout::Strips { rows_per_strip } => {
                (self.height as usize).div_ceil(rows_per_strip as usize)
            }
            SegmentLayout::Tiles {
                tile_width,
                tile_height,
            } => {
                if tile_width == 0 || tile_height == 0 {
                    return 0;
                }
                (self.width as usize).div_ceil(tile_width as usize)
                    * (self.height as usize).div_ceil(tile_height as usize)
            }
        }
    }

    /// Total number of segments of the page.
    pub fn segment_count(&self) -> usize {
        self.segments_per_plane() * self.planes()
    }

    /// Decoded size of the page in bytes.
    pub fn byte_size(&self) -> usize {
        self.shape().iter().product::<usize>() * (self.bits_per_sample as usize / 8)
    }

    /// ImageDescription text, if present.
    pub fn description(&self) -> Option<&str> {
        self.tags
            .get(&TiffTag::ImageDescription.as_u16())
            .and_then(TagValue::as_str)
    }

    /// Whether this page is a reduced-resolution copy of another page.
    pub fn is_reduced(&self) -> bool {
        self.subfile_type & 1 != 0
    }

    /// Whether two pages can be stacked into one array.
    pub fn same_geometry(&self, other: &Page) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.samples_per_pixel == other.samples_per_pixel
            && self.bits_per_sample == other.bits_per_sample
            && self.sample_format == other.sample_format
            && self.planar == other.planar
    }
}

fn to_u32(value: u64, tag: TiffTag) -> Result<u32, TiffError> {
    u32::try_from(value).map_err(|_| TiffError::InvalidTagValue {
        tag: tag.name(),
        message: format!("{} does not fit in 32 bits", value),
    })
}

// =============================================================================
// TiffFile
// =============================================================================

/// A parsed TIFF file: header plus every page in IFD-chain order.
#[derive(Debug, Clone)]
pub struct TiffFile {
    /// File header
    pub header: TiffHeader,

    /// Pages in file order
    pub pages: Vec<Page>,
}

impl TiffFile {
    /// Parse the header and every IFD of a file.
    ///
    /// Tag values stored out of line are fetched eagerly, so wrap the reader
    /// in a block cache when many pages are expected.
    ///
    /// # Errors
    /// - `NotTiff` if the magic bytes are not a TIFF or BigTIFF header
    /// - `InvalidIfdOffset` if the IFD chain leaves the file or loops
    pub async fn open<R: RangeReader>(reader: &R) -> Result<Self, TiffError> {
        let header_len = (BIGTIFF_HEADER_SIZE as u64).min(reader.size()) as usize;
        let header_bytes = reader.read_exact_at(0, header_len).await?;
        if !is_tiff_header(&header_bytes) {
            return Err(TiffError::NotTiff);
        }
        let header = TiffHeader::parse(&header_bytes, reader.size())?;

        let ifds = Self::parse_all_ifds(reader, &header).await?;
        let value_reader = ValueReader::new(reader, &header);

        let mut pages = Vec::with_capacity(ifds.len());
        for (index, ifd) in ifds.iter().enumerate() {
            let tags = value_reader.read_all(ifd).await?;
            pages.push(Page::from_tags(index, tags)?);
        }

        debug!(
            file = reader.identifier(),
            pages = pages.len(),
            bigtiff = header.is_bigtiff,
            "Parsed TIFF structure"
        );

        Ok(TiffFile { header, pages })
    }

    /// Parse all IFDs in the file following the next-IFD chain.
    async fn parse_all_ifds<R: RangeReader>(
        reader: &R,
        header: &TiffHeader,
    ) -> Result<Vec<Ifd>, TiffError> {
        let mut ifds = Vec::new();
        let mut visited = HashSet::new();
        let mut offset = header.first_ifd_offset;

        while offset != 0 && ifds.len() < MAX_PAGES {
            if offset >= reader.size() || !visited.insert(offset) {
                return Err(TiffError::InvalidIfdOffset(offset));
            }

            // First, read just enough to get the entry count
            let count_size = header.ifd_count_size();
            let count_bytes = reader.read_exact_at(offset, count_size).await?;
            let entry_count = if header.is_bigtiff {
                header.byte_order.read_u64(&count_bytes)
            } else {
                header.byte_order.read_u16(&count_bytes) as u64
            };

            let ifd_size = Ifd::calculate_size(entry_count, header)?;
            let ifd_bytes = reader.read_exact_at(offset, ifd_size).await?;
            let ifd = Ifd::parse(&ifd_bytes, header)?;

            offset = ifd.next_ifd_offset;
            ifds.push(ifd);
        }

        Ok(ifds)
    }

    /// Byte order of the file.
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }
}

// =============================================================================
// Tests
// =============================================================================
