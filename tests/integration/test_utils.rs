//! Test utilities for integration tests.
//!
//! This module provides a small TIFF writer for building multi-page test
//! files in memory, plus helpers for opening them through a counting
//! [`MemorySource`].

use std::io::Write;

use flate2::write::ZlibEncoder;
use flate2::Compression as DeflateLevel;
use weezl::{encode::Encoder as LzwEncoder, BitOrder};

use tiffscene::{MemorySource, ReaderError, ReaderOptions, TiffReader};

/// Name every single-file test source stores its file under.
pub const TEST_PATH: &str = "test.tif";

// =============================================================================
// Tag values
// =============================================================================

const TYPE_ASCII: u16 = 2;
const TYPE_SHORT: u16 = 3;
const TYPE_LONG: u16 = 4;
const TYPE_RATIONAL: u16 = 5;

#[derive(Debug, Clone)]
enum Value {
    Short(Vec<u16>),
    Long(Vec<u32>),
    Rational(u32, u32),
    Ascii(String),
}

impl Value {
    fn field_type(&self) -> u16 {
        match self {
            Value::Short(_) => TYPE_SHORT,
            Value::Long(_) => TYPE_LONG,
            Value::Rational(..) => TYPE_RATIONAL,
            Value::Ascii(_) => TYPE_ASCII,
        }
    }

    fn count(&self) -> u32 {
        match self {
            Value::Short(v) => v.len() as u32,
            Value::Long(v) => v.len() as u32,
            Value::Rational(..) => 1,
            Value::Ascii(s) => s.len() as u32 + 1,
        }
    }

    fn bytes(&self) -> Vec<u8> {
        match self {
            Value::Short(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Long(v) => v.iter().flat_map(|x| x.to_le_bytes()).collect(),
            Value::Rational(num, den) => {
                let mut out = num.to_le_bytes().to_vec();
                out.extend(den.to_le_bytes());
                out
            }
            Value::Ascii(s) => {
                let mut out = s.as_bytes().to_vec();
                out.push(0);
                out
            }
        }
    }
}

// =============================================================================
// Strip encodings
// =============================================================================

/// Encoding applied to every strip of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StripCodec {
    Raw,
    Deflate,
    Lzw,
    PackBits,
}

impl StripCodec {
    fn code(self) -> u16 {
        match self {
            StripCodec::Raw => 1,
            StripCodec::Lzw => 5,
            StripCodec::Deflate => 8,
            StripCodec::PackBits => 32773,
        }
    }

    fn encode(self, strip: &[u8]) -> Vec<u8> {
        match self {
            StripCodec::Raw => strip.to_vec(),
            StripCodec::Deflate => {
                let mut encoder = ZlibEncoder::new(Vec::new(), DeflateLevel::default());
                encoder.write_all(strip).unwrap();
                encoder.finish().unwrap()
            }
            StripCodec::Lzw => LzwEncoder::with_tiff_size_switch(BitOrder::Msb, 8)
                .encode(strip)
                .unwrap(),
            StripCodec::PackBits => pack_bits(strip),
        }
    }
}

/// PackBits: runs of two or more equal bytes, literals otherwise.
fn pack_bits(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < data.len() {
        let run = data[pos..]
            .iter()
            .take(128)
            .take_while(|&&b| b == data[pos])
            .count();
        if run >= 2 {
            out.push((1 - run as i16) as i8 as u8);
            out.push(data[pos]);
            pos += run;
        } else {
            let start = pos;
            while pos < data.len()
                && pos - start < 128
                && !(pos + 1 < data.len() && data[pos] == data[pos + 1])
            {
                pos += 1;
            }
            out.push((pos - start - 1) as u8);
            out.extend_from_slice(&data[start..pos]);
        }
    }
    out
}

// =============================================================================
// Page builder
// =============================================================================

/// One page (IFD) of a test file.
#[derive(Debug, Clone)]
pub struct TestPage {
    width: u32,
    height: u32,
    bits: u16,
    samples: u16,
    data: Vec<u8>,
    rows_per_strip: u32,
    codec: StripCodec,
    description: Option<String>,
    resolution: Option<((u32, u32), (u32, u32))>,
    resolution_unit: Option<u16>,
    reduced: bool,
}

impl TestPage {
    fn new(width: u32, height: u32, bits: u16, samples: u16, data: Vec<u8>) -> Self {
        let expected = width as usize * height as usize * samples as usize * (bits as usize / 8);
        assert_eq!(data.len(), expected, "page data does not match geometry");
        Self {
            width,
            height,
            bits,
            samples,
            data,
            rows_per_strip: height,
            codec: StripCodec::Raw,
            description: None,
            resolution: None,
            resolution_unit: None,
            reduced: false,
        }
    }

    /// 8-bit grayscale page.
    pub fn gray_u8(width: u32, height: u32, values: &[u8]) -> Self {
        Self::new(width, height, 8, 1, values.to_vec())
    }

    /// 16-bit grayscale page.
    pub fn gray_u16(width: u32, height: u32, values: &[u16]) -> Self {
        let data = values.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::new(width, height, 16, 1, data)
    }

    /// Interleaved 8-bit RGB page.
    pub fn rgb_u8(width: u32, height: u32, values: &[u8]) -> Self {
        Self::new(width, height, 8, 3, values.to_vec())
    }

    /// Split the page into strips of `rows` rows.
    pub fn with_rows_per_strip(mut self, rows: u32) -> Self {
        self.rows_per_strip = rows.max(1);
        self
    }

    /// Deflate-compress every strip.
    pub fn with_deflate(self) -> Self {
        self.with_codec(StripCodec::Deflate)
    }

    pub fn with_codec(mut self, codec: StripCodec) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    /// X and Y resolution as `(pixels, units)` fractions.
    pub fn with_resolution(mut self, x: (u32, u32), y: (u32, u32)) -> Self {
        self.resolution = Some((x, y));
        self
    }

    pub fn with_resolution_unit(mut self, unit: u16) -> Self {
        self.resolution_unit = Some(unit);
        self
    }

    /// Mark the page as a reduced-resolution copy.
    pub fn reduced(mut self) -> Self {
        self.reduced = true;
        self
    }

    fn strips(&self) -> Vec<Vec<u8>> {
        let row_bytes = self.width as usize * self.samples as usize * (self.bits as usize / 8);
        self.data
            .chunks(row_bytes * self.rows_per_strip as usize)
            .map(|strip| self.codec.encode(strip))
            .collect()
    }
}

// =============================================================================
// File builder
// =============================================================================

/// Builder for classic little-endian TIFF files.
#[derive(Debug, Clone, Default)]
pub struct TiffBuilder {
    pages: Vec<TestPage>,
}

impl TiffBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page: TestPage) -> Self {
        self.pages.push(page);
        self
    }

    pub fn pages(mut self, pages: impl IntoIterator<Item = TestPage>) -> Self {
        self.pages.extend(pages);
        self
    }

    /// Build the file.
    ///
    /// Each page is written as its strips, then its out-of-line tag values,
    /// then the IFD itself; the previous IFD's next pointer is patched.
    pub fn build(&self) -> Vec<u8> {
        let mut buf = b"II".to_vec();
        buf.extend(42u16.to_le_bytes());
        buf.extend(0u32.to_le_bytes());
        let mut next_pointer = 4;

        for page in &self.pages {
            let mut offsets = Vec::new();
            let mut counts = Vec::new();
            for strip in page.strips() {
                offsets.push(buf.len() as u32);
                counts.push(strip.len() as u32);
                buf.extend(&strip);
                pad_to_word(&mut buf);
            }

            let mut entries: Vec<(u16, Value)> = vec![
                (256, Value::Long(vec![page.width])),
                (257, Value::Long(vec![page.height])),
                (258, Value::Short(vec![page.bits; page.samples as usize])),
                (259, Value::Short(vec![page.codec.code()])),
                (262, Value::Short(vec![if page.samples == 3 { 2 } else { 1 }])),
                (273, Value::Long(offsets)),
                (277, Value::Short(vec![page.samples])),
                (278, Value::Long(vec![page.rows_per_strip])),
                (279, Value::Long(counts)),
            ];
            if page.reduced {
                entries.push((254, Value::Long(vec![1])));
            }
            if let Some(description) = &page.description {
                entries.push((270, Value::Ascii(description.clone())));
            }
            if let Some(((xn, xd), (yn, yd))) = page.resolution {
                entries.push((282, Value::Rational(xn, xd)));
                entries.push((283, Value::Rational(yn, yd)));
            }
            if let Some(unit) = page.resolution_unit {
                entries.push((296, Value::Short(vec![unit])));
            }
            entries.sort_by_key(|(tag, _)| *tag);

            // Values that do not fit in the 4-byte entry field go before the IFD
            let mut fields = Vec::with_capacity(entries.len());
            for (tag, value) in &entries {
                let bytes = value.bytes();
                let field = if bytes.len() <= 4 {
                    let mut inline = bytes;
                    inline.resize(4, 0);
                    inline
                } else {
                    let offset = buf.len() as u32;
                    buf.extend(&bytes);
                    pad_to_word(&mut buf);
                    offset.to_le_bytes().to_vec()
                };
                fields.push((*tag, value.field_type(), value.count(), field));
            }

            let ifd_offset = buf.len() as u32;
            buf[next_pointer..next_pointer + 4].copy_from_slice(&ifd_offset.to_le_bytes());

            buf.extend((fields.len() as u16).to_le_bytes());
            for (tag, field_type, count, field) in fields {
                buf.extend(tag.to_le_bytes());
                buf.extend(field_type.to_le_bytes());
                buf.extend(count.to_le_bytes());
                buf.extend(field);
            }
            next_pointer = buf.len();
            buf.extend(0u32.to_le_bytes());
        }

        buf
    }
}

fn pad_to_word(buf: &mut Vec<u8>) {
    if buf.len() % 2 == 1 {
        buf.push(0);
    }
}

// =============================================================================
// Pixel patterns
// =============================================================================

/// 16-bit plane whose values encode the plane number and pixel position.
pub fn plane_u16(plane: usize, width: u32, height: u32) -> Vec<u16> {
    (0..width as usize * height as usize)
        .map(|i| (plane * 1000 + i) as u16)
        .collect()
}

/// `count` 16-bit pages built with [`plane_u16`].
pub fn u16_stack(count: usize, width: u32, height: u32) -> Vec<TestPage> {
    (0..count)
        .map(|plane| TestPage::gray_u16(width, height, &plane_u16(plane, width, height)))
        .collect()
}

// =============================================================================
// Readers
// =============================================================================

/// Source holding `data` under [`TEST_PATH`].
pub fn memory_source(data: Vec<u8>) -> MemorySource {
    MemorySource::single(TEST_PATH, data)
}

/// Open `data` with `options`, returning the reader and the shared source.
pub async fn open_with(
    data: Vec<u8>,
    options: ReaderOptions,
) -> Result<(TiffReader<MemorySource>, MemorySource), ReaderError> {
    let source = memory_source(data);
    let reader = TiffReader::open(source.clone(), TEST_PATH, options).await?;
    Ok((reader, source))
}

/// Open `data` with default options.
pub async fn open(data: Vec<u8>) -> (TiffReader<MemorySource>, MemorySource) {
    open_with(data, ReaderOptions::default())
        .await
        .expect("test file should open")
}
