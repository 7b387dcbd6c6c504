//! TIFF tag value reading.
//!
//! This module provides functionality to read tag values from TIFF files.
//! Values can be stored either inline in the IFD entry (for small values)
//! or at an offset in the file (for larger values like arrays).
//!
//! Every entry of a page is decoded into a [`TagValue`], which is how page
//! metadata reaches callers. Array values (like StripOffsets) are fetched in
//! a single range request.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::Serialize;
use tracing::debug;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, Ifd, IfdEntry, TiffHeader};
use super::tags::FieldType;

// =============================================================================
// TagValue
// =============================================================================

/// Decoded value of one IFD entry.
///
/// Integer types are widened so callers do not need to care whether a writer
/// chose Short or Long for a given tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    /// ASCII text, NUL terminator stripped
    Ascii(String),

    /// Byte, Short, Long, Long8 and IFD offsets
    Unsigned(Vec<u64>),

    /// SByte, SShort, SLong, SLong8
    Signed(Vec<i64>),

    /// Unsigned fractions as (numerator, denominator)
    Rational(Vec<(u32, u32)>),

    /// Signed fractions as (numerator, denominator)
    SRational(Vec<(i32, i32)>),

    /// Float and Double
    Float(Vec<f64>),

    /// Opaque bytes (Undefined type)
    Undefined(Vec<u8>),
}

impl TagValue {
    /// First unsigned integer of the value.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            TagValue::Unsigned(v) => v.first().copied(),
            TagValue::Signed(v) => v.first().and_then(|&x| u64::try_from(x).ok()),
            _ => None,
        }
    }

    /// All values as unsigned integers.
    pub fn as_u64_vec(&self) -> Option<&[u64]> {
        match self {
            TagValue::Unsigned(v) => Some(v),
            _ => None,
        }
    }

    /// Text of an ASCII value.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            TagValue::Ascii(s) => Some(s),
            _ => None,
        }
    }

    /// First fraction of a Rational value.
    pub fn as_rational(&self) -> Option<(u32, u32)> {
        match self {
            TagValue::Rational(v) => v.first().copied(),
            _ => None,
        }
    }

    /// Raw bytes of an Undefined or Byte value.
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            TagValue::Undefined(v) => Some(v.clone()),
            TagValue::Unsigned(v) => v.iter().map(|&b| u8::try_from(b).ok()).collect(),
            _ => None,
        }
    }

    /// Number of values held.
    pub fn len(&self) -> usize {
        match self {
            TagValue::Ascii(s) => s.len(),
            TagValue::Unsigned(v) => v.len(),
            TagValue::Signed(v) => v.len(),
            TagValue::Rational(v) => v.len(),
            TagValue::SRational(v) => v.len(),
            TagValue::Float(v) => v.len(),
            TagValue::Undefined(v) => v.len(),
        }
    }

    /// Whether the value holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decode `count` values of `field_type` from raw bytes.
///
/// # Errors
/// `InvalidTagValue` if `bytes` is shorter than the values require.
pub fn decode_value(
    bytes: &[u8],
    count: usize,
    field_type: FieldType,
    byte_order: ByteOrder,
) -> Result<TagValue, TiffError> {
    let width = field_type.size_in_bytes();
    let needed = width.saturating_mul(count);
    if bytes.len() < needed {
        return Err(TiffError::InvalidTagValue {
            tag: "value",
            message: format!(
                "{:?} x{} needs {} bytes, got {}",
                field_type,
                count,
                needed,
                bytes.len()
            ),
        });
    }

    let data = &bytes[..needed];
    let chunks = data.chunks_exact(width);
    let value = match field_type {
        FieldType::Ascii => {
            let end = data.iter().position(|&b| b == 0).unwrap_or(needed);
            TagValue::Ascii(String::from_utf8_lossy(&data[..end]).into_owned())
        }
        FieldType::Undefined => TagValue::Undefined(data.to_vec()),
        FieldType::Byte => TagValue::Unsigned(chunks.map(|c| c[0] as u64).collect()),
        FieldType::Short => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u16(c) as u64).collect())
        }
        FieldType::Long | FieldType::Ifd => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u32(c) as u64).collect())
        }
        FieldType::Long8 | FieldType::Ifd8 => {
            TagValue::Unsigned(chunks.map(|c| byte_order.read_u64(c)).collect())
        }
        FieldType::SByte => TagValue::Signed(chunks.map(|c| c[0] as i8 as i64).collect()),
        FieldType::SShort => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u16(c) as i16 as i64).collect())
        }
        FieldType::SLong => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u32(c) as i32 as i64).collect())
        }
        FieldType::SLong8 => {
            TagValue::Signed(chunks.map(|c| byte_order.read_u64(c) as i64).collect())
        }
        FieldType::Rational => TagValue::Rational(
            chunks
                .map(|c| (byte_order.read_u32(c), byte_order.read_u32(&c[4..])))
                .collect(),
        ),
        FieldType::SRational => TagValue::SRational(
            chunks
                .map(|c| {
                    (
                        byte_order.read_u32(c) as i32,
                        byte_order.read_u32(&c[4..]) as i32,
                    )
                })
                .collect(),
        ),
        FieldType::Float => TagValue::Float(
            chunks
                .map(|c| f32::from_bits(byte_order.read_u32(c)) as f64)
                .collect(),
        ),
        FieldType::Double => TagValue::Float(
            chunks
                .map(|c| f64::from_bits(byte_order.read_u64(c)))
                .collect(),
        ),
    };

    Ok(value)
}

// =============================================================================
// ValueReader
// =============================================================================

/// Reads tag values from a TIFF file.
///
/// This struct combines a RangeReader with TIFF header information to
/// read values respecting the file's byte order and format.
pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    /// Create a new ValueReader.
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Get the byte order from the header.
    #[inline]
    pub fn byte_order(&self) -> ByteOrder {
        self.header.byte_order
    }

    /// Read raw bytes for an IFD entry's value.
    ///
    /// For inline values, returns the bytes from the entry.
    /// For offset values, fetches the bytes from the file.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ))
        } else {
            let offset = entry.value_offset(self.header.byte_order);
            let len = usize::try_from(size).map_err(|_| TiffError::InvalidTagValue {
                tag: "value",
                message: format!("value of {} bytes does not fit in memory", size),
            })?;
            Ok(self.reader.read_exact_at(offset, len).await?)
        }
    }

    /// Read and decode one entry.
    pub async fn read_value(&self, entry: &IfdEntry) -> Result<TagValue, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        let bytes = self.read_bytes(entry).await?;
        decode_value(&bytes, entry.count as usize, field_type, self.byte_order())
    }

    /// Read and decode every entry of an IFD, keyed by tag code.
    ///
    /// Entries with unknown field types are skipped.
    pub async fn read_all(&self, ifd: &Ifd) -> Result<BTreeMap<u16, TagValue>, TiffError> {
        let mut tags = BTreeMap::new();
        for entry in &ifd.entries {
            if entry.field_type.is_none() {
                debug!(
                    tag = entry.tag_id,
                    field_type = entry.field_type_raw,
                    "Skipping tag with unknown field type"
                );
                continue;
            }
            let value = self.read_value(entry).await?;
            tags.insert(entry.tag_id, value);
        }
        Ok(tags)
    }
}

// =============================================================================
// Tests
// =============================================================================
