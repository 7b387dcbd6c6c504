//! Dynamic element-type n-dimensional arrays.
//!
//! TIFF pages carry their element type at runtime, so pixel data is held in
//! [`ImageData`], an enum over `ndarray::ArrayD<T>` for each supported type.
//! Most operations are written once, generically over [`Element`], and
//! dispatched per variant.

use std::fmt;
use std::ops::Range;

use ndarray::{ArrayD, Axis, IxDyn, ShapeError, Slice};
use serde::Serialize;

use crate::format::tiff::ByteOrder;

// =============================================================================
// DataType
// =============================================================================

/// Element type of a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    U8,
    U16,
    U32,
    U64,
    I8,
    I16,
    I32,
    I64,
    F32,
    F64,
}

impl DataType {
    /// Size of one element in bytes.
    pub const fn size_in_bytes(self) -> usize {
        match self {
            DataType::U8 | DataType::I8 => 1,
            DataType::U16 | DataType::I16 => 2,
            DataType::U32 | DataType::I32 | DataType::F32 => 4,
            DataType::U64 | DataType::I64 | DataType::F64 => 8,
        }
    }

    /// Conventional name (`uint8`, `float32`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            DataType::U8 => "uint8",
            DataType::U16 => "uint16",
            DataType::U32 => "uint32",
            DataType::U64 => "uint64",
            DataType::I8 => "int8",
            DataType::I16 => "int16",
            DataType::I32 => "int32",
            DataType::I64 => "int64",
            DataType::F32 => "float32",
            DataType::F64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// =============================================================================
// Element
// =============================================================================

/// A pixel element type that can live in an [`ImageData`].
pub trait Element:
    Copy + Default + PartialEq + PartialOrd + fmt::Debug + Send + Sync + 'static
{
    /// Runtime tag for this type.
    const DTYPE: DataType;

    /// Decode one element from the first `size_of::<Self>()` bytes.
    fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Self;

    /// Lossy conversion used for statistics.
    fn to_f64(self) -> f64;

    /// Wrap a typed array.
    fn wrap(array: ArrayD<Self>) -> ImageData;

    /// Borrow the typed array if `data` holds this type.
    fn peek(data: &ImageData) -> Option<&ArrayD<Self>>;

    /// Take the typed array if `data` holds this type.
    fn unwrap(data: ImageData) -> Result<ArrayD<Self>, ImageData>;
}

macro_rules! impl_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DataType = DataType::$variant;

            #[inline]
            fn from_bytes(bytes: &[u8], byte_order: ByteOrder) -> Self {
                let raw = byte_order.read_array::<{ std::mem::size_of::<$t>() }>(bytes);
                match byte_order {
                    ByteOrder::LittleEndian => <$t>::from_le_bytes(raw),
                    ByteOrder::BigEndian => <$t>::from_be_bytes(raw),
                }
            }

            #[inline]
            fn to_f64(self) -> f64 {
                self as f64
            }

            fn wrap(array: ArrayD<Self>) -> ImageData {
                ImageData::$variant(array)
            }

            fn peek(data: &ImageData) -> Option<&ArrayD<Self>> {
                match data {
                    ImageData::$variant(a) => Some(a),
                    _ => None,
                }
            }

            fn unwrap(data: ImageData) -> Result<ArrayD<Self>, ImageData> {
                match data {
                    ImageData::$variant(a) => Ok(a),
                    other => Err(other),
                }
            }
        }
    };
}

impl_element!(u8, U8);
impl_element!(u16, U16);
impl_element!(u32, U32);
impl_element!(u64, U64);
impl_element!(i8, I8);
impl_element!(i16, I16);
impl_element!(i32, I32);
impl_element!(i64, I64);
impl_element!(f32, F32);
impl_element!(f64, F64);

/// Run `$body` with `$t` bound to the Rust type of a [`DataType`].
macro_rules! with_dtype {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            DataType::U8 => {
                type $t = u8;
                $body
            }
            DataType::U16 => {
                type $t = u16;
                $body
            }
            DataType::U32 => {
                type $t = u32;
                $body
            }
            DataType::U64 => {
                type $t = u64;
                $body
            }
            DataType::I8 => {
                type $t = i8;
                $body
            }
            DataType::I16 => {
                type $t = i16;
                $body
            }
            DataType::I32 => {
                type $t = i32;
                $body
            }
            DataType::I64 => {
                type $t = i64;
                $body
            }
            DataType::F32 => {
                type $t = f32;
                $body
            }
            DataType::F64 => {
                type $t = f64;
                $body
            }
        }
    };
}

/// Evaluate `$body` against the typed array inside an [`ImageData`].
macro_rules! dispatch {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ImageData::U8($arr) => $body,
            ImageData::U16($arr) => $body,
            ImageData::U32($arr) => $body,
            ImageData::U64($arr) => $body,
            ImageData::I8($arr) => $body,
            ImageData::I16($arr) => $body,
            ImageData::I32($arr) => $body,
            ImageData::I64($arr) => $body,
            ImageData::F32($arr) => $body,
            ImageData::F64($arr) => $body,
        }
    };
}

/// Like `dispatch!`, but rewraps the resulting array in the same variant.
macro_rules! map_data {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ImageData::U8($arr) => ImageData::U8($body),
            ImageData::U16($arr) => ImageData::U16($body),
            ImageData::U32($arr) => ImageData::U32($body),
            ImageData::U64($arr) => ImageData::U64($body),
            ImageData::I8($arr) => ImageData::I8($body),
            ImageData::I16($arr) => ImageData::I16($body),
            ImageData::I32($arr) => ImageData::I32($body),
            ImageData::I64($arr) => ImageData::I64($body),
            ImageData::F32($arr) => ImageData::F32($body),
            ImageData::F64($arr) => ImageData::F64($body),
        }
    };
}

// =============================================================================
// ImageData
// =============================================================================

/// An in-memory n-dimensional array with a runtime element type.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageData {
    U8(ArrayD<u8>),
    U16(ArrayD<u16>),
    U32(ArrayD<u32>),
    U64(ArrayD<u64>),
    I8(ArrayD<i8>),
    I16(ArrayD<i16>),
    I32(ArrayD<i32>),
    I64(ArrayD<i64>),
    F32(ArrayD<f32>),
    F64(ArrayD<f64>),
}

/// Min, max and mean of an array, as f64.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Statistics {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
}

impl ImageData {
    /// Zero-filled array.
    pub fn zeros(dtype: DataType, shape: &[usize]) -> Self {
        with_dtype!(dtype, T => T::wrap(ArrayD::<T>::default(IxDyn(shape))))
    }

    /// Build an array from packed elements stored in `byte_order`.
    ///
    /// # Errors
    /// Returns a `ShapeError` if `bytes` does not hold exactly
    /// `product(shape)` elements.
    pub fn from_raw(
        dtype: DataType,
        shape: &[usize],
        bytes: &[u8],
        byte_order: ByteOrder,
    ) -> Result<Self, ShapeError> {
        fn build<T: Element>(
            shape: &[usize],
            bytes: &[u8],
            byte_order: ByteOrder,
        ) -> Result<ImageData, ShapeError> {
            let width = std::mem::size_of::<T>();
            if bytes.len() % width != 0 {
                return Err(ShapeError::from_kind(ndarray::ErrorKind::IncompatibleShape));
            }
            let values: Vec<T> = bytes
                .chunks_exact(width)
                .map(|c| T::from_bytes(c, byte_order))
                .collect();
            Ok(T::wrap(ArrayD::from_shape_vec(IxDyn(shape), values)?))
        }

        with_dtype!(dtype, T => build::<T>(shape, bytes, byte_order))
    }

    /// Element type.
    pub fn dtype(&self) -> DataType {
        match self {
            ImageData::U8(_) => DataType::U8,
            ImageData::U16(_) => DataType::U16,
            ImageData::U32(_) => DataType::U32,
            ImageData::U64(_) => DataType::U64,
            ImageData::I8(_) => DataType::I8,
            ImageData::I16(_) => DataType::I16,
            ImageData::I32(_) => DataType::I32,
            ImageData::I64(_) => DataType::I64,
            ImageData::F32(_) => DataType::F32,
            ImageData::F64(_) => DataType::F64,
        }
    }

    /// Extent of each axis.
    pub fn shape(&self) -> &[usize] {
        dispatch!(self, a => a.shape())
    }

    /// Number of axes.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Number of elements.
    pub fn len(&self) -> usize {
        dispatch!(self, a => a.len())
    }

    /// Whether the array has no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Borrow the typed array.
    pub fn as_array<T: Element>(&self) -> Option<&ArrayD<T>> {
        T::peek(self)
    }

    /// Take the typed array, or get `self` back if the type differs.
    pub fn into_array<T: Element>(self) -> Result<ArrayD<T>, ImageData> {
        T::unwrap(self)
    }

    /// Remove `axis` by selecting position `index` along it.
    ///
    /// # Panics
    /// Panics if `axis` or `index` is out of bounds.
    pub fn index_axis(&self, axis: usize, index: usize) -> Self {
        map_data!(self, a => a.index_axis(Axis(axis), index).to_owned())
    }

    /// Reorder axes: axis `i` of the result is axis `axes[i]` of `self`.
    ///
    /// The result is in standard (row-major) layout.
    ///
    /// # Panics
    /// Panics if `axes` is not a permutation of `0..ndim`.
    pub fn permuted_axes(self, axes: &[usize]) -> Self {
        map_data!(self, a => a
            .permuted_axes(IxDyn(axes))
            .as_standard_layout()
            .into_owned())
    }

    /// Copy out a hyper-rectangle, one range per axis.
    ///
    /// # Panics
    /// Panics if `ranges` does not have one in-bounds range per axis.
    pub fn slice(&self, ranges: &[Range<usize>]) -> Self {
        map_data!(self, a => a
            .slice_each_axis(|ax| Slice::from(ranges[ax.axis.index()].clone()))
            .to_owned())
    }

    /// Place equally shaped blocks on a grid.
    ///
    /// `blocks` are in row-major order over `grid_shape`. The result has
    /// shape `grid_shape ++ block_shape`. Returns `None` if any block has a
    /// different element type than `dtype` or a shape other than `block_shape`.
    pub fn assemble(
        dtype: DataType,
        grid_shape: &[usize],
        block_shape: &[usize],
        blocks: Vec<ImageData>,
    ) -> Option<Self> {
        fn build<T: Element>(
            grid_shape: &[usize],
            block_shape: &[usize],
            blocks: Vec<ImageData>,
        ) -> Option<ImageData> {
            let full_shape: Vec<usize> = grid_shape.iter().chain(block_shape).copied().collect();
            let mut out = ArrayD::<T>::default(IxDyn(&full_shape));
            for (flat, block) in blocks.into_iter().enumerate() {
                let block = T::unwrap(block).ok()?;
                if block.shape() != block_shape {
                    return None;
                }
                let mut view = out.view_mut();
                for index in unravel_index(flat, grid_shape) {
                    view = view.index_axis_move(Axis(0), index);
                }
                view.assign(&block);
            }
            Some(T::wrap(out))
        }

        with_dtype!(dtype, T => build::<T>(grid_shape, block_shape, blocks))
    }

    /// Min, max and mean, or `None` for an empty array.
    pub fn statistics(&self) -> Option<Statistics> {
        fn stats<T: Element>(a: &ArrayD<T>) -> Option<Statistics> {
            let mut iter = a.iter().map(|v| v.to_f64());
            let first = iter.next()?;
            let (min, max, sum) = iter.fold((first, first, first), |(lo, hi, sum), v| {
                (lo.min(v), hi.max(v), sum + v)
            });
            Some(Statistics {
                min,
                max,
                mean: sum / a.len() as f64,
            })
        }

        dispatch!(self, a => stats(a))
    }
}

/// Row-major multi-index of a flat position within `shape`.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut index = vec![0; shape.len()];
    for (slot, &extent) in index.iter_mut().zip(shape).rev() {
        if extent > 0 {
            *slot = flat % extent;
            flat /= extent;
        }
    }
    index
}

// =============================================================================
// Tests
// =============================================================================
