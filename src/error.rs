use thiserror::Error;

/// I/O errors that can occur when reading bytes from a source
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// Error from the local filesystem
    #[error("File error: {0}")]
    File(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Object not found
    #[error("Object not found: {0}")]
    NotFound(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::File(err.to_string()),
        }
    }
}

/// Errors that can occur when parsing or decoding TIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Byte stream does not start with a TIFF or BigTIFF header
    #[error("Not a TIFF file")]
    NotTiff,

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// IFD entry count too large to address
    #[error("Invalid IFD entry count: {0}")]
    InvalidEntryCount(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0}")]
    UnsupportedCompression(String),

    /// Unsupported sample layout (bit depth / sample format combination)
    #[error("Unsupported sample format: {bits_per_sample} bits, sample format {sample_format}")]
    UnsupportedSampleFormat {
        bits_per_sample: u16,
        sample_format: u16,
    },

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// A strip or tile could not be decompressed
    #[error("Decode error in segment {segment}: {message}")]
    Decode { segment: usize, message: String },

    /// A selection index exceeds the extent of its axis
    #[error("Index {index} out of bounds for axis {axis} of size {size}")]
    IndexOutOfBounds { axis: usize, index: usize, size: usize },
}

/// Failures while resolving physical pixel sizes.
///
/// These never escape the reader: they are logged and degraded to unknown sizes.
#[derive(Debug, Clone, Error)]
pub enum PixelSizeError {
    /// Tag access failed
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// Scene has no pages
    #[error("Scene {0} has no pages")]
    EmptyScene(usize),

    /// Resolution tag is present but unusable
    #[error("Invalid resolution for {axis}: {message}")]
    InvalidResolution { axis: char, message: String },
}

/// Errors surfaced by the scene reader.
#[derive(Debug, Clone, Error)]
pub enum ReaderError {
    /// I/O error while opening or reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Structural or decoding error in the TIFF file
    #[error("TIFF error: {0}")]
    Tiff(#[from] TiffError),

    /// The byte stream is not a readable image container
    #[error("Unsupported format for {path}: {reason}")]
    UnsupportedFormat { path: String, reason: String },

    /// Caller-supplied options disagree with the file
    #[error("Conflicting configuration: {0}")]
    ConflictingConfiguration(String),

    /// Axis order length does not match the scene's dimensionality
    #[error("Dimension order {dims:?} does not match scene shape {shape:?}")]
    ShapeContractViolation { dims: String, shape: Vec<usize> },

    /// Scene id or index does not exist
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    /// Requested region does not fit the array
    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    /// A lazy block resolved to data that disagrees with its declared shape or dtype
    #[error("Block {index:?} resolved to {actual}, expected {expected}")]
    BlockShapeMismatch {
        index: Vec<usize>,
        expected: String,
        actual: String,
    },

    /// A spawned block task panicked or was cancelled
    #[error("Block task failed: {0}")]
    Task(String),
}
