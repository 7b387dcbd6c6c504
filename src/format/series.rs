//! Grouping of TIFF pages into series.
//!
//! A multi-page TIFF is a flat list of IFDs. A series (exposed to callers as
//! a scene) is a run of pages with identical geometry that together form one
//! n-dimensional array: the leading axes index pages, the trailing axes are
//! the page's own `Y X [S]` (or `S Y X` for planar data).
//!
//! Three layouts are recognized, in priority order:
//!
//! 1. **ImageJ hyperstacks**: ImageJ files only; the first page's description
//!    declares `images`, `frames`, `slices` and `channels`.
//! 2. **Shaped series**: a page's description is JSON such as
//!    `{"shape": [3, 512, 512]}`, optionally with an `"axes"` string. Not
//!    honored in OME-TIFF files.
//! 3. **Generic**: consecutive pages of identical geometry, stacked along an
//!    unknown `I` axis when there is more than one.
//!
//! Reduced-resolution pages (NewSubfileType bit 0) are not part of any series.

use std::collections::BTreeMap;

use serde::Deserialize;
use tracing::debug;

use crate::array::DataType;
use crate::error::TiffError;

use super::detect::TiffDialect;
use super::tiff::Page;

// =============================================================================
// Constants
// =============================================================================

/// Prefix of ImageJ image descriptions.
const IMAGEJ_MARKER: &str = "ImageJ=";

/// Axis label used for page stacks of unknown meaning.
pub const PAGE_STACK_AXIS: char = 'I';

/// Axis label used for leading axes of shaped series without axes.
pub const UNKNOWN_AXIS: char = 'Q';

// =============================================================================
// SeriesKind
// =============================================================================

/// How a series was recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeriesKind {
    ImageJ,
    Shaped,
    Generic,
}

impl SeriesKind {
    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            SeriesKind::ImageJ => "ImageJ hyperstack",
            SeriesKind::Shaped => "shaped",
            SeriesKind::Generic => "generic",
        }
    }
}

// =============================================================================
// ImageJMetadata
// =============================================================================

/// Key/value metadata from an ImageJ image description.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ImageJMetadata {
    /// ImageJ version that wrote the file
    pub version: String,

    /// Total number of planes
    pub images: usize,

    /// Size of the C axis
    pub channels: usize,

    /// Size of the Z axis
    pub slices: usize,

    /// Size of the T axis
    pub frames: usize,

    /// Physical unit of the calibration (`micron`, `nm`, ...)
    pub unit: Option<String>,

    /// Z step in `unit`
    pub spacing: Option<f64>,

    /// Every `key=value` line, including the ones above
    pub entries: BTreeMap<String, String>,
}

impl ImageJMetadata {
    /// Parse an ImageJ description, `None` if it is not one.
    pub fn parse(description: &str) -> Option<Self> {
        if !description.starts_with(IMAGEJ_MARKER) {
            return None;
        }

        let entries: BTreeMap<String, String> = description
            .lines()
            .filter_map(|line| line.split_once('='))
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        let count = |key: &str| {
            entries
                .get(key)
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|&n| n > 0)
                .unwrap_or(1)
        };

        Some(ImageJMetadata {
            version: entries.get("ImageJ").cloned().unwrap_or_default(),
            images: count("images"),
            channels: count("channels"),
            slices: count("slices"),
            frames: count("frames"),
            unit: entries.get("unit").cloned(),
            spacing: entries.get("spacing").and_then(|v| v.parse::<f64>().ok()),
            entries,
        })
    }
}

// =============================================================================
// Shaped descriptions
// =============================================================================

/// JSON description written for shaped series.
#[derive(Debug, Clone, Deserialize)]
struct ShapedDescription {
    shape: Vec<usize>,
    #[serde(default)]
    axes: Option<String>,
}

impl ShapedDescription {
    fn parse(description: &str) -> Option<Self> {
        let trimmed = description.trim_start();
        if !trimmed.starts_with('{') {
            return None;
        }
        serde_json::from_str(trimmed).ok()
    }
}

// =============================================================================
// Series
// =============================================================================

/// A group of pages forming one n-dimensional array.
#[derive(Debug, Clone)]
pub struct Series {
    /// Position of this series in the file
    pub index: usize,

    /// How the series was recognized
    pub kind: SeriesKind,

    /// Full shape: page-index axes followed by the page axes
    pub shape: Vec<usize>,

    /// One label per axis of `shape`, possibly with `Q`/`I` placeholders
    pub axes: String,

    /// Element type shared by every page
    pub dtype: DataType,

    /// Page indices in row-major order over the page-index axes
    pub pages: Vec<usize>,

    /// Number of trailing axes that belong to a single page
    pub page_ndim: usize,

    /// ImageJ metadata for hyperstacks
    pub imagej: Option<ImageJMetadata>,
}

impl Series {
    /// Number of leading axes that index pages.
    pub fn stack_ndim(&self) -> usize {
        self.shape.len() - self.page_ndim
    }

    /// Index of the first page of the series.
    pub fn first_page(&self) -> usize {
        self.pages.first().copied().unwrap_or(0)
    }
}

/// Group pages into series following the file's writer convention.
///
/// # Errors
/// `UnsupportedSampleFormat` if a series' pages have an element type that
/// cannot be represented.
pub fn group_series(pages: &[Page], dialect: TiffDialect) -> Result<Vec<Series>, TiffError> {
    let candidates: Vec<&Page> = pages.iter().filter(|p| !p.is_reduced()).collect();
    let honor_shaped = dialect != TiffDialect::Ome;
    let mut series = Vec::new();
    let mut pos = 0;

    if let Some(ij) = candidates
        .first()
        .filter(|_| dialect == TiffDialect::ImageJ)
        .and_then(|p| p.description())
        .and_then(ImageJMetadata::parse)
    {
        match imagej_series(&candidates, ij)? {
            Some(s) => {
                pos = s.pages.len();
                series.push(s);
            }
            None => debug!("ImageJ description does not match page layout, using generic series"),
        }
    }

    while pos < candidates.len() {
        let rest = &candidates[pos..];
        let shaped = if honor_shaped {
            shaped_series(rest, series.len())?
        } else {
            None
        };
        let next = match shaped {
            Some(s) => s,
            None => generic_series(rest, series.len(), honor_shaped)?,
        };
        pos += next.pages.len();
        series.push(next);
    }

    debug!(
        pages = pages.len(),
        series = series.len(),
        dialect = dialect.name(),
        "Grouped pages into series"
    );

    Ok(series)
}

/// Product of `sizes`, `None` on overflow.
fn checked_product(mut sizes: impl Iterator<Item = usize>) -> Option<usize> {
    sizes.try_fold(1usize, |acc, n| acc.checked_mul(n))
}

/// Length of the run of pages sharing the first page's geometry, capped at `limit`.
fn uniform_run(pages: &[&Page], limit: usize) -> usize {
    match pages.first() {
        Some(first) => pages
            .iter()
            .take(limit)
            .take_while(|p| p.same_geometry(first))
            .count(),
        None => 0,
    }
}

fn imagej_series(pages: &[&Page], ij: ImageJMetadata) -> Result<Option<Series>, TiffError> {
    let first = pages[0];
    let mut leading: Vec<(char, usize)> = [('T', ij.frames), ('Z', ij.slices), ('C', ij.channels)]
        .into_iter()
        .filter(|&(_, n)| n > 1)
        .collect();

    let Some(planes) = checked_product(leading.iter().map(|&(_, n)| n)) else {
        debug!(leading = ?leading, "ImageJ axis sizes overflow");
        return Ok(None);
    };
    if planes != ij.images {
        if planes == 1 {
            leading.push((PAGE_STACK_AXIS, ij.images));
        } else {
            return Ok(None);
        }
    }

    if uniform_run(pages, ij.images) < ij.images {
        return Ok(None);
    }

    let mut shape: Vec<usize> = leading.iter().map(|&(_, n)| n).collect();
    shape.extend(first.shape());
    let mut axes: String = leading.iter().map(|&(c, _)| c).collect();
    axes.push_str(first.axes());

    Ok(Some(Series {
        index: 0,
        kind: SeriesKind::ImageJ,
        shape,
        axes,
        dtype: first.dtype()?,
        pages: pages[..ij.images].iter().map(|p| p.index).collect(),
        page_ndim: first.shape().len(),
        imagej: Some(ij),
    }))
}

fn shaped_series(pages: &[&Page], index: usize) -> Result<Option<Series>, TiffError> {
    let first = pages[0];
    let Some(shaped) = first.description().and_then(ShapedDescription::parse) else {
        return Ok(None);
    };

    let page_shape = first.shape();
    let ndim = shaped.shape.len();
    if ndim < page_shape.len() || shaped.shape[ndim - page_shape.len()..] != page_shape[..] {
        debug!(
            shape = ?shaped.shape,
            page_shape = ?page_shape,
            "Shaped description does not end with the page shape"
        );
        return Ok(None);
    }

    let stack_ndim = ndim - page_shape.len();
    let Some(count) = checked_product(shaped.shape[..stack_ndim].iter().copied()) else {
        debug!(shape = ?shaped.shape, "Shaped description overflows");
        return Ok(None);
    };
    if count == 0 || uniform_run(pages, count) < count {
        return Ok(None);
    }

    let axes = match shaped.axes {
        Some(axes) if axes.chars().count() == ndim => axes.to_uppercase(),
        _ => {
            let mut axes: String = std::iter::repeat(UNKNOWN_AXIS).take(stack_ndim).collect();
            axes.push_str(first.axes());
            axes
        }
    };

    Ok(Some(Series {
        index,
        kind: SeriesKind::Shaped,
        shape: shaped.shape,
        axes,
        dtype: first.dtype()?,
        pages: pages[..count].iter().map(|p| p.index).collect(),
        page_ndim: page_shape.len(),
        imagej: None,
    }))
}

fn generic_series(pages: &[&Page], index: usize, honor_shaped: bool) -> Result<Series, TiffError> {
    let first = pages[0];

    // A later page with its own shaped description starts a new series
    let count = 1 + pages[1..]
        .iter()
        .take_while(|p| {
            p.same_geometry(first)
                && !(honor_shaped && p.description().and_then(ShapedDescription::parse).is_some())
        })
        .count();

    let page_shape = first.shape();
    let mut shape = Vec::with_capacity(page_shape.len() + 1);
    let mut axes = String::new();
    if count > 1 {
        shape.push(count);
        axes.push(PAGE_STACK_AXIS);
    }
    shape.extend(&page_shape);
    axes.push_str(first.axes());

    Ok(Series {
        index,
        kind: SeriesKind::Generic,
        shape,
        axes,
        dtype: first.dtype()?,
        pages: pages[..count].iter().map(|p| p.index).collect(),
        page_ndim: page_shape.len(),
        imagej: None,
    })
}

// =============================================================================
// Tests
// =============================================================================
