//! Physical pixel sizes.
//!
//! The size of a pixel along X and Y is the inverse of the XResolution and
//! YResolution fractions (pixels per unit), converted to micrometers. ImageJ
//! files carry their own calibration unit and Z step in the description,
//! which take precedence over the ResolutionUnit tag.

use serde::Serialize;
use tracing::warn;

use crate::error::PixelSizeError;
use crate::format::series::ImageJMetadata;
use crate::format::tiff::{Page, TagValue, TiffTag};

use super::units::{micrometers_per_unit, UnitToken};

/// Size of one pixel along Z, Y and X in micrometers.
///
/// `None` means unknown, never zero.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct PhysicalPixelSizes {
    pub z: Option<f64>,
    pub y: Option<f64>,
    pub x: Option<f64>,
}

impl PhysicalPixelSizes {
    /// All sizes unknown.
    pub const UNKNOWN: Self = Self {
        z: None,
        y: None,
        x: None,
    };
}

/// Resolve pixel sizes from the first page of a scene.
///
/// `imagej` is the file's ImageJ metadata, if it is an ImageJ file.
///
/// # Errors
/// `InvalidResolution` if a resolution tag is not a fraction, has a zero
/// numerator or denominator, or yields a non-positive size.
pub fn resolve(
    page: &Page,
    imagej: Option<&ImageJMetadata>,
) -> Result<PhysicalPixelSizes, PixelSizeError> {
    let tag_unit = page
        .tags
        .get(&TiffTag::ResolutionUnit.as_u16())
        .and_then(TagValue::as_u64)
        .and_then(|code| u16::try_from(code).ok())
        .map(UnitToken::Code);

    let unit = match imagej.and_then(|ij| ij.unit.as_deref()) {
        Some(name) => Some(UnitToken::Name(name)),
        None => tag_unit,
    };
    let scalar = micrometers_per_unit(unit);

    Ok(PhysicalPixelSizes {
        z: imagej.and_then(|ij| ij.spacing).map(|spacing| spacing * scalar),
        y: axis_size(page, TiffTag::YResolution, 'Y', scalar)?,
        x: axis_size(page, TiffTag::XResolution, 'X', scalar)?,
    })
}

/// Like [`resolve`], but any failure is logged and yields unknown sizes.
pub fn resolve_or_unknown(page: &Page, imagej: Option<&ImageJMetadata>) -> PhysicalPixelSizes {
    resolve(page, imagej).unwrap_or_else(|e| {
        warn!(page = page.index, error = %e, "Could not resolve physical pixel sizes");
        PhysicalPixelSizes::UNKNOWN
    })
}

fn axis_size(
    page: &Page,
    tag: TiffTag,
    axis: char,
    scalar: f64,
) -> Result<Option<f64>, PixelSizeError> {
    let Some(value) = page.tags.get(&tag.as_u16()) else {
        return Ok(None);
    };

    let (pixels, units) = value
        .as_rational()
        .ok_or_else(|| PixelSizeError::InvalidResolution {
            axis,
            message: format!("expected a rational, found {:?}", value),
        })?;
    if pixels == 0 || units == 0 {
        return Err(PixelSizeError::InvalidResolution {
            axis,
            message: format!("degenerate resolution {}/{}", pixels, units),
        });
    }

    let size = scalar * units as f64 / pixels as f64;
    if !size.is_finite() || size <= 0.0 {
        return Err(PixelSizeError::InvalidResolution {
            axis,
            message: format!("pixel size {} is not positive", size),
        });
    }
    Ok(Some(size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn page(extra: &[(u16, TagValue)]) -> Page {
        let mut tags = BTreeMap::new();
        tags.insert(256, TagValue::Unsigned(vec![4]));
        tags.insert(257, TagValue::Unsigned(vec![4]));
        tags.insert(258, TagValue::Unsigned(vec![8]));
        tags.insert(273, TagValue::Unsigned(vec![0]));
        tags.insert(279, TagValue::Unsigned(vec![16]));
        for (tag, value) in extra {
            tags.insert(*tag, value.clone());
        }
        Page::from_tags(0, tags).unwrap()
    }

    #[test]
    fn test_pixels_per_centimeter() {
        let page = page(&[
            (282, TagValue::Rational(vec![(4, 1)])),
            (283, TagValue::Rational(vec![(2, 1)])),
            (296, TagValue::Unsigned(vec![3])),
        ]);
        let sizes = resolve(&page, None).unwrap();
        assert_eq!(sizes.x, Some(1e4 / 4.0));
        assert_eq!(sizes.y, Some(1e4 / 2.0));
        assert_eq!(sizes.z, None);
    }

    #[test]
    fn test_no_unit_uses_scalar_one() {
        let page = page(&[
            (282, TagValue::Rational(vec![(4, 1)])),
            (283, TagValue::Rational(vec![(1, 2)])),
        ]);
        let sizes = resolve(&page, None).unwrap();
        assert_eq!(sizes.x, Some(0.25));
        assert_eq!(sizes.y, Some(2.0));
    }

    #[test]
    fn test_missing_resolution_is_unknown() {
        let page = page(&[(282, TagValue::Rational(vec![(10, 1)]))]);
        let sizes = resolve(&page, None).unwrap();
        assert_eq!(sizes.x, Some(0.1));
        assert_eq!(sizes.y, None);
    }

    #[test]
    fn test_imagej_unit_and_spacing() {
        let page = page(&[
            (282, TagValue::Rational(vec![(2, 1)])),
            (283, TagValue::Rational(vec![(2, 1)])),
            (296, TagValue::Unsigned(vec![3])),
        ]);
        let ij = ImageJMetadata::parse("ImageJ=1.53t\nunit=nm\nspacing=500\n").unwrap();
        let sizes = resolve(&page, Some(&ij)).unwrap();
        assert_eq!(sizes.z, Some(0.5));
        assert_eq!(sizes.x, Some(0.5e-3));
        assert_eq!(sizes.y, Some(0.5e-3));
    }

    #[test]
    fn test_imagej_without_unit_uses_tag() {
        let page = page(&[(282, TagValue::Rational(vec![(4, 1)])), (296, TagValue::Unsigned(vec![3]))]);
        let ij = ImageJMetadata::parse("ImageJ=1.53t\nspacing=2\n").unwrap();
        let sizes = resolve(&page, Some(&ij)).unwrap();
        assert_eq!(sizes.x, Some(2500.0));
        assert_eq!(sizes.z, Some(2e4));
    }

    #[test]
    fn test_zero_resolution_degrades_to_unknown() {
        let page = page(&[
            (282, TagValue::Rational(vec![(0, 1)])),
            (283, TagValue::Rational(vec![(4, 1)])),
        ]);
        assert!(matches!(
            resolve(&page, None),
            Err(PixelSizeError::InvalidResolution { axis: 'X', .. })
        ));
        assert_eq!(resolve_or_unknown(&page, None), PhysicalPixelSizes::UNKNOWN);
    }

    #[test]
    fn test_zero_denominator_degrades_to_unknown() {
        let page = page(&[
            (282, TagValue::Rational(vec![(4, 0)])),
            (283, TagValue::Rational(vec![(4, 1)])),
            (296, TagValue::Unsigned(vec![3])),
        ]);
        assert!(matches!(
            resolve(&page, None),
            Err(PixelSizeError::InvalidResolution { axis: 'X', .. })
        ));
        let sizes = resolve_or_unknown(&page, None);
        assert_eq!(sizes, PhysicalPixelSizes::UNKNOWN);
        assert_ne!(sizes.x, Some(0.0));
    }

    #[test]
    fn test_out_of_range_unit_code_is_ignored() {
        // 65539 must not wrap around to 3 (centimeter)
        let page = page(&[
            (282, TagValue::Rational(vec![(4, 1)])),
            (296, TagValue::Unsigned(vec![65539])),
        ]);
        let sizes = resolve(&page, None).unwrap();
        assert_eq!(sizes.x, Some(0.25));
    }

    #[test]
    fn test_non_rational_resolution() {
        let page = page(&[(283, TagValue::Ascii("72".to_string()))]);
        assert_eq!(resolve_or_unknown(&page, None), PhysicalPixelSizes::UNKNOWN);
    }
}
