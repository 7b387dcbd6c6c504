//! Conversion of resolution units to micrometers.
//!
//! Units reach the pixel-size resolver either as the numeric ResolutionUnit
//! tag or as free text from an ImageJ description (`micron`, `nm`, ...).
//! Unknown or absent units convert with a factor of 1.

use crate::format::tiff::ResolutionUnit;

/// Micrometers per unit, by unit name.
///
/// ImageJ writes the micro sign either literally or as the escaped text
/// `\u00B5m`, so both spellings are listed.
const UNIT_TABLE: &[(&str, f64)] = &[
    ("pm", 1e-6),
    ("picometer", 1e-6),
    ("nm", 1e-3),
    ("nanometer", 1e-3),
    ("micron", 1.0),
    ("micrometer", 1.0),
    ("\u{00B5}m", 1.0),
    ("\u{03BC}m", 1.0),
    ("um", 1.0),
    ("\\u00B5m", 1.0),
    ("none", 1.0),
    ("mm", 1e3),
    ("millimeter", 1e3),
    ("cm", 1e4),
    ("centimeter", 1e4),
    ("cal", 2.54e4),
    ("inch", 2.54e4),
];

/// Factor used when the unit is unknown or absent.
pub const DEFAULT_SCALAR: f64 = 1.0;

/// A unit as found in the file.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnitToken<'a> {
    /// Unit text, e.g. from an ImageJ description
    Name(&'a str),

    /// ResolutionUnit tag value
    Code(u16),
}

/// Micrometers per unit for a named unit, matched case-insensitively.
pub fn scalar_for_name(name: &str) -> Option<f64> {
    let name = name.trim();
    UNIT_TABLE
        .iter()
        .find(|(unit, _)| *unit == name)
        .or_else(|| {
            UNIT_TABLE
                .iter()
                .find(|(unit, _)| unit.eq_ignore_ascii_case(name))
        })
        .map(|&(_, scalar)| scalar)
}

/// Micrometers per unit for a ResolutionUnit value.
pub fn scalar_for_unit(unit: ResolutionUnit) -> f64 {
    match unit {
        ResolutionUnit::None | ResolutionUnit::Micrometer => 1.0,
        ResolutionUnit::Millimeter => 1e3,
        ResolutionUnit::Centimeter => 1e4,
        ResolutionUnit::Inch => 2.54e4,
    }
}

/// Micrometers per unit, [`DEFAULT_SCALAR`] when unknown or absent.
pub fn micrometers_per_unit(token: Option<UnitToken<'_>>) -> f64 {
    let scalar = match token {
        Some(UnitToken::Name(name)) => scalar_for_name(name),
        Some(UnitToken::Code(code)) => ResolutionUnit::from_u16(code).map(scalar_for_unit),
        None => None,
    };
    scalar.unwrap_or(DEFAULT_SCALAR)
}
