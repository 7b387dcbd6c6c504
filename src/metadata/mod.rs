//! Scene metadata: physical pixel sizes, unit conversion and tag dumps.

mod pixel_size;
mod tags;
pub mod units;

pub use pixel_size::{resolve, resolve_or_unknown, PhysicalPixelSizes};
pub use tags::Attributes;
pub use units::{micrometers_per_unit, UnitToken};
