//! Handoff Geo
//!
//! Coordinates, great-circle distance and proximity verdicts.
//!
//! Everything in this crate is pure: no clocks, no I/O, no shared state.

mod coordinate;
mod distance;
mod proximity;
pub mod navigation;

pub use coordinate::{Coordinate, GeoError, LocationReading};
pub use distance::{distance, format_distance, EARTH_RADIUS_METERS};
pub use proximity::{
    approach_progress, ProximityBand, ProximityEvaluator, ProximityVerdict,
    APPROACH_SCALE_METERS, ARRIVED_METERS, DEFAULT_RADIUS_METERS, VERY_CLOSE_METERS,
};
