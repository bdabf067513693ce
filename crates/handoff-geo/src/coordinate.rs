//! Position value types
//!
//! A coordinate and a single sensor fix.

use serde::{Deserialize, Serialize};

/// Geographic coordinate in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    /// Create a coordinate, rejecting values outside the WGS84 ranges
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, GeoError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(GeoError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(GeoError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }

    /// Check ranges for a coordinate built from a struct literal
    pub fn is_valid(&self) -> bool {
        Self::new(self.latitude, self.longitude).is_ok()
    }

    /// Both components exactly zero, which upstream data uses for "missing"
    pub fn is_null_island(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }
}

/// A single fix from the device location subsystem
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationReading {
    pub coordinate: Coordinate,
    /// Confidence radius in meters; 0 means the device did not report one
    pub accuracy_meters: f64,
    pub captured_at_ms: i64,
}

impl LocationReading {
    pub fn new(coordinate: Coordinate, accuracy_meters: f64, captured_at_ms: i64) -> Self {
        // Some devices report NaN or negative accuracy; both collapse to "unknown".
        let accuracy_meters = if accuracy_meters.is_finite() && accuracy_meters > 0.0 {
            accuracy_meters
        } else {
            0.0
        };
        Self {
            coordinate,
            accuracy_meters,
            captured_at_ms,
        }
    }

    /// Whether the sensor reported an accuracy at all
    pub fn has_known_accuracy(&self) -> bool {
        self.accuracy_meters > 0.0
    }

    /// Known accuracy no coarser than `target_meters`
    pub fn meets_accuracy(&self, target_meters: f64) -> bool {
        self.has_known_accuracy() && self.accuracy_meters <= target_meters
    }
}

/// Coordinate validation error
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum GeoError {
    #[error("latitude {0} outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} outside [-180, 180]")]
    LongitudeOutOfRange(f64),
}
