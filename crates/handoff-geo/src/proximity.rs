//! Proximity evaluation
//!
//! One authoritative gating radius, plus presentation bands layered on top
//! of it. The bands never gate anything.

use crate::{distance, Coordinate};

/// Default gating radius around the delivery address
pub const DEFAULT_RADIUS_METERS: f64 = 50.0;

/// Presentation band: "very close"
pub const VERY_CLOSE_METERS: f64 = 25.0;

/// Presentation band: "arrived"
pub const ARRIVED_METERS: f64 = 10.0;

/// Distance at which the approach indicator reads empty
pub const APPROACH_SCALE_METERS: f64 = 200.0;

/// Presentation band for a distance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProximityBand {
    Far,
    VeryClose,
    Arrived,
}

impl ProximityBand {
    pub fn for_distance(meters: f64) -> Self {
        if meters <= ARRIVED_METERS {
            Self::Arrived
        } else if meters <= VERY_CLOSE_METERS {
            Self::VeryClose
        } else {
            Self::Far
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Far => "far",
            Self::VeryClose => "very-close",
            Self::Arrived => "arrived",
        }
    }
}

/// Derived verdict for one reading; recomputed, never stored
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityVerdict {
    pub distance_meters: f64,
    pub within_radius: bool,
    pub radius_meters: f64,
}

impl ProximityVerdict {
    pub fn band(&self) -> ProximityBand {
        ProximityBand::for_distance(self.distance_meters)
    }

    pub fn progress(&self) -> f64 {
        approach_progress(self.distance_meters)
    }
}

/// Fill level for the approach indicator, 0 at 200 m or more, 1 on target
pub fn approach_progress(distance_meters: f64) -> f64 {
    (1.0 - distance_meters / APPROACH_SCALE_METERS).clamp(0.0, 1.0)
}

/// Gating-radius evaluator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProximityEvaluator {
    radius_meters: f64,
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_RADIUS_METERS)
    }
}

impl ProximityEvaluator {
    /// Non-finite or negative radii fall back to the default
    pub fn new(radius_meters: f64) -> Self {
        let radius_meters = if radius_meters.is_finite() && radius_meters >= 0.0 {
            radius_meters
        } else {
            DEFAULT_RADIUS_METERS
        };
        Self { radius_meters }
    }

    pub fn radius(&self) -> f64 {
        self.radius_meters
    }

    /// Inclusive at the boundary: `distance == radius` is within
    pub fn evaluate_distance(&self, distance_meters: f64) -> ProximityVerdict {
        ProximityVerdict {
            distance_meters,
            within_radius: distance_meters <= self.radius_meters,
            radius_meters: self.radius_meters,
        }
    }

    pub fn evaluate(&self, position: Coordinate, target: Coordinate) -> ProximityVerdict {
        self.evaluate_distance(distance(position, target))
    }
}
