//! Acquisition errors
//!
//! Failures are captured as state on the tracker, never thrown at callers.

use crate::device::SensorError;

/// Error taxonomy surfaced to the courier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Permission,
    Timeout,
    Accuracy,
    Network,
    GpsOff,
    Unknown,
}

impl ErrorKind {
    /// Short heading for an error banner
    pub fn title(&self) -> &'static str {
        match self {
            Self::Permission => "Permission Required",
            Self::GpsOff => "GPS Unavailable",
            Self::Timeout => "GPS Timeout",
            Self::Network => "No Internet",
            Self::Accuracy => "Weak Signal",
            Self::Unknown => "Location Error",
        }
    }
}

/// A terminal acquisition failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct AcquisitionError {
    pub code: i32,
    pub message: String,
    pub kind: ErrorKind,
}

impl AcquisitionError {
    pub fn new(code: i32, message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            code,
            message: message.into(),
            kind,
        }
    }

    pub fn title(&self) -> &'static str {
        self.kind.title()
    }

    /// Pre-flight connectivity failure
    pub fn network() -> Self {
        Self::new(0, "No Internet Connection. Please check your data.", ErrorKind::Network)
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::new(SensorError::PERMISSION_DENIED, message, ErrorKind::Permission)
    }

    /// Final attempt still too coarse
    pub fn accuracy(accuracy_meters: f64) -> Self {
        Self::new(
            SensorError::SETTINGS_NOT_SATISFIED,
            format!(
                "GPS accuracy is low ({}m). Improved signal needed. Move to open area.",
                accuracy_meters.round()
            ),
            ErrorKind::Accuracy,
        )
    }
}

impl From<&SensorError> for AcquisitionError {
    fn from(error: &SensorError) -> Self {
        let message = match error.code {
            SensorError::PERMISSION_DENIED => "Location permission denied. Enable in Settings.",
            SensorError::POSITION_UNAVAILABLE => {
                "GPS signal unavailable. Check if GPS is on and testing outdoors."
            }
            SensorError::TIMEOUT => "GPS request timed out. Try moving to an open area.",
            SensorError::SERVICE_UNAVAILABLE => "Location services unavailable.",
            SensorError::SETTINGS_NOT_SATISFIED => "Location settings not satisfied.",
            _ => "Unable to get location. Please try again.",
        };
        Self::new(error.code, message, error.kind())
    }
}
