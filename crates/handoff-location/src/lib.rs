//! Handoff Location
//!
//! GPS acquisition with retries, continuous position watching and the
//! permission gate in front of both.

mod acquisition;
mod cancel;
mod device;
mod error;
mod permission;
mod status;
mod tracker;

pub mod simulated;

pub use acquisition::{AcquisitionConfig, AcquisitionMachine, Effect, Event, Phase};
pub use cancel::CancelToken;
pub use device::{
    Device, DeviceError, PermissionProvider, PermissionState, Platform, PositionOptions,
    PositionProvider, SensorError, SettingsLauncher, WatchId, WatchOptions, WatchSubscription,
    WatchUpdate,
};
pub use error::{AcquisitionError, ErrorKind};
pub use permission::{PermissionDecision, PermissionFlow, PermissionGate};
pub use status::AcquisitionStatus;
pub use tracker::{LocationSnapshot, LocationTracker, TrackerConfig};
