//! Device services
//!
//! The platform seams: permission prompts, position fixes, position watches
//! and the settings deep link.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use handoff_geo::LocationReading;
use handoff_net::Connectivity;

use crate::error::ErrorKind;

/// Mobile platform, which decides the permission flow and settings link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Ios,
    Android,
}

impl Platform {
    /// OS location settings deep link
    pub fn settings_url(&self) -> &'static str {
        match self {
            Self::Ios => "app-settings:",
            Self::Android => "android.settings.LOCATION_SOURCE_SETTINGS",
        }
    }
}

/// Permission state reported by the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionState {
    Granted,
    Denied,
    /// Blocked by policy or "don't ask again"; the prompt will not show
    Restricted,
    Undetermined,
}

impl PermissionState {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Platform permission service failure
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DeviceError {
    #[error("permission service unavailable: {0}")]
    Unavailable(String),
}

/// OS permission prompt
#[async_trait]
pub trait PermissionProvider: Send + Sync {
    /// Current state without prompting
    async fn check(&self) -> Result<PermissionState, DeviceError>;

    /// Prompt for precise location
    async fn request(&self) -> Result<PermissionState, DeviceError>;
}

/// Single-shot position request options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionOptions {
    pub enable_high_accuracy: bool,
    pub timeout: Duration,
    /// Oldest cached fix the OS may return
    pub maximum_age: Duration,
    pub force_fresh_fix: bool,
    /// Let the OS ask the user to switch GPS on
    pub show_settings_dialog: bool,
}

impl Default for PositionOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            timeout: Duration::from_secs(15),
            maximum_age: Duration::from_secs(10),
            force_fresh_fix: true,
            show_settings_dialog: true,
        }
    }
}

/// Continuous watch options
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WatchOptions {
    pub enable_high_accuracy: bool,
    /// Minimum movement before the OS delivers another fix
    pub distance_filter_meters: f64,
    pub interval: Duration,
    pub fastest_interval: Duration,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            enable_high_accuracy: true,
            distance_filter_meters: 5.0,
            interval: Duration::from_secs(5),
            fastest_interval: Duration::from_secs(2),
        }
    }
}

/// Sensor error as reported by the location service
///
/// Codes: 1 permission denied, 2 position unavailable, 3 timeout,
/// 4 platform location service unavailable, 5 location settings not satisfied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("location error {code}: {message}")]
pub struct SensorError {
    pub code: i32,
    pub message: String,
}

impl SensorError {
    pub const PERMISSION_DENIED: i32 = 1;
    pub const POSITION_UNAVAILABLE: i32 = 2;
    pub const TIMEOUT: i32 = 3;
    pub const SERVICE_UNAVAILABLE: i32 = 4;
    pub const SETTINGS_NOT_SATISFIED: i32 = 5;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.code {
            Self::PERMISSION_DENIED => ErrorKind::Permission,
            Self::POSITION_UNAVAILABLE | Self::SETTINGS_NOT_SATISFIED => ErrorKind::GpsOff,
            Self::TIMEOUT => ErrorKind::Timeout,
            _ => ErrorKind::Unknown,
        }
    }
}

/// Watch ID for position watching
pub type WatchId = u64;

/// One update from a watch: a fix, or a sensor error the stream survived
pub type WatchUpdate = Result<LocationReading, SensorError>;

/// An open OS subscription; closing the channel ends it
#[derive(Debug)]
pub struct WatchSubscription {
    pub id: WatchId,
    pub updates: smol::channel::Receiver<WatchUpdate>,
}

/// Device location subsystem
#[async_trait]
pub trait PositionProvider: Send + Sync {
    /// Request a single fix; the timeout is enforced here, not by the caller
    async fn current_position(&self, options: &PositionOptions) -> Result<LocationReading, SensorError>;

    /// Open a continuous subscription
    fn watch_position(&self, options: &WatchOptions) -> Result<WatchSubscription, SensorError>;

    /// Close a subscription; unknown ids are ignored
    fn clear_watch(&self, id: WatchId);
}

/// Opens OS screens by URL
pub trait SettingsLauncher: Send + Sync {
    fn open_url(&self, url: &str);
}

/// Everything the location core needs from the device
#[derive(Clone)]
pub struct Device {
    pub platform: Platform,
    pub permissions: Arc<dyn PermissionProvider>,
    pub positions: Arc<dyn PositionProvider>,
    pub network: Arc<dyn Connectivity>,
    pub settings: Arc<dyn SettingsLauncher>,
}
