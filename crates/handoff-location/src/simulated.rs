//! Simulated device
//!
//! Scripted stand-ins for the platform services, for tests and the
//! simulator binary.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use handoff_geo::{Coordinate, LocationReading};
use handoff_net::connectivity::ManualConnectivity;
use handoff_net::NetworkState;
use smol::channel::Sender;

use crate::device::{
    Device, DeviceError, PermissionProvider, PermissionState, Platform, PositionOptions,
    PositionProvider, SensorError, SettingsLauncher, WatchId, WatchOptions, WatchSubscription,
    WatchUpdate,
};

// ============================================================================
// Positions
// ============================================================================

#[derive(Default)]
struct Script {
    fixes: VecDeque<WatchUpdate>,
    last_options: Option<PositionOptions>,
    next_watch: WatchId,
    watches: HashMap<WatchId, Sender<WatchUpdate>>,
    watch_calls: usize,
}

/// Position source that replays queued fixes
///
/// An empty queue answers single-shot requests with a timeout error.
#[derive(Default)]
pub struct ScriptedPositions {
    script: Mutex<Script>,
    requests: AtomicUsize,
}

impl ScriptedPositions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a fix for the next single-shot request
    pub fn push_fix(&self, reading: LocationReading) {
        self.script().fixes.push_back(Ok(reading));
    }

    pub fn push_error(&self, error: SensorError) {
        self.script().fixes.push_back(Err(error));
    }

    /// Single-shot requests made so far
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<PositionOptions> {
        self.script().last_options
    }

    /// Subscriptions ever opened
    pub fn watch_calls(&self) -> usize {
        self.script().watch_calls
    }

    /// Subscriptions currently open
    pub fn active_watches(&self) -> usize {
        self.script().watches.len()
    }

    /// Push an update to every open subscription; returns how many got it
    pub fn emit(&self, update: WatchUpdate) -> usize {
        self.script()
            .watches
            .values()
            .filter(|tx| tx.try_send(update.clone()).is_ok())
            .count()
    }

    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl PositionProvider for ScriptedPositions {
    async fn current_position(&self, options: &PositionOptions) -> Result<LocationReading, SensorError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script();
        script.last_options = Some(*options);
        script.fixes.pop_front().unwrap_or_else(|| {
            Err(SensorError::new(SensorError::TIMEOUT, "Location request timed out"))
        })
    }

    fn watch_position(&self, _options: &WatchOptions) -> Result<WatchSubscription, SensorError> {
        let mut script = self.script();
        script.watch_calls += 1;
        script.next_watch += 1;
        let id = script.next_watch;
        let (tx, updates) = smol::channel::unbounded();
        script.watches.insert(id, tx);
        Ok(WatchSubscription { id, updates })
    }

    fn clear_watch(&self, id: WatchId) {
        self.script().watches.remove(&id);
    }
}

// ============================================================================
// Permissions
// ============================================================================

/// Permission service with a fixed answer
pub struct FixedPermissions {
    state: Mutex<PermissionState>,
    failing: bool,
    checks: AtomicUsize,
    prompts: AtomicUsize,
}

impl FixedPermissions {
    pub fn new(state: PermissionState) -> Self {
        Self {
            state: Mutex::new(state),
            failing: false,
            checks: AtomicUsize::new(0),
            prompts: AtomicUsize::new(0),
        }
    }

    /// Every call fails with [`DeviceError::Unavailable`]
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new(PermissionState::Undetermined)
        }
    }

    pub fn set(&self, state: PermissionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    pub fn checks(&self) -> usize {
        self.checks.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> usize {
        self.prompts.load(Ordering::SeqCst)
    }

    fn answer(&self) -> Result<PermissionState, DeviceError> {
        if self.failing {
            return Err(DeviceError::Unavailable("simulated failure".into()));
        }
        Ok(*self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

#[async_trait]
impl PermissionProvider for FixedPermissions {
    async fn check(&self) -> Result<PermissionState, DeviceError> {
        self.checks.fetch_add(1, Ordering::SeqCst);
        self.answer()
    }

    async fn request(&self) -> Result<PermissionState, DeviceError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        self.answer()
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Remembers every URL it was asked to open
#[derive(Debug, Default)]
pub struct RecordingSettings {
    opened: Mutex<Vec<String>>,
}

impl RecordingSettings {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

impl SettingsLauncher for RecordingSettings {
    fn open_url(&self, url: &str) {
        self.opened
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(url.to_string());
    }
}

// ============================================================================
// Device
// ============================================================================

/// A full simulated device with handles to each service
#[derive(Clone)]
pub struct SimulatedDevice {
    pub platform: Platform,
    pub positions: Arc<ScriptedPositions>,
    pub permissions: Arc<FixedPermissions>,
    pub network: Arc<ManualConnectivity>,
    pub settings: Arc<RecordingSettings>,
}

impl SimulatedDevice {
    /// Online, permission granted, no fixes queued
    pub fn new(platform: Platform) -> Self {
        Self {
            platform,
            positions: Arc::new(ScriptedPositions::new()),
            permissions: Arc::new(FixedPermissions::new(PermissionState::Granted)),
            network: Arc::new(ManualConnectivity::new(NetworkState::default())),
            settings: Arc::new(RecordingSettings::default()),
        }
    }

    pub fn with_permissions(mut self, permissions: FixedPermissions) -> Self {
        self.permissions = Arc::new(permissions);
        self
    }

    pub fn device(&self) -> Device {
        Device {
            platform: self.platform,
            permissions: self.permissions.clone(),
            positions: self.positions.clone(),
            network: self.network.clone(),
            settings: self.settings.clone(),
        }
    }
}

/// Evenly spaced points from `from` to `to`, both ends included
pub fn walk(from: Coordinate, to: Coordinate, steps: usize) -> Vec<Coordinate> {
    let steps = steps.max(1);
    (0..=steps)
        .map(|i| {
            let t = i as f64 / steps as f64;
            Coordinate {
                latitude: from.latitude + (to.latitude - from.latitude) * t,
                longitude: from.longitude + (to.longitude - from.longitude) * t,
            }
        })
        .collect()
}

/// Wall-clock milliseconds since the Unix epoch
pub fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

/// A fix at `coordinate` captured now
pub fn fix_at(coordinate: Coordinate, accuracy_meters: f64) -> LocationReading {
    LocationReading::new(coordinate, accuracy_meters, now_ms())
}
