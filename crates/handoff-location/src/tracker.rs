//! Location Tracker
//!
//! The courier-facing location state: one-shot fetches driven through the
//! acquisition machine, a continuous watch, the proximity target and
//! snapshot publishing. Everything the tracker starts shares one
//! [`CancelToken`]; [`LocationTracker::teardown`] ends all of it.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use handoff_geo::{Coordinate, LocationReading};
use handoff_net::NetworkGuard;
use smol::Task;
use smol::channel::{Receiver, Sender};

use crate::acquisition::{AcquisitionConfig, AcquisitionMachine, Effect, Event};
use crate::cancel::CancelToken;
use crate::device::{Device, WatchId, WatchOptions, WatchUpdate};
use crate::error::{AcquisitionError, ErrorKind};
use crate::permission::{PermissionDecision, PermissionGate};
use crate::status::AcquisitionStatus;

/// Tracker configuration
#[derive(Debug, Clone, Default)]
pub struct TrackerConfig {
    pub acquisition: AcquisitionConfig,
    pub watch: WatchOptions,
}

/// What the presentation layer renders
#[derive(Debug, Clone, PartialEq)]
pub struct LocationSnapshot {
    pub location: Option<LocationReading>,
    pub status: AcquisitionStatus,
    pub error: Option<AcquisitionError>,
    pub is_loading: bool,
    /// Meters to the target, when both are known
    pub distance: Option<f64>,
    pub is_watching: bool,
}

enum WatchState {
    Stopped,
    /// Waiting on the permission prompt
    Starting { generation: u64 },
    Active {
        id: WatchId,
        generation: u64,
        pump: Task<()>,
    },
}

impl WatchState {
    fn generation(&self) -> Option<u64> {
        match self {
            Self::Stopped => None,
            Self::Starting { generation } | Self::Active { generation, .. } => Some(*generation),
        }
    }
}

struct State {
    machine: AcquisitionMachine,
    // Bumped by every fetch and reset; stale drivers compare and bail
    sequence: u64,
    location: Option<LocationReading>,
    target: Option<Coordinate>,
    distance: Option<f64>,
    watch: WatchState,
    watch_generation: u64,
}

impl State {
    fn store_reading(&mut self, reading: LocationReading) {
        self.location = Some(reading);
        self.refresh_distance();
    }

    fn refresh_distance(&mut self) {
        self.distance = match (self.location, self.target) {
            (Some(reading), Some(target)) => Some(handoff_geo::distance(reading.coordinate, target)),
            _ => None,
        };
    }

    fn snapshot(&self) -> LocationSnapshot {
        let status = self.machine.status();
        LocationSnapshot {
            location: self.location,
            status,
            error: self.machine.error().cloned(),
            is_loading: status.is_loading(),
            distance: self.distance,
            is_watching: matches!(self.watch, WatchState::Active { .. }),
        }
    }

    /// Take an active subscription out, leaving the watch stopped
    fn take_watch(&mut self) -> Option<(WatchId, Task<()>)> {
        match std::mem::replace(&mut self.watch, WatchState::Stopped) {
            WatchState::Active { id, pump, .. } => Some((id, pump)),
            _ => None,
        }
    }
}

struct Inner {
    device: Device,
    gate: PermissionGate,
    guard: NetworkGuard,
    config: TrackerConfig,
    token: CancelToken,
    state: Mutex<State>,
    subscribers: Mutex<Vec<Sender<LocationSnapshot>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let state = self.state.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some((id, _pump)) = state.take_watch() {
            self.device.positions.clear_watch(id);
        }
    }
}

/// Location state for one screen
#[derive(Clone)]
pub struct LocationTracker {
    inner: Arc<Inner>,
}

impl LocationTracker {
    pub fn new(device: Device, config: TrackerConfig) -> Self {
        Self::with_token(device, config, CancelToken::new())
    }

    /// Build a tracker whose lifetime follows an existing token
    pub fn with_token(device: Device, config: TrackerConfig, token: CancelToken) -> Self {
        let gate = PermissionGate::new(device.platform, device.permissions.clone());
        let guard = NetworkGuard::new(device.network.clone());
        let machine = AcquisitionMachine::new(config.acquisition.clone());

        Self {
            inner: Arc::new(Inner {
                device,
                gate,
                guard,
                config,
                token,
                state: Mutex::new(State {
                    machine,
                    sequence: 0,
                    location: None,
                    target: None,
                    distance: None,
                    watch: WatchState::Stopped,
                    watch_generation: 0,
                }),
                subscribers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.inner.config
    }

    pub fn token(&self) -> &CancelToken {
        &self.inner.token
    }

    // ========================================================================
    // One-shot fetch
    // ========================================================================

    /// Obtain one fix meeting the accuracy target.
    ///
    /// Returns `None` on any failure, when a fetch is already running, or
    /// after teardown; the reason is in [`LocationTracker::status`] and
    /// [`LocationTracker::error`].
    pub async fn fetch_location(&self) -> Option<LocationReading> {
        let (sequence, mut effect) = {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() {
                return None;
            }
            let effect = state.machine.step(Event::Start)?;
            state.sequence += 1;
            (state.sequence, effect)
        };
        tracing::info!("starting location fetch");

        loop {
            let event = match effect {
                Effect::CheckNetwork => Event::NetworkChecked(self.guarded(self.inner.guard.check()).await?),
                Effect::RequestPermission => {
                    Event::PermissionResolved(self.guarded(self.inner.gate.request()).await?)
                }
                Effect::ScheduleAttempt { attempt, delay } => {
                    if !delay.is_zero() {
                        tracing::debug!(attempt, delay_ms = delay.as_millis() as u64, "retry scheduled");
                        self.guarded(smol::Timer::after(delay)).await?;
                    }
                    Event::AttemptDue
                }
                Effect::RequestPosition { attempt, options } => {
                    tracing::debug!(
                        attempt = attempt + 1,
                        of = self.inner.config.acquisition.attempts(),
                        "requesting position"
                    );
                    match self.guarded(self.inner.device.positions.current_position(&options)).await? {
                        Ok(reading) => {
                            tracing::debug!(accuracy = reading.accuracy_meters, "position received");
                            Event::PositionReceived(reading)
                        }
                        Err(e) => {
                            tracing::debug!(code = e.code, message = %e.message, "position request failed");
                            Event::SensorFailed(e)
                        }
                    }
                }
                Effect::Resolve(reading) => {
                    match &reading {
                        Some(r) => tracing::info!(accuracy = r.accuracy_meters, "location acquired"),
                        None => tracing::info!(status = self.status().as_str(), "location fetch failed"),
                    }
                    return reading;
                }
            };
            effect = self.apply(sequence, event)?;
        }
    }

    /// Feed an event to the machine unless the fetch went stale
    fn apply(&self, sequence: u64, event: Event) -> Option<Effect> {
        let effect = {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() || state.sequence != sequence {
                return None;
            }
            let effect = state.machine.step(event);
            if let Some(Effect::Resolve(Some(reading))) = &effect {
                state.store_reading(*reading);
            }
            effect
        };
        self.publish();
        effect
    }

    /// Reset stored fix, status, error and retry counter.
    ///
    /// A fetch still running is abandoned and resolves to `None`.
    pub fn clear_location(&self) {
        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() {
                return;
            }
            state.machine.step(Event::Reset);
            state.sequence += 1;
            state.location = None;
            state.distance = None;
        }
        self.publish();
    }

    // ========================================================================
    // Permission
    // ========================================================================

    /// Ask for location permission; `false` on denial, failure or teardown
    pub async fn request_permission(&self) -> bool {
        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() {
                return false;
            }
            state.machine.prompt_started();
        }
        self.publish();

        let Some(decision) = self.guarded(self.inner.gate.request()).await else {
            return false;
        };

        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() {
                return false;
            }
            state.machine.prompt_resolved(&decision);
        }
        self.publish();
        decision.is_granted()
    }

    /// Open the OS location settings
    pub fn open_settings(&self) {
        let url = self.inner.device.platform.settings_url();
        tracing::info!(url, "opening location settings");
        self.inner.device.settings.open_url(url);
    }

    // ========================================================================
    // Continuous watch
    // ========================================================================

    /// Subscribe to continuous updates; a no-op while already watching
    pub async fn start_watching(&self) {
        let generation = {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() || !matches!(state.watch, WatchState::Stopped) {
                return;
            }
            state.watch_generation += 1;
            let generation = state.watch_generation;
            state.watch = WatchState::Starting { generation };
            generation
        };

        let Some(decision) = self.guarded(self.inner.gate.request()).await else {
            return;
        };

        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled()
                || !matches!(state.watch, WatchState::Starting { generation: g } if g == generation)
            {
                return;
            }

            if let PermissionDecision::Denied(error) = decision {
                state.watch = WatchState::Stopped;
                state.machine.deny(error);
            } else {
                match self.inner.device.positions.watch_position(&self.inner.config.watch) {
                    Ok(subscription) => {
                        let pump = smol::spawn(pump(
                            Arc::downgrade(&self.inner),
                            generation,
                            subscription.updates,
                        ));
                        tracing::info!(watch_id = subscription.id, "watching position");
                        state.watch = WatchState::Active {
                            id: subscription.id,
                            generation,
                            pump,
                        };
                    }
                    Err(e) => {
                        tracing::warn!(code = e.code, message = %e.message, "failed to start watch");
                        state.watch = WatchState::Stopped;
                        if e.kind() == ErrorKind::Permission {
                            state.machine.deny(AcquisitionError::from(&e));
                        }
                    }
                }
            }
        }
        self.publish();
    }

    /// Unsubscribe; safe when not watching
    pub fn stop_watching(&self) {
        let stopped = {
            let mut state = self.lock();
            let was_running = !matches!(state.watch, WatchState::Stopped);
            let active = state.take_watch();
            was_running.then_some(active)
        };
        let Some(active) = stopped else {
            return;
        };
        if let Some((id, pump)) = active {
            drop(pump);
            self.inner.device.positions.clear_watch(id);
            tracing::info!(watch_id = id, "stopped watching position");
        }
        if !self.inner.token.is_cancelled() {
            self.publish();
        }
    }

    /// Returns `false` once the pump should stop
    fn on_watch_update(&self, generation: u64, update: WatchUpdate) -> bool {
        let cleared = {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() || state.watch.generation() != Some(generation) {
                return false;
            }
            match update {
                Ok(reading) => {
                    state.store_reading(reading);
                    tracing::debug!(
                        accuracy = reading.accuracy_meters,
                        distance = ?state.distance,
                        "watch update"
                    );
                    None
                }
                Err(e) if e.kind() == ErrorKind::Permission => {
                    tracing::warn!(code = e.code, "permission revoked while watching");
                    // We are running inside the pump; let it finish on its own.
                    let active = state.take_watch();
                    state.machine.deny(AcquisitionError::from(&e));
                    active.map(|(id, pump)| {
                        pump.detach();
                        id
                    })
                }
                Err(e) => {
                    tracing::warn!(code = e.code, message = %e.message, "transient watch error");
                    return true;
                }
            }
        };

        let keep_going = cleared.is_none();
        if let Some(id) = cleared {
            self.inner.device.positions.clear_watch(id);
        }
        self.publish();
        keep_going
    }

    /// The OS closed the stream on its own
    fn on_watch_closed(&self, generation: u64) {
        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() || state.watch.generation() != Some(generation) {
                return;
            }
            if let Some((id, pump)) = state.take_watch() {
                pump.detach();
                tracing::info!(watch_id = id, "watch stream ended");
            }
        }
        self.publish();
    }

    // ========================================================================
    // Target
    // ========================================================================

    /// Set the coordinate distances are measured to
    pub fn set_target(&self, target: Option<Coordinate>) {
        {
            let mut state = self.lock();
            if self.inner.token.is_cancelled() {
                return;
            }
            state.target = target;
            state.refresh_distance();
        }
        self.publish();
    }

    pub fn target(&self) -> Option<Coordinate> {
        self.lock().target
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Cancel everything this tracker started and close subscriptions
    pub fn teardown(&self) {
        if self.inner.token.is_cancelled() && !self.is_watching() {
            return;
        }
        tracing::debug!("tearing down location tracker");
        self.inner.token.cancel();
        self.stop_watching();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    // ========================================================================
    // Observation
    // ========================================================================

    pub fn snapshot(&self) -> LocationSnapshot {
        self.lock().snapshot()
    }

    /// Receive a snapshot after every state change
    pub fn subscribe(&self) -> Receiver<LocationSnapshot> {
        let (tx, rx) = smol::channel::unbounded();
        if !self.inner.token.is_cancelled() {
            self.inner
                .subscribers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(tx);
        }
        rx
    }

    pub fn location(&self) -> Option<LocationReading> {
        self.lock().location
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.lock().machine.status()
    }

    pub fn error(&self) -> Option<AcquisitionError> {
        self.lock().machine.error().cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.status().is_loading()
    }

    pub fn distance(&self) -> Option<f64> {
        self.lock().distance
    }

    pub fn is_watching(&self) -> bool {
        matches!(self.lock().watch, WatchState::Active { .. })
    }

    fn publish(&self) {
        let snapshot = self.snapshot();
        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|tx| tx.try_send(snapshot.clone()).is_ok());
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `future` unless the token is cancelled first
    async fn guarded<F: Future>(&self, future: F) -> Option<F::Output> {
        let token = &self.inner.token;
        smol::future::or(async { Some(future.await) }, async {
            token.cancelled().await;
            None
        })
        .await
    }
}

async fn pump(inner: Weak<Inner>, generation: u64, updates: Receiver<WatchUpdate>) {
    while let Ok(update) = updates.recv().await {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        if !(LocationTracker { inner }).on_watch_update(generation, update) {
            return;
        }
    }
    if let Some(inner) = inner.upgrade() {
        LocationTracker { inner }.on_watch_closed(generation);
    }
}
