//! Location Acquisition
//!
//! The single-shot fetch as a pure state machine. [`AcquisitionMachine::step`]
//! takes an [`Event`] and returns the [`Effect`] the driver must perform next;
//! timers, sensors and prompts live in the driver, not here.

use std::time::Duration;

use handoff_geo::LocationReading;

use crate::device::{PositionOptions, SensorError};
use crate::error::{AcquisitionError, ErrorKind};
use crate::permission::PermissionDecision;
use crate::status::AcquisitionStatus;

/// Retry policy for one fetch sequence
#[derive(Debug, Clone, PartialEq)]
pub struct AcquisitionConfig {
    /// Fixes with a coarser accuracy circle are rejected
    pub target_accuracy_meters: f64,
    /// Total attempts per sequence, including the first
    pub max_retries: u32,
    /// Enforced by the position request itself
    pub attempt_timeout: Duration,
    /// Delay before attempt `n`; later attempts reuse the last entry
    pub retry_delays: Vec<Duration>,
    pub maximum_age: Duration,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            target_accuracy_meters: 50.0,
            max_retries: 3,
            attempt_timeout: Duration::from_secs(15),
            retry_delays: vec![
                Duration::ZERO,
                Duration::from_secs(5),
                Duration::from_secs(10),
            ],
            maximum_age: Duration::from_secs(10),
        }
    }
}

impl AcquisitionConfig {
    pub fn with_target_accuracy(mut self, meters: f64) -> Self {
        self.target_accuracy_meters = meters;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_retry_delays(mut self, delays: Vec<Duration>) -> Self {
        self.retry_delays = delays;
        self
    }

    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.retry_delays
            .get(attempt as usize)
            .or(self.retry_delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    pub fn position_options(&self) -> PositionOptions {
        PositionOptions {
            enable_high_accuracy: true,
            timeout: self.attempt_timeout,
            maximum_age: self.maximum_age,
            force_fresh_fix: true,
            show_settings_dialog: true,
        }
    }
}

/// Where the sequence is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    CheckingNetwork,
    RequestingPermission,
    /// Retry timer running for `attempt`
    Waiting { attempt: u32 },
    /// Position request outstanding for `attempt`
    Locating { attempt: u32 },
    Finished,
}

impl Phase {
    pub fn in_flight(&self) -> bool {
        !matches!(self, Self::Idle | Self::Finished)
    }
}

/// Inputs to the machine
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Start,
    NetworkChecked(bool),
    PermissionResolved(PermissionDecision),
    /// The scheduled retry delay elapsed
    AttemptDue,
    PositionReceived(LocationReading),
    SensorFailed(SensorError),
    /// Drop everything and return to idle
    Reset,
}

/// Work the driver performs on the machine's behalf
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    CheckNetwork,
    RequestPermission,
    ScheduleAttempt { attempt: u32, delay: Duration },
    RequestPosition { attempt: u32, options: PositionOptions },
    /// The sequence is over
    Resolve(Option<LocationReading>),
}

/// Single-shot acquisition state
#[derive(Debug, Clone)]
pub struct AcquisitionMachine {
    config: AcquisitionConfig,
    phase: Phase,
    status: AcquisitionStatus,
    error: Option<AcquisitionError>,
    retry_count: u32,
    // Status to restore once a prompt outside a fetch is granted
    before_prompt: Option<AcquisitionStatus>,
}

impl AcquisitionMachine {
    pub fn new(config: AcquisitionConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            status: AcquisitionStatus::Idle,
            error: None,
            retry_count: 0,
            before_prompt: None,
        }
    }

    pub fn config(&self) -> &AcquisitionConfig {
        &self.config
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn status(&self) -> AcquisitionStatus {
        self.status
    }

    pub fn error(&self) -> Option<&AcquisitionError> {
        self.error.as_ref()
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn in_flight(&self) -> bool {
        self.phase.in_flight()
    }

    /// Advance the machine. `None` means the event was ignored.
    pub fn step(&mut self, event: Event) -> Option<Effect> {
        match (self.phase, event) {
            (_, Event::Reset) => {
                self.phase = Phase::Idle;
                self.status = AcquisitionStatus::Idle;
                self.error = None;
                self.retry_count = 0;
                self.before_prompt = None;
                None
            }
            (Phase::Idle | Phase::Finished, Event::Start) => {
                self.phase = Phase::CheckingNetwork;
                self.retry_count = 0;
                self.before_prompt = None;
                Some(Effect::CheckNetwork)
            }
            (Phase::CheckingNetwork, Event::NetworkChecked(false)) => {
                self.fail(AcquisitionStatus::NetworkError, AcquisitionError::network())
            }
            (Phase::CheckingNetwork, Event::NetworkChecked(true)) => {
                self.phase = Phase::RequestingPermission;
                self.status = AcquisitionStatus::RequestingPermission;
                self.error = None;
                Some(Effect::RequestPermission)
            }
            (Phase::RequestingPermission, Event::PermissionResolved(decision)) => match decision {
                PermissionDecision::Granted => {
                    self.status = AcquisitionStatus::Fetching;
                    self.error = None;
                    self.retry_count = 0;
                    Some(self.schedule(0))
                }
                PermissionDecision::Denied(error) => {
                    self.fail(AcquisitionStatus::PermissionDenied, error)
                }
            },
            (Phase::Waiting { attempt }, Event::AttemptDue) => {
                self.phase = Phase::Locating { attempt };
                Some(Effect::RequestPosition {
                    attempt,
                    options: self.config.position_options(),
                })
            }
            (Phase::Locating { attempt }, Event::PositionReceived(reading)) => {
                if reading.meets_accuracy(self.config.target_accuracy_meters) {
                    self.phase = Phase::Finished;
                    self.status = AcquisitionStatus::Success;
                    self.error = None;
                    Some(Effect::Resolve(Some(reading)))
                } else if self.has_attempts_after(attempt) {
                    Some(self.schedule(attempt + 1))
                } else {
                    self.fail(
                        AcquisitionStatus::Error,
                        AcquisitionError::accuracy(reading.accuracy_meters),
                    )
                }
            }
            (Phase::Locating { attempt }, Event::SensorFailed(error)) => {
                let kind = error.kind();
                if kind != ErrorKind::Permission && self.has_attempts_after(attempt) {
                    return Some(self.schedule(attempt + 1));
                }
                let status = match kind {
                    ErrorKind::Timeout => AcquisitionStatus::Timeout,
                    ErrorKind::GpsOff => AcquisitionStatus::GpsDisabled,
                    _ => AcquisitionStatus::Error,
                };
                self.fail(status, AcquisitionError::from(&error))
            }
            // Start while in flight, and anything out of order
            _ => None,
        }
    }

    /// A prompt outside a fetch began
    pub fn prompt_started(&mut self) {
        if self.in_flight() {
            return;
        }
        self.before_prompt.get_or_insert(self.status);
        self.status = AcquisitionStatus::RequestingPermission;
        self.error = None;
    }

    /// A prompt outside a fetch finished
    pub fn prompt_resolved(&mut self, decision: &PermissionDecision) {
        if self.in_flight() {
            return;
        }
        match decision {
            PermissionDecision::Granted => {
                if let Some(previous) = self.before_prompt.take() {
                    self.status = previous;
                }
            }
            PermissionDecision::Denied(error) => self.deny(error.clone()),
        }
    }

    /// Permission was refused or revoked outside a fetch
    pub fn deny(&mut self, error: AcquisitionError) {
        if self.in_flight() {
            return;
        }
        self.before_prompt = None;
        self.status = AcquisitionStatus::PermissionDenied;
        self.error = Some(error);
    }

    fn has_attempts_after(&self, attempt: u32) -> bool {
        attempt + 1 < self.config.attempts()
    }

    fn schedule(&mut self, attempt: u32) -> Effect {
        self.retry_count = attempt;
        self.phase = Phase::Waiting { attempt };
        Effect::ScheduleAttempt {
            attempt,
            delay: self.config.delay_for(attempt),
        }
    }

    fn fail(&mut self, status: AcquisitionStatus, error: AcquisitionError) -> Option<Effect> {
        self.phase = Phase::Finished;
        self.status = status;
        self.error = Some(error);
        Some(Effect::Resolve(None))
    }
}
