//! Verification Session
//!
//! Per-delivery verification state. Local proximity is feedback only; the
//! completion action unlocks on the backend's verdict.

use std::time::Duration;

use chrono::{DateTime, Utc};
use handoff_geo::{
    Coordinate, DEFAULT_RADIUS_METERS, LocationReading, ProximityBand, ProximityEvaluator,
    ProximityVerdict, approach_progress,
};
use handoff_location::AcquisitionError;
use handoff_net::NetError;
use handoff_net::delivery::{
    CompleteDeliveryRequest, CompleteDeliveryResponse, VerifyLocationRequest,
    VerifyLocationResponse, verification_message,
};

use crate::error::VerifyError;

const COMPLETION_FAILED: &str = "Failed to complete. Try again.";

/// Verification tunables
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationConfig {
    /// Backend re-check period
    pub poll_interval: Duration,
    /// Readings coarser than this are not sent for verification
    pub max_poll_accuracy_meters: f64,
    /// Local radius until the backend reports its threshold
    pub radius_meters: f64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            max_poll_accuracy_meters: 100.0,
            radius_meters: DEFAULT_RADIUS_METERS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionPhase {
    #[default]
    Idle,
    Watching,
    BackendVerified,
    BackendUnverified,
    Completing,
    Completed,
    /// The verified state survives; completion may be retried
    CompletionFailed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Watching => "watching",
            Self::BackendVerified => "backend_verified",
            Self::BackendUnverified => "backend_unverified",
            Self::Completing => "completing",
            Self::Completed => "completed",
            Self::CompletionFailed => "completion_failed",
        }
    }

    /// Phases in which the backend is re-checked
    fn polls(&self) -> bool {
        matches!(
            self,
            Self::Watching | Self::BackendVerified | Self::BackendUnverified | Self::CompletionFailed
        )
    }
}

/// What the verification screen renders
#[derive(Debug, Clone, PartialEq)]
pub struct VerificationSnapshot {
    pub phase: SessionPhase,
    pub verified: bool,
    pub can_complete: bool,
    /// Backend distance when known, else the local estimate
    pub distance_meters: Option<f64>,
    pub radius_meters: f64,
    pub band: Option<ProximityBand>,
    pub progress: f64,
    pub message: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VerificationSession {
    delivery_id: String,
    target: Option<Coordinate>,
    config: VerificationConfig,
    phase: SessionPhase,
    evaluator: ProximityEvaluator,
    reading: Option<LocationReading>,
    local: Option<ProximityVerdict>,
    backend: Option<VerifyLocationResponse>,
    last_error: Option<String>,
    // Bumped on every leave; work started in an earlier visit compares and bails
    visit: u64,
}

impl VerificationSession {
    pub fn new(delivery_id: impl Into<String>, target: Option<Coordinate>, config: VerificationConfig) -> Self {
        let evaluator = ProximityEvaluator::new(config.radius_meters);
        Self {
            delivery_id: delivery_id.into(),
            target,
            config,
            phase: SessionPhase::Idle,
            evaluator,
            reading: None,
            local: None,
            backend: None,
            last_error: None,
            visit: 0,
        }
    }

    pub fn delivery_id(&self) -> &str {
        &self.delivery_id
    }

    pub fn target(&self) -> Option<Coordinate> {
        self.target
    }

    pub fn config(&self) -> &VerificationConfig {
        &self.config
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn reading(&self) -> Option<LocationReading> {
        self.reading
    }

    pub fn local_verdict(&self) -> Option<ProximityVerdict> {
        self.local
    }

    pub fn backend_verdict(&self) -> Option<&VerifyLocationResponse> {
        self.backend.as_ref()
    }

    /// Screen visit counter, advanced by [`VerificationSession::leave`]
    pub fn visit(&self) -> u64 {
        self.visit
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Gating radius currently applied to local feedback
    pub fn radius(&self) -> f64 {
        self.evaluator.radius()
    }

    pub fn is_verified(&self) -> bool {
        self.backend.as_ref().is_some_and(|b| b.verified)
    }

    /// Screen became active
    pub fn enter(&mut self) {
        if self.phase == SessionPhase::Idle {
            self.phase = SessionPhase::Watching;
        }
    }

    /// Screen went away; a backend verdict does not outlive it
    pub fn leave(&mut self) {
        self.visit += 1;
        if self.phase == SessionPhase::Completed {
            return;
        }
        self.phase = SessionPhase::Idle;
        self.backend = None;
        self.last_error = None;
    }

    /// Record the newest position
    pub fn observe(&mut self, reading: LocationReading) {
        self.reading = Some(reading);
        self.refresh_local();
    }

    /// Next backend check, if one is due.
    ///
    /// Skips when no position is known or its accuracy is unknown or worse
    /// than the poll bound; in the latter case a pending location error is
    /// surfaced by title.
    pub fn poll_request(&mut self, location_error: Option<&AcquisitionError>) -> Option<VerifyLocationRequest> {
        if !self.phase.polls() {
            return None;
        }
        let reading = self.reading?;
        if !reading.meets_accuracy(self.config.max_poll_accuracy_meters) {
            if let Some(error) = location_error {
                self.last_error = Some(error.title().to_string());
            }
            return None;
        }
        Some(VerifyLocationRequest {
            delivery_id: self.delivery_id.clone(),
            current_latitude: reading.coordinate.latitude,
            current_longitude: reading.coordinate.longitude,
            accuracy: Some(reading.accuracy_meters),
        })
    }

    /// Adopt a backend verdict, including its threshold as the local radius
    pub fn apply_verification(&mut self, response: VerifyLocationResponse) {
        if !self.phase.polls() {
            return;
        }
        self.evaluator = ProximityEvaluator::new(response.threshold);
        self.refresh_local();
        self.phase = if response.verified {
            SessionPhase::BackendVerified
        } else {
            SessionPhase::BackendUnverified
        };
        self.last_error = None;
        self.backend = Some(response);
    }

    pub fn can_complete(&self) -> bool {
        matches!(
            self.phase,
            SessionPhase::BackendVerified | SessionPhase::CompletionFailed
        ) && self.is_verified()
            && self.reading.is_some()
    }

    /// Claim the completion; the caller submits the returned request
    pub fn begin_completion(
        &mut self,
        completed_at: DateTime<Utc>,
        notes: Option<String>,
    ) -> Result<CompleteDeliveryRequest, VerifyError> {
        match self.phase {
            SessionPhase::Completing => return Err(VerifyError::InProgress),
            SessionPhase::Completed => return Err(VerifyError::AlreadyCompleted),
            _ => {}
        }
        let reading = match self.reading {
            Some(reading) if self.can_complete() => reading,
            _ => return Err(VerifyError::NotVerified),
        };

        self.phase = SessionPhase::Completing;
        self.last_error = None;
        Ok(CompleteDeliveryRequest {
            completion_latitude: reading.coordinate.latitude,
            completion_longitude: reading.coordinate.longitude,
            completed_at,
            notes,
        })
    }

    /// Record the backend's answer to a completion
    pub fn finish_completion(
        &mut self,
        result: Result<CompleteDeliveryResponse, NetError>,
    ) -> Result<CompleteDeliveryResponse, VerifyError> {
        match result {
            Ok(response) if response.success => {
                self.phase = SessionPhase::Completed;
                Ok(response)
            }
            Ok(_) => {
                self.fail_completion(COMPLETION_FAILED.to_string());
                Err(VerifyError::Declined)
            }
            Err(error) => {
                let message = match &error {
                    NetError::Http { .. } | NetError::Network(_) => error.user_message(),
                    _ => COMPLETION_FAILED.to_string(),
                };
                self.fail_completion(message);
                Err(error.into())
            }
        }
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        let distance_meters = self
            .backend
            .as_ref()
            .map(|b| b.distance)
            .or(self.local.map(|l| l.distance_meters));

        VerificationSnapshot {
            phase: self.phase,
            verified: self.is_verified(),
            can_complete: self.can_complete(),
            distance_meters,
            radius_meters: self.radius(),
            band: distance_meters.map(ProximityBand::for_distance),
            progress: distance_meters.map(approach_progress).unwrap_or(0.0),
            message: self.backend.as_ref().map(verification_message),
            last_error: self.last_error.clone(),
        }
    }

    fn fail_completion(&mut self, message: String) {
        self.phase = SessionPhase::CompletionFailed;
        self.last_error = Some(message);
    }

    fn refresh_local(&mut self) {
        self.local = match (self.reading, self.target) {
            (Some(reading), Some(target)) => Some(self.evaluator.evaluate(reading.coordinate, target)),
            _ => None,
        };
    }
}
