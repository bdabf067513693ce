//! Verification Orchestrator
//!
//! Runs a [`VerificationSession`] against a live tracker and the delivery
//! backend: watch while the screen is active, re-check the backend on a fixed
//! period, submit the completion.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::Utc;
use handoff_geo::Coordinate;
use handoff_location::LocationTracker;
use handoff_net::DeliveryBackend;
use handoff_net::delivery::{CompleteDeliveryResponse, VerifyLocationResponse};
use smol::Task;
use smol::stream::StreamExt;

use crate::error::VerifyError;
use crate::session::{SessionPhase, VerificationConfig, VerificationSession, VerificationSnapshot};

struct Shared<B> {
    backend: B,
    tracker: LocationTracker,
    session: Mutex<VerificationSession>,
    poller: Mutex<Option<Task<()>>>,
}

/// Drives verification for one delivery
pub struct VerificationOrchestrator<B> {
    shared: Arc<Shared<B>>,
}

impl<B> Clone for VerificationOrchestrator<B> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<B: DeliveryBackend + 'static> VerificationOrchestrator<B> {
    pub fn new(
        backend: B,
        tracker: LocationTracker,
        delivery_id: impl Into<String>,
        target: Option<Coordinate>,
        config: VerificationConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                backend,
                tracker,
                session: Mutex::new(VerificationSession::new(delivery_id, target, config)),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn tracker(&self) -> &LocationTracker {
        &self.shared.tracker
    }

    pub fn backend(&self) -> &B {
        &self.shared.backend
    }

    /// Screen became active: watch and (re)start the poll timer.
    ///
    /// A completed delivery stays idle. When [`VerificationOrchestrator::leave`]
    /// runs while the permission prompt is still open, no timer is started.
    pub async fn enter(&self) {
        let (visit, target, interval) = {
            let mut session = self.shared.session();
            if session.phase() == SessionPhase::Completed {
                return;
            }
            session.enter();
            (session.visit(), session.target(), session.config().poll_interval)
        };
        self.shared.tracker.set_target(target);
        self.shared.tracker.start_watching().await;

        {
            // leave() advances the visit before it takes the poller
            let mut poller = self.shared.poller();
            if self.shared.session().visit() != visit {
                tracing::debug!("screen left during enter, not polling");
                return;
            }
            // Replacing the handle cancels the previous timer
            *poller = Some(smol::spawn(poll_loop(Arc::downgrade(&self.shared), interval)));
        }
        tracing::info!(
            delivery_id = self.shared.session().delivery_id(),
            interval_ms = interval.as_millis() as u64,
            "verification started"
        );
    }

    /// Screen went away: stop the timer and the watch
    pub fn leave(&self) {
        self.shared.session().leave();
        self.shared.stop();
        tracing::info!(delivery_id = self.shared.session().delivery_id(), "verification stopped");
    }

    /// One backend re-check with the newest position, if one is due
    pub async fn poll_once(&self) -> Option<VerifyLocationResponse> {
        self.shared.poll_once().await
    }

    /// Submit the completion; refused without a positive backend verdict
    pub async fn complete(&self, notes: Option<String>) -> Result<CompleteDeliveryResponse, VerifyError> {
        let (delivery_id, request) = {
            let mut session = self.shared.synced_session();
            let request = session.begin_completion(Utc::now(), notes)?;
            (session.delivery_id().to_string(), request)
        };
        tracing::info!(%delivery_id, "completing delivery");

        let result = self.shared.backend.complete_delivery(&delivery_id, &request).await;
        let outcome = self.shared.session().finish_completion(result);

        match &outcome {
            Ok(response) => {
                tracing::info!(
                    %delivery_id,
                    status = ?response.verification_status,
                    notified = response.notification_sent,
                    "delivery completed"
                );
                self.shared.stop();
            }
            Err(e) => tracing::warn!(%delivery_id, error = %e, "completion failed"),
        }
        outcome
    }

    pub fn snapshot(&self) -> VerificationSnapshot {
        self.shared.synced_session().snapshot()
    }

    pub fn is_polling(&self) -> bool {
        self.shared.poller().is_some()
    }
}

impl<B: DeliveryBackend> Shared<B> {
    async fn poll_once(&self) -> Option<VerifyLocationResponse> {
        let error = self.tracker.error();
        let (visit, request) = {
            let mut session = self.synced_session();
            let request = session.poll_request(error.as_ref())?;
            (session.visit(), request)
        };

        match self.backend.verify_location(&request).await {
            Ok(response) => {
                tracing::debug!(
                    delivery_id = %request.delivery_id,
                    verified = response.verified,
                    distance = response.distance,
                    threshold = response.threshold,
                    "backend verification"
                );
                let mut session = self.session();
                if session.visit() != visit {
                    tracing::debug!(delivery_id = %request.delivery_id, "verdict from an earlier visit dropped");
                    return None;
                }
                session.apply_verification(response.clone());
                Some(response)
            }
            Err(e) => {
                tracing::warn!(delivery_id = %request.delivery_id, error = %e, "verification poll failed");
                None
            }
        }
    }

    fn stop(&self) {
        self.poller().take();
        self.tracker.stop_watching();
    }

    /// Session with the tracker's newest reading applied
    fn synced_session(&self) -> MutexGuard<'_, VerificationSession> {
        let reading = self.tracker.location();
        let mut session = self.session();
        if let Some(reading) = reading {
            if session.reading() != Some(reading) {
                session.observe(reading);
            }
        }
        session
    }

    fn session(&self) -> MutexGuard<'_, VerificationSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn poller(&self) -> MutexGuard<'_, Option<Task<()>>> {
        self.poller.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn poll_loop<B: DeliveryBackend>(shared: Weak<Shared<B>>, interval: Duration) {
    let mut ticks = smol::Timer::interval(interval);
    while ticks.next().await.is_some() {
        let Some(shared) = shared.upgrade() else {
            return;
        };
        shared.poll_once().await;
    }
}
