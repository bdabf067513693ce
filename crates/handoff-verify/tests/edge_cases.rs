//! Edge case tests for handoff-verify
//!
//! The orchestrator against a simulated device and an in-memory backend.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use handoff_geo::Coordinate;
use handoff_location::simulated::{SimulatedDevice, fix_at};
use handoff_location::{
    Device, DeviceError, LocationTracker, PermissionProvider, PermissionState, Platform,
    TrackerConfig,
};
use handoff_net::delivery::*;
use handoff_net::{DeliveryBackend, NetError};
use handoff_verify::*;

const DROP_POINT: Coordinate = Coordinate {
    latitude: 12.9716,
    longitude: 77.5946,
};

#[derive(Default)]
struct FakeBackend {
    verdicts: Mutex<VecDeque<Result<VerifyLocationResponse, NetError>>>,
    completions: Mutex<VecDeque<Result<CompleteDeliveryResponse, NetError>>>,
    completed: Mutex<Vec<(String, CompleteDeliveryRequest)>>,
    verify_calls: AtomicUsize,
    // When set, verification answers wait for a message here
    hold: Mutex<Option<smol::channel::Receiver<()>>>,
}

impl FakeBackend {
    fn verdict(&self, verified: bool, distance: f64) {
        self.verdicts.lock().unwrap().push_back(Ok(VerifyLocationResponse {
            verified,
            distance,
            threshold: 50.0,
            message: String::new(),
            can_complete: verified,
        }));
    }

    fn completion(&self, result: Result<CompleteDeliveryResponse, NetError>) {
        self.completions.lock().unwrap().push_back(result);
    }

    fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    fn complete_calls(&self) -> usize {
        self.completed.lock().unwrap().len()
    }
}

#[async_trait]
impl DeliveryBackend for FakeBackend {
    async fn verify_location(&self, _request: &VerifyLocationRequest) -> Result<VerifyLocationResponse, NetError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().clone();
        if let Some(release) = hold {
            let _ = release.recv().await;
        }
        self.verdicts.lock().unwrap().pop_front().unwrap_or(Ok(VerifyLocationResponse {
            verified: false,
            distance: 500.0,
            threshold: 50.0,
            message: String::new(),
            can_complete: false,
        }))
    }

    async fn complete_delivery(
        &self,
        delivery_id: &str,
        request: &CompleteDeliveryRequest,
    ) -> Result<CompleteDeliveryResponse, NetError> {
        self.completed
            .lock()
            .unwrap()
            .push((delivery_id.to_string(), request.clone()));
        self.completions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(success(delivery_id)))
    }

    async fn update_status(&self, _id: &str, _status: DeliveryStatus) -> Result<serde_json::Value, NetError> {
        Ok(serde_json::Value::Null)
    }

    async fn nearby_deliveries(&self, _query: &NearbyDeliveriesQuery) -> Result<NearbyDeliveriesResponse, NetError> {
        Err(NetError::Network("not scripted".into()))
    }
}

fn success(delivery_id: &str) -> CompleteDeliveryResponse {
    CompleteDeliveryResponse {
        success: true,
        delivery_id: delivery_id.to_string(),
        completed_at: "2026-10-19T09:30:00Z".into(),
        verification_status: VerificationStatus::GpsVerified,
        notification_sent: true,
    }
}

/// iOS prompt that stays open until released
struct PendingPrompt {
    release: smol::channel::Receiver<()>,
    prompts: AtomicUsize,
}

#[async_trait]
impl PermissionProvider for PendingPrompt {
    async fn check(&self) -> Result<PermissionState, DeviceError> {
        Ok(PermissionState::Undetermined)
    }

    async fn request(&self) -> Result<PermissionState, DeviceError> {
        self.prompts.fetch_add(1, Ordering::SeqCst);
        let _ = self.release.recv().await;
        Ok(PermissionState::Granted)
    }
}

struct Harness {
    sim: SimulatedDevice,
    backend: Arc<FakeBackend>,
    orchestrator: VerificationOrchestrator<Arc<FakeBackend>>,
}

/// Poll period long enough that only explicit `poll_once` calls reach the backend
fn harness(poll_interval: Duration) -> Harness {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = LocationTracker::new(sim.device(), TrackerConfig::default());
    let backend = Arc::new(FakeBackend::default());
    let config = VerificationConfig {
        poll_interval,
        ..VerificationConfig::default()
    };
    let orchestrator =
        VerificationOrchestrator::new(backend.clone(), tracker, "d-42", Some(DROP_POINT), config);
    Harness {
        sim,
        backend,
        orchestrator,
    }
}

impl Harness {
    fn enter(&self) {
        smol::block_on(self.orchestrator.enter());
    }

    /// Emit a fix and wait until the tracker holds it
    fn arrive(&self, accuracy: f64) {
        let rx = self.orchestrator.tracker().subscribe();
        assert_eq!(self.sim.positions.emit(Ok(fix_at(DROP_POINT, accuracy))), 1);
        smol::block_on(async {
            let wait = async {
                while let Ok(snapshot) = rx.recv().await {
                    if snapshot.location.is_some() {
                        return true;
                    }
                }
                false
            };
            let timeout = async {
                smol::Timer::after(Duration::from_secs(2)).await;
                false
            };
            assert!(smol::future::or(wait, timeout).await, "fix never reached the tracker");
        });
    }
}

fn eventually(mut done: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(2);
    while Instant::now() < deadline {
        if done() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

const MANUAL: Duration = Duration::from_secs(3600);

// ============================================================================
// GATING
// ============================================================================

#[test]
fn test_local_proximity_alone_never_completes() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(5.0);
    h.backend.verdict(false, 60.0);

    assert!(smol::block_on(h.orchestrator.poll_once()).is_some());
    let snapshot = h.orchestrator.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::BackendUnverified);
    assert!(!snapshot.can_complete);

    let result = smol::block_on(h.orchestrator.complete(None));
    assert!(matches!(result, Err(VerifyError::NotVerified)));
    assert_eq!(h.backend.complete_calls(), 0);
}

#[test]
fn test_no_completion_before_any_verdict() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(5.0);

    assert!(matches!(
        smol::block_on(h.orchestrator.complete(None)),
        Err(VerifyError::NotVerified)
    ));
    assert_eq!(h.backend.complete_calls(), 0);
}

#[test]
fn test_verified_completion() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(8.0);
    h.backend.verdict(true, 4.0);

    smol::block_on(h.orchestrator.poll_once()).unwrap();
    assert!(h.orchestrator.snapshot().can_complete);

    let response = smol::block_on(h.orchestrator.complete(Some("Left at door".into()))).unwrap();
    assert_eq!(response.verification_status, VerificationStatus::GpsVerified);

    let (delivery_id, request) = h.backend.completed.lock().unwrap()[0].clone();
    assert_eq!(delivery_id, "d-42");
    assert_eq!(request.completion_latitude, DROP_POINT.latitude);
    assert_eq!(request.notes.as_deref(), Some("Left at door"));

    assert_eq!(h.orchestrator.snapshot().phase, SessionPhase::Completed);
    assert!(!h.orchestrator.is_polling());
    assert!(!h.orchestrator.tracker().is_watching());
    assert!(matches!(
        smol::block_on(h.orchestrator.complete(None)),
        Err(VerifyError::AlreadyCompleted)
    ));
}

#[test]
fn test_completed_delivery_stays_idle_on_reenter() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(8.0);
    h.backend.verdict(true, 4.0);
    smol::block_on(h.orchestrator.poll_once()).unwrap();
    smol::block_on(h.orchestrator.complete(None)).unwrap();

    h.orchestrator.leave();
    h.enter();

    assert_eq!(h.orchestrator.snapshot().phase, SessionPhase::Completed);
    assert!(!h.orchestrator.is_polling());
    assert!(!h.orchestrator.tracker().is_watching());
    assert_eq!(h.sim.positions.watch_calls(), 1);
}

#[test]
fn test_failed_completion_allows_retry() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(8.0);
    h.backend.verdict(true, 4.0);
    smol::block_on(h.orchestrator.poll_once()).unwrap();

    h.backend.completion(Err(NetError::Network("reset by peer".into())));
    let first = smol::block_on(h.orchestrator.complete(None));
    assert!(matches!(first, Err(VerifyError::Net(_))));

    let snapshot = h.orchestrator.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::CompletionFailed);
    assert!(snapshot.verified);
    assert!(snapshot.can_complete);
    assert_eq!(
        snapshot.last_error.as_deref(),
        Some("Network error. Please check your connection.")
    );

    assert!(smol::block_on(h.orchestrator.complete(None)).is_ok());
    assert_eq!(h.backend.complete_calls(), 2);
}

// ============================================================================
// POLLING
// ============================================================================

#[test]
fn test_coarse_fix_not_sent() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(150.0);

    assert!(smol::block_on(h.orchestrator.poll_once()).is_none());
    assert_eq!(h.backend.verify_calls(), 0);
}

#[test]
fn test_poll_failure_is_ignored() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(10.0);
    h.backend
        .verdicts
        .lock()
        .unwrap()
        .push_back(Err(NetError::Network("offline".into())));

    assert!(smol::block_on(h.orchestrator.poll_once()).is_none());
    assert_eq!(h.backend.verify_calls(), 1);
    assert_eq!(h.orchestrator.snapshot().phase, SessionPhase::Watching);
}

#[test]
fn test_timer_polls_until_leave() {
    let h = harness(Duration::from_millis(10));
    h.enter();
    h.arrive(10.0);

    assert!(eventually(|| h.backend.verify_calls() >= 2));

    h.orchestrator.leave();
    assert!(!h.orchestrator.is_polling());
    assert!(!h.orchestrator.tracker().is_watching());
    assert_eq!(h.sim.positions.active_watches(), 0);

    std::thread::sleep(Duration::from_millis(20));
    let settled = h.backend.verify_calls();
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(h.backend.verify_calls(), settled);
}

#[test]
fn test_reenter_keeps_one_watch() {
    let h = harness(MANUAL);
    h.enter();
    h.enter();

    assert!(h.orchestrator.is_polling());
    assert_eq!(h.sim.positions.watch_calls(), 1);
    assert_eq!(h.sim.positions.active_watches(), 1);
    assert_eq!(h.orchestrator.snapshot().phase, SessionPhase::Watching);
}

#[test]
fn test_leave_while_prompt_open_starts_no_timer() {
    let sim = SimulatedDevice::new(Platform::Ios);
    let (release, pending) = smol::channel::bounded(1);
    let prompt = Arc::new(PendingPrompt {
        release: pending,
        prompts: AtomicUsize::new(0),
    });
    let device = Device {
        platform: Platform::Ios,
        permissions: prompt.clone(),
        positions: sim.positions.clone(),
        network: sim.network.clone(),
        settings: sim.settings.clone(),
    };
    let tracker = LocationTracker::new(device, TrackerConfig::default());
    let backend = Arc::new(FakeBackend::default());
    let config = VerificationConfig {
        poll_interval: Duration::from_millis(10),
        ..VerificationConfig::default()
    };
    let orchestrator = VerificationOrchestrator::new(backend.clone(), tracker, "d-42", Some(DROP_POINT), config);

    let entering = smol::spawn({
        let orchestrator = orchestrator.clone();
        async move { orchestrator.enter().await }
    });
    assert!(eventually(|| prompt.prompts.load(Ordering::SeqCst) == 1));

    orchestrator.leave();
    release.try_send(()).unwrap();
    smol::block_on(entering);

    assert!(!orchestrator.is_polling());
    assert!(!orchestrator.tracker().is_watching());
    assert_eq!(orchestrator.snapshot().phase, SessionPhase::Idle);
    assert_eq!(sim.positions.active_watches(), 0);

    std::thread::sleep(Duration::from_millis(50));
    assert_eq!(backend.verify_calls(), 0);
}

#[test]
fn test_verdict_from_previous_visit_is_dropped() {
    let h = harness(MANUAL);
    h.enter();
    h.arrive(8.0);

    let (release, held) = smol::channel::bounded(1);
    *h.backend.hold.lock().unwrap() = Some(held);
    h.backend.verdict(true, 4.0);

    let polling = smol::spawn({
        let orchestrator = h.orchestrator.clone();
        async move { orchestrator.poll_once().await }
    });
    assert!(eventually(|| h.backend.verify_calls() == 1));

    h.orchestrator.leave();
    h.enter();
    release.try_send(()).unwrap();

    assert!(smol::block_on(polling).is_none());
    let snapshot = h.orchestrator.snapshot();
    assert_eq!(snapshot.phase, SessionPhase::Watching);
    assert!(!snapshot.verified);
    assert!(!snapshot.can_complete);
}
