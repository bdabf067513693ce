//! Edge case tests for handoff-location
//!
//! The acquisition machine on its own, then the tracker against a simulated
//! device: pre-flight short circuits, retries, watching and teardown.

use std::time::Duration;

use handoff_geo::{Coordinate, LocationReading};
use handoff_location::simulated::{FixedPermissions, SimulatedDevice, fix_at};
use handoff_location::*;
use smol::channel::Receiver;

const DROP_POINT: Coordinate = Coordinate {
    latitude: 12.9716,
    longitude: 77.5946,
};

fn fix(accuracy: f64) -> LocationReading {
    fix_at(DROP_POINT, accuracy)
}

/// Same retry shape as production, in milliseconds instead of seconds
fn fast_config() -> TrackerConfig {
    TrackerConfig {
        acquisition: AcquisitionConfig::default().with_retry_delays(vec![
            Duration::ZERO,
            Duration::from_millis(5),
            Duration::from_millis(10),
        ]),
        watch: WatchOptions::default(),
    }
}

fn tracker(sim: &SimulatedDevice) -> LocationTracker {
    LocationTracker::new(sim.device(), fast_config())
}

fn wait_for(rx: &Receiver<LocationSnapshot>, done: impl Fn(&LocationSnapshot) -> bool) -> LocationSnapshot {
    smol::block_on(async {
        loop {
            let next = smol::future::or(async { rx.recv().await.ok() }, async {
                smol::Timer::after(Duration::from_secs(2)).await;
                None
            })
            .await;
            let snapshot = next.expect("no matching snapshot within 2s");
            if done(&snapshot) {
                return snapshot;
            }
        }
    })
}

/// Drive the machine with canned sensor answers, recording scheduled delays
fn drive(machine: &mut AcquisitionMachine, fixes: &[f64]) -> (Vec<Duration>, Option<LocationReading>) {
    let mut delays = Vec::new();
    let mut fixes = fixes.iter();
    let mut effect = machine.step(Event::Start);

    while let Some(current) = effect {
        effect = match current {
            Effect::CheckNetwork => machine.step(Event::NetworkChecked(true)),
            Effect::RequestPermission => {
                machine.step(Event::PermissionResolved(PermissionDecision::Granted))
            }
            Effect::ScheduleAttempt { delay, .. } => {
                delays.push(delay);
                machine.step(Event::AttemptDue)
            }
            Effect::RequestPosition { .. } => {
                let accuracy = fixes.next().copied().expect("machine asked for too many fixes");
                machine.step(Event::PositionReceived(fix(accuracy)))
            }
            Effect::Resolve(reading) => return (delays, reading),
        };
    }
    panic!("machine stalled")
}

// ============================================================================
// ACQUISITION MACHINE
// ============================================================================

#[test]
fn test_machine_improving_accuracy() {
    let mut machine = AcquisitionMachine::new(AcquisitionConfig::default());
    let (delays, reading) = drive(&mut machine, &[80.0, 60.0, 30.0]);

    assert_eq!(
        delays,
        vec![Duration::ZERO, Duration::from_secs(5), Duration::from_secs(10)]
    );
    assert_eq!(reading.map(|r| r.accuracy_meters), Some(30.0));
    assert_eq!(machine.status(), AcquisitionStatus::Success);
    assert_eq!(machine.retry_count(), 2);
}

#[test]
fn test_machine_never_returns_coarse_fix() {
    let mut machine = AcquisitionMachine::new(AcquisitionConfig::default());
    let (delays, reading) = drive(&mut machine, &[80.0, 80.0, 80.0]);

    assert_eq!(delays.len(), 3);
    assert_eq!(reading, None);
    assert_eq!(machine.status(), AcquisitionStatus::Error);
    assert_eq!(machine.error().map(|e| e.kind), Some(ErrorKind::Accuracy));
    assert_eq!(machine.error().map(|e| e.title()), Some("Weak Signal"));
}

#[test]
fn test_machine_boundary_accuracy_accepted() {
    let mut machine = AcquisitionMachine::new(AcquisitionConfig::default());
    let (delays, reading) = drive(&mut machine, &[50.0]);
    assert_eq!(delays, vec![Duration::ZERO]);
    assert!(reading.is_some());
}

// ============================================================================
// ONE-SHOT FETCH
// ============================================================================

#[test]
fn test_fetch_retries_until_accurate() {
    let sim = SimulatedDevice::new(Platform::Android);
    for accuracy in [80.0, 60.0, 30.0] {
        sim.positions.push_fix(fix(accuracy));
    }
    let tracker = tracker(&sim);

    let reading = smol::block_on(tracker.fetch_location()).unwrap();
    assert_eq!(reading.accuracy_meters, 30.0);
    assert_eq!(sim.positions.requests(), 3);
    assert_eq!(tracker.status(), AcquisitionStatus::Success);
    assert_eq!(tracker.location(), Some(reading));
    assert!(!tracker.is_loading());

    let options = sim.positions.last_options().unwrap();
    assert!(options.enable_high_accuracy && options.force_fresh_fix && options.show_settings_dialog);
    assert_eq!(options.maximum_age, Duration::from_secs(10));
}

#[test]
fn test_fetch_rejects_persistently_coarse() {
    let sim = SimulatedDevice::new(Platform::Android);
    for _ in 0..3 {
        sim.positions.push_fix(fix(80.0));
    }
    let tracker = tracker(&sim);

    assert_eq!(smol::block_on(tracker.fetch_location()), None);
    assert_eq!(sim.positions.requests(), 3);
    assert_eq!(tracker.status(), AcquisitionStatus::Error);
    assert_eq!(tracker.error().map(|e| e.kind), Some(ErrorKind::Accuracy));
    assert_eq!(tracker.location(), None);
}

#[test]
fn test_offline_never_touches_gps() {
    let sim = SimulatedDevice::new(Platform::Android);
    sim.network.set_online(false);
    sim.positions.push_fix(fix(10.0));
    let tracker = tracker(&sim);

    assert_eq!(smol::block_on(tracker.fetch_location()), None);
    assert_eq!(tracker.status(), AcquisitionStatus::NetworkError);
    assert_eq!(tracker.error().map(|e| e.kind), Some(ErrorKind::Network));
    assert_eq!(sim.positions.requests(), 0);
    assert_eq!(sim.permissions.prompts() + sim.permissions.checks(), 0);
}

#[test]
fn test_permission_denied_no_attempts() {
    let sim = SimulatedDevice::new(Platform::Android)
        .with_permissions(FixedPermissions::new(PermissionState::Denied));
    sim.positions.push_fix(fix(10.0));
    let tracker = tracker(&sim);

    assert_eq!(smol::block_on(tracker.fetch_location()), None);
    assert_eq!(tracker.status(), AcquisitionStatus::PermissionDenied);
    let error = tracker.error().unwrap();
    assert_eq!(error.kind, ErrorKind::Permission);
    assert_eq!(error.message, "Location permission required to verify delivery.");
    assert_eq!(sim.positions.requests(), 0);
}

#[test]
fn test_timeouts_exhaust_to_timeout_status() {
    // Empty script: every request times out
    let sim = SimulatedDevice::new(Platform::Ios);
    let tracker = tracker(&sim);

    assert_eq!(smol::block_on(tracker.fetch_location()), None);
    assert_eq!(sim.positions.requests(), 3);
    assert_eq!(tracker.status(), AcquisitionStatus::Timeout);
    assert_eq!(tracker.error().map(|e| e.title()), Some("GPS Timeout"));
}

#[test]
fn test_concurrent_fetch_is_noop() {
    let sim = SimulatedDevice::new(Platform::Android);
    sim.positions.push_error(SensorError::new(SensorError::TIMEOUT, "slow"));
    sim.positions.push_fix(fix(20.0));
    let tracker = tracker(&sim);

    let (first, second) =
        smol::block_on(smol::future::zip(tracker.fetch_location(), tracker.fetch_location()));

    assert!(first.is_some());
    assert_eq!(second, None);
    assert_eq!(sim.positions.requests(), 2);
}

#[test]
fn test_clear_location_resets() {
    let sim = SimulatedDevice::new(Platform::Android);
    sim.positions.push_fix(fix(12.0));
    let tracker = tracker(&sim);
    tracker.set_target(Some(DROP_POINT));

    smol::block_on(tracker.fetch_location()).unwrap();
    assert_eq!(tracker.distance(), Some(0.0));

    tracker.clear_location();
    let snapshot = tracker.snapshot();
    assert_eq!(snapshot.status, AcquisitionStatus::Idle);
    assert_eq!(snapshot.location, None);
    assert_eq!(snapshot.error, None);
    assert_eq!(snapshot.distance, None);
}

// ============================================================================
// PERMISSION
// ============================================================================

#[test]
fn test_request_permission_restores_status() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    let rx = tracker.subscribe();

    assert!(smol::block_on(tracker.request_permission()));
    assert_eq!(sim.permissions.prompts(), 0);
    assert_eq!(tracker.status(), AcquisitionStatus::Idle);

    let prompting = rx.try_recv().unwrap();
    assert_eq!(prompting.status, AcquisitionStatus::RequestingPermission);
    assert!(prompting.is_loading);
}

#[test]
fn test_request_permission_denied_ios() {
    let sim = SimulatedDevice::new(Platform::Ios)
        .with_permissions(FixedPermissions::new(PermissionState::Denied));
    let tracker = tracker(&sim);

    assert!(!smol::block_on(tracker.request_permission()));
    assert_eq!(tracker.status(), AcquisitionStatus::PermissionDenied);
    assert_eq!(
        tracker.error().map(|e| e.message),
        Some("Permission denied. Enable location in settings.".to_string())
    );
}

#[test]
fn test_open_settings_per_platform() {
    let sim = SimulatedDevice::new(Platform::Android);
    tracker(&sim).open_settings();
    assert_eq!(sim.settings.opened(), vec!["android.settings.LOCATION_SOURCE_SETTINGS"]);

    let sim = SimulatedDevice::new(Platform::Ios);
    tracker(&sim).open_settings();
    assert_eq!(sim.settings.opened(), vec!["app-settings:"]);
}

// ============================================================================
// WATCHING
// ============================================================================

#[test]
fn test_double_start_single_subscription() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);

    smol::block_on(async {
        tracker.start_watching().await;
        tracker.start_watching().await;
    });

    assert!(tracker.is_watching());
    assert_eq!(sim.positions.watch_calls(), 1);
    assert_eq!(sim.positions.active_watches(), 1);
}

#[test]
fn test_watch_updates_distance() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    tracker.set_target(Some(DROP_POINT));
    smol::block_on(tracker.start_watching());
    let rx = tracker.subscribe();

    let north = Coordinate {
        latitude: DROP_POINT.latitude + 0.001,
        longitude: DROP_POINT.longitude,
    };
    assert_eq!(sim.positions.emit(Ok(fix_at(north, 8.0))), 1);

    let snapshot = wait_for(&rx, |s| s.location.is_some());
    let distance = snapshot.distance.unwrap();
    assert!((distance - 111.19).abs() < 1.0, "got {distance}");
    assert!(snapshot.is_watching);
}

#[test]
fn test_stop_watching_stops_updates() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    smol::block_on(tracker.start_watching());

    tracker.stop_watching();
    tracker.stop_watching();

    assert!(!tracker.is_watching());
    assert_eq!(sim.positions.active_watches(), 0);
    assert_eq!(sim.positions.emit(Ok(fix(5.0))), 0);
    assert_eq!(tracker.location(), None);
    assert_eq!(tracker.distance(), None);
}

#[test]
fn test_transient_error_keeps_watching() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    smol::block_on(tracker.start_watching());
    let rx = tracker.subscribe();

    sim.positions.emit(Err(SensorError::new(SensorError::TIMEOUT, "lost fix")));
    sim.positions.emit(Ok(fix(9.0)));

    let snapshot = wait_for(&rx, |s| s.location.is_some());
    assert!(snapshot.is_watching);
    assert_eq!(snapshot.error, None);
    assert_eq!(sim.positions.active_watches(), 1);
}

#[test]
fn test_revoked_permission_stops_watch() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    smol::block_on(tracker.start_watching());
    let rx = tracker.subscribe();

    sim.positions.emit(Err(SensorError::new(SensorError::PERMISSION_DENIED, "revoked")));

    let snapshot = wait_for(&rx, |s| s.status == AcquisitionStatus::PermissionDenied);
    assert!(!snapshot.is_watching);
    assert_eq!(snapshot.error.map(|e| e.kind), Some(ErrorKind::Permission));
    assert_eq!(sim.positions.active_watches(), 0);
}

#[test]
fn test_watch_requires_permission() {
    let sim = SimulatedDevice::new(Platform::Ios)
        .with_permissions(FixedPermissions::new(PermissionState::Restricted));
    let tracker = tracker(&sim);

    smol::block_on(tracker.start_watching());

    assert!(!tracker.is_watching());
    assert_eq!(sim.positions.watch_calls(), 0);
    assert_eq!(tracker.status(), AcquisitionStatus::PermissionDenied);
}

// ============================================================================
// TEARDOWN
// ============================================================================

#[test]
fn test_teardown_mid_fetch() {
    let sim = SimulatedDevice::new(Platform::Android);
    sim.positions.push_error(SensorError::new(SensorError::TIMEOUT, "slow"));
    sim.positions.push_fix(fix(10.0));
    let tracker = tracker(&sim);

    let (reading, ()) = smol::block_on(smol::future::zip(tracker.fetch_location(), async {
        smol::Timer::after(Duration::from_millis(1)).await;
        tracker.teardown();
    }));

    assert_eq!(reading, None);
    assert_eq!(sim.positions.requests(), 1);
    assert_eq!(tracker.location(), None);
    assert!(tracker.token().is_cancelled());

    // Nothing starts after teardown
    assert_eq!(smol::block_on(tracker.fetch_location()), None);
    assert_eq!(sim.positions.requests(), 1);
}

#[test]
fn test_teardown_releases_everything() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    let rx = tracker.subscribe();
    smol::block_on(tracker.start_watching());
    assert_eq!(sim.positions.active_watches(), 1);

    tracker.teardown();

    assert_eq!(sim.positions.active_watches(), 0);
    assert!(!tracker.is_watching());
    while rx.try_recv().is_ok() {}
    assert!(rx.is_closed());

    smol::block_on(tracker.start_watching());
    assert_eq!(sim.positions.watch_calls(), 1);
}

#[test]
fn test_dropping_tracker_clears_watch() {
    let sim = SimulatedDevice::new(Platform::Android);
    let tracker = tracker(&sim);
    smol::block_on(tracker.start_watching());

    drop(tracker);
    assert_eq!(sim.positions.active_watches(), 0);
}
