//! Handoff Simulator
//!
//! Walks a simulated courier from a pickup point to a drop point and runs
//! the full verification flow against an in-process backend.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use handoff_engine::geo::{self, Coordinate};
use handoff_engine::location::Platform;
use handoff_engine::location::simulated::{SimulatedDevice, fix_at, walk};
use handoff_engine::net::delivery::*;
use handoff_engine::net::{DeliveryBackend, NetError};
use handoff_engine::{Config, Engine, delivery_target, navigation_url};
use tracing_subscriber::EnvFilter;

const PICKUP: Coordinate = Coordinate {
    latitude: 12.9816,
    longitude: 77.5946,
};

const DROP_POINT: Coordinate = Coordinate {
    latitude: 12.9716,
    longitude: 77.5946,
};

const WALK_STEPS: usize = 12;

/// Backend that judges distance itself, like the real one
struct SimBackend {
    threshold_meters: f64,
}

impl SimBackend {
    fn new(threshold_meters: f64) -> Self {
        Self { threshold_meters }
    }

    fn position(latitude: f64, longitude: f64) -> Result<Coordinate, NetError> {
        Coordinate::new(latitude, longitude).map_err(|e| NetError::Http {
            status: 400,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl DeliveryBackend for SimBackend {
    async fn verify_location(
        &self,
        request: &VerifyLocationRequest,
    ) -> Result<VerifyLocationResponse, NetError> {
        let position = Self::position(request.current_latitude, request.current_longitude)?;
        let distance = geo::distance(position, DROP_POINT);
        let verified = distance <= self.threshold_meters;
        tracing::debug!(distance, verified, "sim backend verification");

        Ok(VerifyLocationResponse {
            verified,
            distance,
            threshold: self.threshold_meters,
            message: if verified { "Within range" } else { "Too far" }.into(),
            can_complete: verified,
        })
    }

    async fn complete_delivery(
        &self,
        delivery_id: &str,
        request: &CompleteDeliveryRequest,
    ) -> Result<CompleteDeliveryResponse, NetError> {
        let position = Self::position(request.completion_latitude, request.completion_longitude)?;
        if geo::distance(position, DROP_POINT) > self.threshold_meters {
            return Err(NetError::Http {
                status: 422,
                message: "You are too far from the delivery location".into(),
            });
        }
        Ok(CompleteDeliveryResponse {
            success: true,
            delivery_id: delivery_id.to_string(),
            completed_at: request.completed_at.to_rfc3339(),
            verification_status: VerificationStatus::GpsVerified,
            notification_sent: true,
        })
    }

    async fn update_status(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<serde_json::Value, NetError> {
        Ok(serde_json::json!({ "id": delivery_id, "status": status.as_str() }))
    }

    async fn nearby_deliveries(
        &self,
        query: &NearbyDeliveriesQuery,
    ) -> Result<NearbyDeliveriesResponse, NetError> {
        let position = Self::position(query.latitude, query.longitude)?;
        let delivery: NearbyDelivery = serde_json::from_value(serde_json::json!({
            "id": "sim-001",
            "customerName": "Asha Rao",
            "customerPhone": "+91 98450 00000",
            "address": {
                "street": "12 MG Road, Bengaluru",
                "lat": DROP_POINT.latitude,
                "lng": DROP_POINT.longitude,
                "pincode": "560001"
            },
            "distance": geo::distance(position, DROP_POINT),
            "estimatedTime": 8,
            "mealType": "LUNCH",
            "mealName": "Veg Thali",
            "planName": "Monthly",
            "priority": "NORMAL",
            "status": "READY_TO_DISPATCH",
            "mealDate": chrono::Utc::now().format("%Y-%m-%d").to_string()
        }))
        .map_err(|e| NetError::Decode(e.to_string()))?;

        Ok(NearbyDeliveriesResponse {
            deliveries: vec![delivery],
            total_count: 1,
            search_radius: query.max_distance.unwrap_or(5_000.0),
        })
    }
}

fn main() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let mut config = Config::from_env().context("reading HANDOFF_* configuration")?;
    if std::env::var_os("HANDOFF_POLL_INTERVAL_MS").is_none() {
        config.verification.poll_interval = Duration::from_millis(250);
    }
    config.tracker.acquisition.retry_delays = vec![
        Duration::ZERO,
        Duration::from_millis(200),
        Duration::from_millis(400),
    ];

    let sim = SimulatedDevice::new(Platform::Android);
    let backend = SimBackend::new(config.verification.radius_meters);
    let engine = Engine::with_backend(config, sim.device(), backend);

    smol::block_on(run(&engine, &sim))
}

async fn run(engine: &Engine<SimBackend>, sim: &SimulatedDevice) -> anyhow::Result<()> {
    let nearby = engine.nearby_deliveries(PICKUP, Some(5)).await?;
    let delivery = nearby
        .deliveries
        .first()
        .ok_or_else(|| anyhow!("no deliveries nearby"))?;
    tracing::info!(
        delivery_id = %delivery.id,
        customer = %delivery.customer_name,
        distance = %geo::format_distance(delivery.distance),
        directions = %navigation_url(delivery),
        "picked delivery"
    );
    engine.update_status(&delivery.id, DeliveryStatus::HandedOver).await?;

    // One-shot fix at pickup; the first one is too coarse
    sim.positions.push_fix(fix_at(PICKUP, 85.0));
    sim.positions.push_fix(fix_at(PICKUP, 18.0));
    let tracker = engine.tracker();
    let fix = tracker
        .fetch_location()
        .await
        .ok_or_else(|| anyhow!("no GPS fix: {:?}", tracker.error()))?;
    tracing::info!(accuracy = fix.accuracy_meters, "pickup fix");
    tracker.teardown();

    let verify = engine.verification(&delivery.id, delivery_target(delivery));
    let poll = engine.config().verification.poll_interval;
    verify.enter().await;

    for point in walk(PICKUP, DROP_POINT, WALK_STEPS) {
        sim.positions.emit(Ok(fix_at(point, 12.0)));
        smol::Timer::after(poll + poll / 2).await;

        let snapshot = verify.snapshot();
        tracing::info!(
            distance = snapshot.distance_meters.map(geo::format_distance).unwrap_or_default(),
            band = snapshot.band.map(|b| b.as_str()).unwrap_or("-"),
            verified = snapshot.verified,
            "courier moved"
        );
        if snapshot.can_complete {
            break;
        }
    }

    let outcome = verify.complete(Some("Handed to customer".into())).await;
    verify.leave();
    let response = outcome?;
    tracing::info!(
        delivery_id = %response.delivery_id,
        completed_at = %response.completed_at,
        status = ?response.verification_status,
        "delivery complete"
    );
    Ok(())
}
