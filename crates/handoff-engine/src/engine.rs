//! Engine - Main entry point

use std::sync::Arc;

use handoff_geo::Coordinate;
use handoff_geo::navigation::{Destination, directions_url};
use handoff_location::{Device, LocationTracker};
use handoff_net::delivery::{DeliveryStatus, NearbyDeliveriesQuery, NearbyDeliveriesResponse, NearbyDelivery};
use handoff_net::{ApiClient, ApiClientBuilder, DeliveryBackend, NetError, TokenProvider};
use handoff_verify::{VerificationOrchestrator, VerifyError};

use crate::Config;
use crate::config::ConfigError;

/// The Handoff engine
///
/// Owns the backend client and the device services, and hands out a fresh
/// tracker or verification flow per screen.
pub struct Engine<B = ApiClient> {
    config: Config,
    device: Device,
    backend: Arc<B>,
}

impl Engine<ApiClient> {
    /// Create an engine talking to the configured backend
    pub fn connect(
        config: Config,
        device: Device,
        tokens: impl TokenProvider + 'static,
        on_session_invalidated: impl Fn() + Send + Sync + 'static,
    ) -> Result<Self, EngineError> {
        let client = ApiClientBuilder::new()
            .config(config.api.clone())
            .token_provider(tokens)
            .on_session_invalidated(on_session_invalidated)
            .build()?;
        Ok(Self::with_backend(config, device, client))
    }
}

impl<B: DeliveryBackend + 'static> Engine<B> {
    pub fn with_backend(config: Config, device: Device, backend: B) -> Self {
        tracing::info!(
            version = crate::VERSION,
            base_url = %config.api.base_url,
            platform = ?device.platform,
            "handoff engine initialized"
        );
        Self {
            config,
            device,
            backend: Arc::new(backend),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Location state for a new screen
    pub fn tracker(&self) -> LocationTracker {
        LocationTracker::new(self.device.clone(), self.config.tracker.clone())
    }

    /// Verification flow for one delivery, with its own tracker
    pub fn verification(
        &self,
        delivery_id: &str,
        target: Option<Coordinate>,
    ) -> VerificationOrchestrator<Arc<B>> {
        VerificationOrchestrator::new(
            self.backend.clone(),
            self.tracker(),
            delivery_id,
            target,
            self.config.verification.clone(),
        )
    }

    /// Deliveries around `position`, nearest first as the backend orders them
    pub async fn nearby_deliveries(
        &self,
        position: Coordinate,
        limit: Option<u32>,
    ) -> Result<NearbyDeliveriesResponse, EngineError> {
        let query = NearbyDeliveriesQuery {
            limit,
            ..NearbyDeliveriesQuery::new(position.latitude, position.longitude)
        };
        let response = self.backend.nearby_deliveries(&query).await?;
        tracing::debug!(
            count = response.total_count,
            radius = response.search_radius,
            "nearby deliveries"
        );
        Ok(response)
    }

    pub async fn update_status(&self, delivery_id: &str, status: DeliveryStatus) -> Result<(), EngineError> {
        self.backend.update_status(delivery_id, status).await?;
        tracing::info!(delivery_id, status = status.as_str(), "delivery status updated");
        Ok(())
    }
}

/// Where a delivery is, if the backend gave a usable coordinate
pub fn delivery_target(delivery: &NearbyDelivery) -> Option<Coordinate> {
    let (latitude, longitude) = (delivery.address.lat?, delivery.address.lng?);
    Coordinate::new(latitude, longitude)
        .ok()
        .filter(|c| !c.is_null_island())
}

/// External maps directions to a delivery
pub fn navigation_url(delivery: &NearbyDelivery) -> String {
    directions_url(Destination::resolve(delivery_target(delivery), &delivery.address.street))
}

/// Engine error
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Network error: {0}")]
    Network(#[from] NetError),

    #[error("Verification error: {0}")]
    Verify(#[from] VerifyError),
}
