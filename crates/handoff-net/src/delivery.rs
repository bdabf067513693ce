//! Delivery API
//!
//! Typed endpoints for GPS-based delivery verification.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use handoff_geo::format_distance;
use serde::{Deserialize, Serialize};

use crate::client::ApiClient;
use crate::loader::HttpTransport;
use crate::NetError;

// ============================================================================
// Enums
// ============================================================================

/// How a completed delivery was verified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    GpsVerified,
    ManualOverride,
    Pending,
}

/// Delivery lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryStatus {
    Pending,
    Preparing,
    ReadyToDispatch,
    HandedOver,
    Delivered,
    Cancelled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Preparing => "PREPARING",
            Self::ReadyToDispatch => "READY_TO_DISPATCH",
            Self::HandedOver => "HANDED_OVER",
            Self::Delivered => "DELIVERED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Normal,
    Urgent,
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLocationRequest {
    pub delivery_id: String,
    pub current_latitude: f64,
    pub current_longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteDeliveryRequest {
    pub completion_latitude: f64,
    pub completion_longitude: f64,
    pub completed_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
struct UpdateStatusRequest {
    status: DeliveryStatus,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct NearbyDeliveriesQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub max_distance: Option<f64>,
    pub status: Option<DeliveryStatus>,
    pub limit: Option<u32>,
}

impl NearbyDeliveriesQuery {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            ..Default::default()
        }
    }

    /// Query pairs; unset options are left out entirely
    pub fn pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![
            ("latitude", self.latitude.to_string()),
            ("longitude", self.longitude.to_string()),
        ];
        if let Some(max) = self.max_distance {
            pairs.push(("maxDistance", max.to_string()));
        }
        if let Some(status) = self.status {
            pairs.push(("status", status.as_str().to_string()));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit", limit.to_string()));
        }
        pairs
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLocationResponse {
    pub verified: bool,
    pub distance: f64,
    pub threshold: f64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub can_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteDeliveryResponse {
    pub success: bool,
    pub delivery_id: String,
    pub completed_at: String,
    pub verification_status: VerificationStatus,
    #[serde(default)]
    pub notification_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeliveryAddress {
    pub street: String,
    pub details: Option<String>,
    pub lat: Option<f64>,
    pub lng: Option<f64>,
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDelivery {
    pub id: String,
    pub customer_name: String,
    pub customer_phone: String,
    pub address: DeliveryAddress,
    pub distance: f64,
    pub estimated_time: f64,
    pub meal_type: String,
    pub meal_name: String,
    pub plan_name: String,
    pub priority: Priority,
    pub status: DeliveryStatus,
    pub meal_date: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyDeliveriesResponse {
    pub deliveries: Vec<NearbyDelivery>,
    pub total_count: u32,
    pub search_radius: f64,
}

// ============================================================================
// Backend
// ============================================================================

/// The delivery endpoints the verification flow depends on
#[async_trait]
pub trait DeliveryBackend: Send + Sync {
    /// `POST /vendor/delivery/verify-location`
    async fn verify_location(
        &self,
        request: &VerifyLocationRequest,
    ) -> Result<VerifyLocationResponse, NetError>;

    /// `POST /vendor/delivery/{id}/complete`
    async fn complete_delivery(
        &self,
        delivery_id: &str,
        request: &CompleteDeliveryRequest,
    ) -> Result<CompleteDeliveryResponse, NetError>;

    /// `PATCH /vendor/delivery/{id}/status`, acknowledged with an opaque body
    async fn update_status(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<serde_json::Value, NetError>;

    /// `GET /vendor/delivery/nearby`
    async fn nearby_deliveries(
        &self,
        query: &NearbyDeliveriesQuery,
    ) -> Result<NearbyDeliveriesResponse, NetError>;
}

#[async_trait]
impl<T: HttpTransport> DeliveryBackend for ApiClient<T> {
    async fn verify_location(
        &self,
        request: &VerifyLocationRequest,
    ) -> Result<VerifyLocationResponse, NetError> {
        let url = self.endpoint(&["vendor", "delivery", "verify-location"], &[])?;
        self.post_json(url, request).await
    }

    async fn complete_delivery(
        &self,
        delivery_id: &str,
        request: &CompleteDeliveryRequest,
    ) -> Result<CompleteDeliveryResponse, NetError> {
        let url = self.endpoint(&["vendor", "delivery", delivery_id, "complete"], &[])?;
        self.post_json(url, request).await
    }

    async fn update_status(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<serde_json::Value, NetError> {
        let url = self.endpoint(&["vendor", "delivery", delivery_id, "status"], &[])?;
        self.patch_json(url, &UpdateStatusRequest { status }).await
    }

    async fn nearby_deliveries(
        &self,
        query: &NearbyDeliveriesQuery,
    ) -> Result<NearbyDeliveriesResponse, NetError> {
        let pairs = query.pairs();
        let url = self.endpoint(&["vendor", "delivery", "nearby"], &pairs)?;
        self.get_json(url).await
    }
}

#[async_trait]
impl<B: DeliveryBackend + ?Sized> DeliveryBackend for Arc<B> {
    async fn verify_location(
        &self,
        request: &VerifyLocationRequest,
    ) -> Result<VerifyLocationResponse, NetError> {
        (**self).verify_location(request).await
    }

    async fn complete_delivery(
        &self,
        delivery_id: &str,
        request: &CompleteDeliveryRequest,
    ) -> Result<CompleteDeliveryResponse, NetError> {
        (**self).complete_delivery(delivery_id, request).await
    }

    async fn update_status(
        &self,
        delivery_id: &str,
        status: DeliveryStatus,
    ) -> Result<serde_json::Value, NetError> {
        (**self).update_status(delivery_id, status).await
    }

    async fn nearby_deliveries(
        &self,
        query: &NearbyDeliveriesQuery,
    ) -> Result<NearbyDeliveriesResponse, NetError> {
        (**self).nearby_deliveries(query).await
    }
}

/// Courier-facing summary of a verification answer
pub fn verification_message(response: &VerifyLocationResponse) -> String {
    if response.verified {
        "Location verified! You can complete the delivery.".to_string()
    } else {
        format!(
            "You are {} away. Get closer to verify.",
            format_distance(response.distance)
        )
    }
}
