//! Permission Gate
//!
//! Asks the OS for precise location. Failure is a value, never an error the
//! caller has to propagate.

use std::sync::Arc;

use crate::device::{DeviceError, PermissionProvider, PermissionState, Platform};
use crate::error::AcquisitionError;

/// How a platform grants runtime location permission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionFlow {
    /// One prompt; denied and restricted both fail
    SinglePrompt,
    /// Check first, prompt only when not yet granted
    CheckThenRequest,
}

impl PermissionFlow {
    pub fn for_platform(platform: Platform) -> Self {
        match platform {
            Platform::Ios => Self::SinglePrompt,
            Platform::Android => Self::CheckThenRequest,
        }
    }

    fn denial_message(&self) -> &'static str {
        match self {
            Self::SinglePrompt => "Permission denied. Enable location in settings.",
            Self::CheckThenRequest => "Location permission required to verify delivery.",
        }
    }
}

/// Outcome of a permission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionDecision {
    Granted,
    Denied(AcquisitionError),
}

impl PermissionDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted)
    }
}

/// Platform-aware permission request
#[derive(Clone)]
pub struct PermissionGate {
    flow: PermissionFlow,
    provider: Arc<dyn PermissionProvider>,
}

impl PermissionGate {
    pub fn new(platform: Platform, provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            flow: PermissionFlow::for_platform(platform),
            provider,
        }
    }

    pub fn flow(&self) -> PermissionFlow {
        self.flow
    }

    pub async fn request(&self) -> PermissionDecision {
        match self.resolve().await {
            Ok(state) if state.is_granted() => PermissionDecision::Granted,
            Ok(state) => {
                tracing::info!(?state, "location permission denied");
                PermissionDecision::Denied(AcquisitionError::permission(self.flow.denial_message()))
            }
            Err(e) => {
                tracing::warn!(error = %e, "permission request error");
                PermissionDecision::Denied(AcquisitionError::permission("Failed to request permission."))
            }
        }
    }

    async fn resolve(&self) -> Result<PermissionState, DeviceError> {
        if self.flow == PermissionFlow::CheckThenRequest
            && self.provider.check().await?.is_granted()
        {
            return Ok(PermissionState::Granted);
        }
        self.provider.request().await
    }
}
