//! Acquisition status

/// Exactly one status is active at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AcquisitionStatus {
    #[default]
    Idle,
    RequestingPermission,
    PermissionDenied,
    Fetching,
    Success,
    Error,
    Timeout,
    GpsDisabled,
    NetworkError,
}

impl AcquisitionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingPermission => "requesting_permission",
            Self::PermissionDenied => "permission_denied",
            Self::Fetching => "fetching",
            Self::Success => "success",
            Self::Error => "error",
            Self::Timeout => "timeout",
            Self::GpsDisabled => "gps_disabled",
            Self::NetworkError => "network_error",
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self, Self::Fetching | Self::RequestingPermission)
    }
}
