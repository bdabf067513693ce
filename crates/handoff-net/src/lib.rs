//! Handoff Networking
//!
//! Delivery backend client and connectivity checks.

mod auth;
mod client;
pub mod connectivity;
pub mod delivery;
pub mod loader;

pub use auth::{SessionInvalidated, StaticToken, TokenProvider};
pub use client::{default_error_message, ApiClient, ApiClientBuilder, ClientConfig};
pub use connectivity::{Connectivity, NetworkGuard, NetworkState};
pub use delivery::DeliveryBackend;
pub use loader::{HttpTransport, Method, Request, ResourceLoader};
pub use url::Url;

/// HTTP Response
#[derive(Debug, Clone)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Response {
    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Get header value (case-insensitive)
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Decode the body as JSON; an empty body decodes as `null`
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        let body: &[u8] = if self.body.is_empty() { b"null" } else { &self.body };
        serde_json::from_slice(body).map_err(|e| NetError::Decode(e.to_string()))
    }

    /// Get body as text
    pub fn text(&self) -> Result<String, NetError> {
        String::from_utf8(self.body.clone()).map_err(|e| NetError::Decode(e.to_string()))
    }
}

/// Network error
///
/// `Http` is the typed API error: the backend answered, but not with 2xx.
/// Everything else means no usable answer arrived.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NetError {
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Malformed response: {0}")]
    Decode(String),
}

impl NetError {
    /// HTTP status, when the backend answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_auth_error(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_network_error(&self) -> bool {
        matches!(self, Self::Network(_))
    }

    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    /// Message suitable for showing to the courier
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { message, .. } => message.clone(),
            Self::Network(_) => "Network error. Please check your connection.".into(),
            Self::InvalidUrl(_) | Self::Decode(_) => "An unexpected error occurred.".into(),
        }
    }
}
