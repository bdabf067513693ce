//! API Client
//!
//! JSON client for the delivery backend: base URL, bearer auth and
//! status-to-error mapping on top of an [`HttpTransport`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::auth::{SessionInvalidated, TokenProvider};
use crate::loader::{HttpTransport, Request, ResourceLoader};
use crate::{NetError, Response};

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, including the API prefix
    pub base_url: String,
    /// Whole-request timeout
    pub request_timeout: Duration,
    /// User agent string
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            // Android emulator alias for the host's localhost
            base_url: "http://10.0.2.2:4000/api/v1".into(),
            request_timeout: Duration::from_secs(15),
            user_agent: format!("handoff/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Client builder
pub struct ApiClientBuilder {
    config: ClientConfig,
    tokens: Option<Arc<dyn TokenProvider>>,
    on_invalidated: Option<SessionInvalidated>,
}

impl ApiClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            tokens: None,
            on_invalidated: None,
        }
    }

    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    pub fn base_url(mut self, url: &str) -> Self {
        self.config.base_url = url.to_string();
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn user_agent(mut self, ua: &str) -> Self {
        self.config.user_agent = ua.to_string();
        self
    }

    pub fn token_provider(mut self, tokens: impl TokenProvider + 'static) -> Self {
        self.tokens = Some(Arc::new(tokens));
        self
    }

    pub fn on_session_invalidated(mut self, callback: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_invalidated = Some(Arc::new(callback));
        self
    }

    /// Build on top of a custom transport
    pub fn build_with<T: HttpTransport>(self, transport: T) -> Result<ApiClient<T>, NetError> {
        Url::parse(&self.config.base_url)
            .map_err(|e| NetError::InvalidUrl(format!("{}: {e}", self.config.base_url)))?;

        Ok(ApiClient {
            config: self.config,
            transport,
            tokens: self.tokens,
            on_invalidated: self.on_invalidated,
        })
    }

    /// Build with the default reqwest-backed transport
    pub fn build(self) -> Result<ApiClient<ResourceLoader>, NetError> {
        let transport = ResourceLoader::new(&self.config)?;
        self.build_with(transport)
    }
}

impl Default for ApiClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Backend API client
pub struct ApiClient<T = ResourceLoader> {
    config: ClientConfig,
    transport: T,
    tokens: Option<Arc<dyn TokenProvider>>,
    on_invalidated: Option<SessionInvalidated>,
}

impl ApiClient<ResourceLoader> {
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::new()
    }
}

impl<T: HttpTransport> ApiClient<T> {
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Build an absolute URL from path segments and optional query pairs.
    ///
    /// Segments are percent-encoded individually, so ids cannot escape
    /// their position in the path.
    pub fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Result<String, NetError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| NetError::InvalidUrl(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| NetError::InvalidUrl(self.config.base_url.clone()))?
            .pop_if_empty()
            .extend(segments);
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    pub async fn get_json<R: DeserializeOwned>(&self, url: String) -> Result<R, NetError> {
        self.execute(Request::get(url)).await
    }

    pub async fn post_json<B, R>(&self, url: String, body: &B) -> Result<R, NetError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(Request::post(url).with_json(body)?).await
    }

    pub async fn patch_json<B, R>(&self, url: String, body: &B) -> Result<R, NetError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.execute(Request::patch(url).with_json(body)?).await
    }

    async fn execute<R: DeserializeOwned>(&self, mut request: Request) -> Result<R, NetError> {
        request = request.with_header("Content-Type", "application/json");
        if let Some(token) = self.tokens.as_ref().and_then(|t| t.token()) {
            request = request.with_header("Authorization", &format!("Bearer {token}"));
        }

        let method = request.method;
        let url = request.url.clone();
        let response = self.transport.send(request).await.inspect_err(|e| {
            tracing::warn!(method = method.as_str(), %url, error = %e, "request failed");
        })?;

        if response.is_success() {
            return response.json();
        }

        if response.status == 401 {
            tracing::warn!(%url, "session rejected by backend");
            if let Some(callback) = &self.on_invalidated {
                callback();
            }
        }

        Err(NetError::Http {
            status: response.status,
            message: error_message(&response),
        })
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

fn error_message(response: &Response) -> String {
    serde_json::from_slice::<ErrorBody>(&response.body)
        .ok()
        .and_then(|body| body.message)
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| default_error_message(response.status).to_string())
}

/// Fallback message for a status without a backend-supplied one
pub fn default_error_message(status: u16) -> &'static str {
    match status {
        400 => "Invalid request. Please check your input.",
        401 => "Session expired. Please login again.",
        403 => "Access denied.",
        404 => "Resource not found.",
        409 => "Conflict. This action has already been completed.",
        500 => "Server error. Please try again later.",
        _ => "An error occurred. Please try again.",
    }
}
