//! Firefly III REST API client
//!
//! Issues authenticated JSON requests against `<base_url>/api/v1/` and maps
//! every failure into an `UpstreamError` the HTTP layer knows how to render.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode};
use serde_json::{json, Value};
use std::time::Duration;
use thiserror::Error;

use crate::config::{ConfigurationError, SettingsResolver};

/// Timeout applied to every Firefly III request
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Message returned when Firefly III cannot be reached
pub const TRANSPORT_MESSAGE: &str = "Unable to connect to Firefly III.";

/// Message returned when Firefly III answers with something that is not JSON
pub const MALFORMED_MESSAGE: &str = "Invalid response from Firefly III.";

/// Query parameters; `None` values are not sent
pub type Params<'a> = [(&'a str, Option<&'a str>)];

/// Errors that can occur when calling Firefly III
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Base URL or access token is not configured
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The request never got an HTTP response
    #[error("Unable to connect to Firefly III: {details}")]
    Transport { details: String },

    /// Firefly III answered with a non-2xx status
    #[error("Firefly III responded with {status}")]
    Status { status: StatusCode, body: Value },

    /// Firefly III answered 2xx with a body that is not JSON
    #[error("Invalid response from Firefly III.")]
    Malformed,
}

impl UpstreamError {
    /// Whether this is a failed fetch that a cached copy may stand in for
    ///
    /// Configuration errors are not: no request could be made at all.
    pub fn is_fetch_failure(&self) -> bool {
        !matches!(self, UpstreamError::Configuration(_))
    }
}

/// Something that answers Firefly III API requests
#[async_trait]
pub trait Upstream: Send + Sync {
    /// Sends `method path` with optional query parameters and JSON body
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params<'_>,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError>;
}

/// Client for the Firefly III REST API
#[derive(Debug, Clone)]
pub struct FireflyClient {
    http_client: Client,
    settings: SettingsResolver,
}

impl FireflyClient {
    /// Creates a client with the default request timeout
    pub fn new(settings: SettingsResolver) -> Result<Self, reqwest::Error> {
        let http_client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self::with_client(http_client, settings))
    }

    /// Creates a client with a custom HTTP client
    pub fn with_client(http_client: Client, settings: SettingsResolver) -> Self {
        Self {
            http_client,
            settings,
        }
    }

    /// Builds the full API URL for `path` from the configured base URL
    pub fn url(&self, path: &str) -> Result<String, ConfigurationError> {
        let base_url = self.settings.base_url()?;
        Ok(api_url(&base_url, path))
    }
}

#[async_trait]
impl Upstream for FireflyClient {
    async fn request(
        &self,
        method: Method,
        path: &str,
        params: &Params<'_>,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let url = self.url(path)?;
        let token = self.settings.access_token()?;

        let query: Vec<(&str, &str)> = params
            .iter()
            .filter_map(|(key, value)| value.map(|value| (*key, value)))
            .collect();

        let mut builder = self
            .http_client
            .request(method.clone(), &url)
            .bearer_auth(token)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json");
        if !query.is_empty() {
            builder = builder.query(&query);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }

        tracing::debug!(%method, %url, "firefly request");
        let response = builder.send().await.map_err(transport_error)?;
        let status = response.status();
        let text = response.text().await.map_err(transport_error)?;

        if !status.is_success() {
            tracing::debug!(%method, %url, %status, "firefly request rejected");
            let body = serde_json::from_str(&text).unwrap_or_else(|_| json!({ "message": text }));
            return Err(UpstreamError::Status { status, body });
        }

        serde_json::from_str(&text).map_err(|_| UpstreamError::Malformed)
    }
}

/// Joins the base URL and an API path, tolerating stray slashes on either side
pub fn api_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/api/v1/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn transport_error(err: reqwest::Error) -> UpstreamError {
    UpstreamError::Transport {
        details: err.to_string(),
    }
}
