use super::path::Path;
use super::query::QueryParams;
use crate::core::middleware::AuthMiddleware;
use crate::core::{parse_error_response, with_retries};
use async_trait::async_trait;
use reqwest::{header, Client};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

/// Failures reported by the transport that talks to the database.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("Service error: {0}")]
    ServiceError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

/// The remote operations a [`Reference`](super::Reference) or
/// [`Query`](super::Query) needs from the database service.
#[async_trait]
pub trait ApiClient: Send + Sync {
    /// Base URL of the database, used to render diagnostic URIs.
    fn base_url(&self) -> &Url;

    /// Reads the value at `path`. A missing location reads as `Value::Null`.
    async fn get(&self, path: &Path, params: &QueryParams) -> Result<Value, ApiError>;

    async fn set(&self, path: &Path, value: &Value) -> Result<(), ApiError>;

    async fn update(&self, path: &Path, values: &Map<String, Value>) -> Result<(), ApiError>;

    async fn remove(&self, path: &Path) -> Result<(), ApiError>;

    /// Writes `value` under a new, server-generated child key and returns that key.
    async fn push(&self, path: &Path, value: &Value) -> Result<String, ApiError>;
}

/// The URL identifying `path` inside the database at `base`.
pub fn location_url(base: &Url, path: &Path) -> Url {
    let mut url = base.clone();
    if !path.is_root() {
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(path.segments());
        }
    }
    url
}

// REST resources are addressed by appending `.json` to the location.
fn rest_url(base: &Url, path: &Path, params: Option<&QueryParams>) -> Url {
    let mut segments: Vec<String> = path.segments().map(str::to_string).collect();
    match segments.last_mut() {
        Some(last) => last.push_str(".json"),
        None => segments.push(".json".to_string()),
    }

    let mut url = base.clone();
    if let Ok(mut url_segments) = url.path_segments_mut() {
        url_segments.pop_if_empty().extend(&segments);
    }

    if let Some(params) = params {
        let pairs = params.to_query_pairs();
        if !pairs.is_empty() {
            url.query_pairs_mut().extend_pairs(pairs);
        }
    }

    url
}

#[derive(Deserialize)]
struct PushResponse {
    name: String,
}

/// [`ApiClient`] over the Realtime Database REST API.
///
/// Pushes are not idempotent, so they go through their own client, which
/// must not retry.
pub struct HttpApiClient {
    client: ClientWithMiddleware,
    push_client: ClientWithMiddleware,
    base_url: Url,
}

impl HttpApiClient {
    /// Uses `client` for every request, pushes included.
    pub fn new(client: ClientWithMiddleware, base_url: Url) -> Self {
        Self {
            push_client: client.clone(),
            client,
            base_url,
        }
    }

    /// Sends pushes through `client` instead.
    pub fn with_push_client(mut self, client: ClientWithMiddleware) -> Self {
        self.push_client = client;
        self
    }

    /// Authenticated transport: reads, sets, updates and removes are retried
    /// on transient failures, pushes are sent exactly once.
    pub fn authorized(middleware: AuthMiddleware, base_url: Url) -> Self {
        Self::layered(Some(middleware), base_url)
    }

    #[cfg(test)]
    pub(crate) fn unauthenticated(base_url: Url) -> Self {
        Self::layered(None, base_url)
    }

    fn layered(middleware: Option<AuthMiddleware>, base_url: Url) -> Self {
        let build = |builder: ClientBuilder| match &middleware {
            Some(middleware) => builder.with(middleware.clone()).build(),
            None => builder.build(),
        };

        let client = build(with_retries(ClientBuilder::new(Client::new())));
        let push_client = build(ClientBuilder::new(Client::new()));

        Self::new(client, base_url).with_push_client(push_client)
    }

    async fn check(response: reqwest::Response, context: &str) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let message = parse_error_response(response, context).await;
        warn!(%message, "database request failed");
        Err(ApiError::ServiceError(message))
    }
}

#[async_trait]
impl ApiClient for HttpApiClient {
    fn base_url(&self) -> &Url {
        &self.base_url
    }

    async fn get(&self, path: &Path, params: &QueryParams) -> Result<Value, ApiError> {
        let url = rest_url(&self.base_url, path, Some(params));
        debug!(%url, "GET");

        let response = self.client.get(url.as_str()).send().await?;
        let response = Self::check(response, "Get failed").await?;

        Ok(response.json().await?)
    }

    async fn set(&self, path: &Path, value: &Value) -> Result<(), ApiError> {
        let url = rest_url(&self.base_url, path, None);
        debug!(%url, "PUT");

        let response = self
            .client
            .put(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(value)?)
            .send()
            .await?;
        Self::check(response, "Set failed").await?;

        Ok(())
    }

    async fn update(&self, path: &Path, values: &Map<String, Value>) -> Result<(), ApiError> {
        let url = rest_url(&self.base_url, path, None);
        debug!(%url, "PATCH");

        let response = self
            .client
            .patch(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(values)?)
            .send()
            .await?;
        Self::check(response, "Update failed").await?;

        Ok(())
    }

    async fn remove(&self, path: &Path) -> Result<(), ApiError> {
        let url = rest_url(&self.base_url, path, None);
        debug!(%url, "DELETE");

        let response = self.client.delete(url.as_str()).send().await?;
        Self::check(response, "Remove failed").await?;

        Ok(())
    }

    async fn push(&self, path: &Path, value: &Value) -> Result<String, ApiError> {
        let url = rest_url(&self.base_url, path, None);
        debug!(%url, "POST");

        let response = self
            .push_client
            .post(url.as_str())
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(value)?)
            .send()
            .await?;
        let response = Self::check(response, "Push failed").await?;

        let pushed: PushResponse = response.json().await?;
        Ok(pushed.name)
    }
}
