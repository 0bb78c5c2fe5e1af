pub mod middleware;

use crate::core::middleware::AuthMiddleware;
use reqwest::Client;
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;

/// Error body returned by the Google APIs (`{"error": {"code": .., "message": ..}}`)
/// or by the Realtime Database REST API (`{"error": "Permission denied"}`).
#[derive(Debug, Deserialize)]
pub struct FirebaseErrorResponse {
    pub error: FirebaseErrorBody,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum FirebaseErrorBody {
    Details(FirebaseErrorDetails),
    Message(String),
}

#[derive(Debug, Deserialize)]
pub struct FirebaseErrorDetails {
    pub code: u16,
    pub message: String,
    pub status: Option<String>,
    pub errors: Option<Vec<FirebaseSubError>>,
}

#[derive(Debug, Deserialize)]
pub struct FirebaseSubError {
    pub message: String,
    pub domain: Option<String>,
    pub reason: Option<String>,
}

impl FirebaseErrorResponse {
    pub fn display_message(&self) -> String {
        match &self.error {
            FirebaseErrorBody::Details(details) => {
                format!("{} (code: {})", details.message, details.code)
            }
            FirebaseErrorBody::Message(message) => message.clone(),
        }
    }
}

/// Turns a non-success response into a readable message, falling back to the
/// status line when the body is not a recognised error document.
pub async fn parse_error_response(response: reqwest::Response, default_msg: &str) -> String {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    match serde_json::from_str::<FirebaseErrorResponse>(&text) {
        Ok(error_resp) => format!("{} {}: {}", default_msg, status, error_resp.display_message()),
        Err(_) if text.is_empty() => format!("{}: {}", default_msg, status),
        Err(_) => format!("{} {}: {}", default_msg, status, text),
    }
}

/// Adds retries with exponential backoff for transient failures.
///
/// Only for idempotent requests: a retried POST may be applied twice.
pub(crate) fn with_retries(builder: ClientBuilder) -> ClientBuilder {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    builder.with(RetryTransientMiddleware::new_with_policy(retry_policy))
}

/// Builds the authenticated, retrying HTTP client shared by every service.
pub(crate) fn authorized_client(middleware: AuthMiddleware) -> ClientWithMiddleware {
    with_retries(ClientBuilder::new(Client::new()))
        .with(middleware)
        .build()
}
