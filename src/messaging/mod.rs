//! Firebase Cloud Messaging module.
//!
//! Sends messages through the FCM HTTP v1 API and manages topic
//! subscriptions through the Instance ID API.

pub mod models;

use crate::core::authorized_client;
use crate::core::middleware::AuthMiddleware;
use crate::core::parse_error_response;
use crate::messaging::models::{
    is_valid_topic_name, topic_name, topic_path, Message, SendResponse, TopicManagementError,
    TopicManagementResponse,
};
use reqwest::header;
use reqwest_middleware::ClientWithMiddleware;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

const FCM_SEND_URL: &str = "https://fcm.googleapis.com/v1/projects/{project_id}/messages:send";
const IID_URL: &str = "https://iid.googleapis.com";

// The Instance ID API accepts at most this many tokens per request.
const TOPIC_MANAGEMENT_BATCH_SIZE: usize = 1000;

#[derive(Error, Debug)]
pub enum MessagingError {
    #[error("HTTP Request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("Middleware error: {0}")]
    MiddlewareError(#[from] reqwest_middleware::Error),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("Invalid message: {0}")]
    InvalidMessage(String),
    #[error("No {0} configured")]
    NotConfigured(&'static str),
}

#[derive(Clone)]
pub struct FirebaseMessaging {
    client: ClientWithMiddleware,
    send_url: String,
    iid_url: String,
}

#[derive(Serialize)]
struct SendRequest<'a> {
    validate_only: bool,
    message: &'a Message,
}

#[derive(Serialize)]
struct TopicManagementRequest<'a> {
    to: &'a str,
    registration_tokens: &'a [&'a str],
}

#[derive(Deserialize)]
struct TopicManagementApiResponse {
    results: Option<Vec<TopicManagementApiResult>>,
}

#[derive(Deserialize)]
struct TopicManagementApiResult {
    error: Option<String>,
}

#[derive(Clone, Copy)]
enum TopicOperation {
    Subscribe,
    Unsubscribe,
}

impl TopicOperation {
    fn endpoint(self) -> &'static str {
        match self {
            TopicOperation::Subscribe => "iid/v1:batchAdd",
            TopicOperation::Unsubscribe => "iid/v1:batchRemove",
        }
    }
}

impl FirebaseMessaging {
    /// Creates a new `FirebaseMessaging` instance.
    ///
    /// This is typically called via `FirebaseApp::messaging()`. Fails with
    /// `NotConfigured` when the service account has no `project_id`.
    pub fn new(middleware: AuthMiddleware) -> Result<Self, MessagingError> {
        let project_id = middleware
            .project_id()
            .filter(|id| !id.is_empty())
            .ok_or(MessagingError::NotConfigured("project_id"))?;
        let send_url = FCM_SEND_URL.replace("{project_id}", project_id);
        Ok(Self::new_with_url(middleware, send_url, IID_URL.to_string()))
    }

    /// Like [`new`](Self::new), but against custom endpoints.
    pub fn new_with_url(middleware: AuthMiddleware, send_url: String, iid_url: String) -> Self {
        Self {
            client: authorized_client(middleware),
            send_url,
            iid_url,
        }
    }

    #[cfg(test)]
    pub(crate) fn new_with_client(
        client: ClientWithMiddleware,
        send_url: String,
        iid_url: String,
    ) -> Self {
        Self {
            client,
            send_url,
            iid_url,
        }
    }

    /// Sends a message and returns its name, `projects/{id}/messages/{message_id}`.
    pub async fn send(&self, message: &Message) -> Result<String, MessagingError> {
        self.send_request(message, false).await
    }

    /// Validates a message with FCM without delivering it.
    pub async fn send_dry_run(&self, message: &Message) -> Result<String, MessagingError> {
        self.send_request(message, true).await
    }

    async fn send_request(&self, message: &Message, dry_run: bool) -> Result<String, MessagingError> {
        validate_message(message)?;

        let normalized;
        let message = match message.topic.as_deref() {
            Some(topic) if topic_name(topic) != topic => {
                normalized = Message {
                    topic: Some(topic_name(topic).to_string()),
                    ..message.clone()
                };
                &normalized
            }
            _ => message,
        };

        let request = SendRequest {
            validate_only: dry_run,
            message,
        };
        debug!(url = %self.send_url, dry_run, "sending message");

        let response = self
            .client
            .post(&self.send_url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(serde_json::to_vec(&request)?)
            .send()
            .await?;

        if !response.status().is_success() {
            let error = parse_error_response(response, "FCM send failed").await;
            warn!(%error, "message was not sent");
            return Err(MessagingError::ApiError(error));
        }

        let result: SendResponse = response.json().await?;
        Ok(result.name)
    }

    /// Subscribes registration tokens to a topic. The topic may be given with
    /// or without the `/topics/` prefix.
    pub async fn subscribe_to_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        self.manage_topic(TopicOperation::Subscribe, topic, tokens).await
    }

    pub async fn unsubscribe_from_topic(
        &self,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        self.manage_topic(TopicOperation::Unsubscribe, topic, tokens).await
    }

    async fn manage_topic(
        &self,
        operation: TopicOperation,
        topic: &str,
        tokens: &[&str],
    ) -> Result<TopicManagementResponse, MessagingError> {
        if !is_valid_topic_name(topic_name(topic)) {
            return Err(MessagingError::InvalidMessage(format!(
                "Invalid topic name: {:?}",
                topic
            )));
        }
        if tokens.is_empty() || tokens.iter().any(|t| t.is_empty()) {
            return Err(MessagingError::InvalidMessage(
                "Registration tokens must be a non-empty list of non-empty strings".to_string(),
            ));
        }

        let url = format!("{}/{}", self.iid_url, operation.endpoint());
        let to = topic_path(topic);
        let mut summary = TopicManagementResponse::default();

        for (batch, chunk) in tokens.chunks(TOPIC_MANAGEMENT_BATCH_SIZE).enumerate() {
            let request = TopicManagementRequest {
                to: &to,
                registration_tokens: chunk,
            };
            debug!(%url, topic = %to, tokens = chunk.len(), "managing topic subscriptions");

            let response = self
                .client
                .post(&url)
                .header(header::CONTENT_TYPE, "application/json")
                // Instance ID only honours OAuth2 bearer tokens with this flag.
                .header("access_token_auth", "true")
                .body(serde_json::to_vec(&request)?)
                .send()
                .await?;

            if !response.status().is_success() {
                let message = parse_error_response(response, "Topic management failed").await;
                warn!(%message, "topic management request failed");
                return Err(MessagingError::ApiError(message));
            }

            let api_response: TopicManagementApiResponse = response.json().await?;
            let offset = batch * TOPIC_MANAGEMENT_BATCH_SIZE;

            for (i, result) in api_response.results.unwrap_or_default().into_iter().enumerate() {
                match result.error {
                    Some(reason) => {
                        summary.failure_count += 1;
                        summary.errors.push(TopicManagementError {
                            index: offset + i,
                            reason,
                        });
                    }
                    None => summary.success_count += 1,
                }
            }
        }

        Ok(summary)
    }
}

fn validate_message(message: &Message) -> Result<(), MessagingError> {
    if message.target_count() != 1 {
        return Err(MessagingError::InvalidMessage(
            "Message must have exactly one of token, topic, or condition".to_string(),
        ));
    }

    if let Some(topic) = &message.topic {
        if !is_valid_topic_name(topic_name(topic)) {
            return Err(MessagingError::InvalidMessage(format!(
                "Invalid topic name: {:?}",
                topic
            )));
        }
    }

    Ok(())
}
