//! Conversation backend client
//!
//! One POST per utterance to the triage webhook. Failures are mapped to a
//! small set of categories and handed back to the caller; nothing is retried
//! here.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;
use url::Url;
use uuid::Uuid;

use crate::Result;

/// Default request timeout for the conversation backend
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Conversation backend failure categories
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversationError {
    /// The backend did not answer within the request timeout
    #[error("conversation backend timed out")]
    Timeout,

    /// The backend answered with a 5xx status
    #[error("conversation backend returned server error {0}")]
    Server(u16),

    /// Nothing is listening at the backend address
    #[error("conversation backend refused the connection")]
    ConnectionRefused,

    /// Any other transport or protocol failure
    #[error("conversation backend communication failed: {0}")]
    Communication(String),
}

impl ConversationError {
    /// Classify a transport error
    #[must_use]
    pub fn from_transport(err: &reqwest::Error) -> Self {
        if err.is_timeout() {
            return Self::Timeout;
        }

        if err.is_connect() && is_connection_refused(err) {
            return Self::ConnectionRefused;
        }

        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16());
        }

        Self::Communication(err.to_string())
    }

    /// Classify a non-success HTTP status
    #[must_use]
    pub fn from_status(status: u16) -> Self {
        if (500..600).contains(&status) {
            Self::Server(status)
        } else {
            Self::Communication(format!("unexpected status {status}"))
        }
    }
}

/// Walk the error chain looking for an `ECONNREFUSED`
fn is_connection_refused(err: &reqwest::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> =
        Some(err as &(dyn std::error::Error + 'static));
    while let Some(e) = source {
        let refused = e
            .downcast_ref::<std::io::Error>()
            .is_some_and(|io| io.kind() == std::io::ErrorKind::ConnectionRefused);
        if refused {
            return true;
        }
        source = e.source();
    }

    err.to_string().to_lowercase().contains("refused")
}

/// Remote conversational backend
#[async_trait]
pub trait ConversationClient: Send + Sync {
    /// Send one utterance for the given session and return the raw response body
    ///
    /// # Errors
    ///
    /// Returns the failure category when the exchange does not complete
    async fn send_message(
        &self,
        text: &str,
        session_id: Uuid,
    ) -> std::result::Result<Value, ConversationError>;
}

/// Webhook request body
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TriageRequest<'a> {
    message: &'a str,
    session_id: Uuid,
}

/// Conversation client for an HTTP webhook (e.g. an n8n workflow)
#[derive(Debug, Clone)]
pub struct WebhookClient {
    client: reqwest::Client,
    url: Url,
}

impl WebhookClient {
    /// Create a client for the webhook at `url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(url: Url, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        tracing::debug!(%url, timeout_secs = timeout.as_secs(), "webhook client initialized");

        Ok(Self { client, url })
    }

    /// Webhook address
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConversationClient for WebhookClient {
    async fn send_message(
        &self,
        text: &str,
        session_id: Uuid,
    ) -> std::result::Result<Value, ConversationError> {
        let request = TriageRequest {
            message: text,
            session_id,
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, %session_id, "webhook request failed");
                ConversationError::from_transport(&e)
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, %session_id, "webhook returned error status");
            return Err(ConversationError::from_status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ConversationError::from_transport(&e))?;

        tracing::debug!(%session_id, bytes = body.len(), "webhook replied");

        // Plain-text replies are handed on as a JSON string
        Ok(serde_json::from_str(&body).unwrap_or(Value::String(body)))
    }
}
