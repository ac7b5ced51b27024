use crate::error::AlertError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Message body posted to the notification endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    /// Markdown message text
    pub text: String,
    /// Display name of the sender
    pub username: String,
    /// Emoji shortcode used as the sender icon
    pub icon_emoji: String,
}

/// Trait for notification transports
///
/// Each call is a single delivery attempt; retrying is up to the caller.
pub trait NotificationSink: Send + Sync {
    fn deliver<'a>(
        &'a self,
        payload: &'a WebhookPayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>>;
}

/// Slack incoming-webhook sink
pub struct SlackWebhookSink {
    client: Client,
    url: String,
    timeout: Duration,
}

impl SlackWebhookSink {
    /// Create a sink posting to `url` with the given request timeout
    ///
    /// # Errors
    ///
    /// Returns `AlertError::Transport` if the HTTP client cannot be built.
    pub fn new(url: String, timeout: Duration) -> Result<Self, AlertError> {
        let client = Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .map_err(|e| AlertError::Transport(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            url,
            timeout,
        })
    }
}

impl NotificationSink for SlackWebhookSink {
    fn deliver<'a>(
        &'a self,
        payload: &'a WebhookPayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let response = self
                .client
                .post(&self.url)
                .json(payload)
                .send()
                .await
                .map_err(|e| {
                    if e.is_timeout() {
                        AlertError::Timeout(self.timeout)
                    } else {
                        AlertError::Transport(e.to_string())
                    }
                })?;

            // Slack acknowledges with exactly 200 "ok"
            let status = response.status();
            if status.as_u16() != 200 {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Unknown error".to_string());
                return Err(AlertError::HttpStatus {
                    status: status.as_u16(),
                    body,
                });
            }

            Ok(())
        })
    }
}

/// Canned outcome for a mock delivery
#[derive(Debug, Clone)]
pub enum MockOutcome {
    Success,
    HttpStatus(u16),
    TransportError(String),
}

impl MockOutcome {
    fn to_result(&self) -> Result<(), AlertError> {
        match self {
            MockOutcome::Success => Ok(()),
            MockOutcome::HttpStatus(status) => Err(AlertError::HttpStatus {
                status: *status,
                body: "mock failure".to_string(),
            }),
            MockOutcome::TransportError(message) => Err(AlertError::Transport(message.clone())),
        }
    }
}

/// Mock sink for tests and dry runs
///
/// Returns scripted outcomes in order, cycling back to the first after the
/// last, and records every payload it receives.
#[derive(Clone)]
pub struct MockSink {
    outcomes: Vec<MockOutcome>,
    delay: Option<Duration>,
    delivered: Arc<Mutex<Vec<WebhookPayload>>>,
}

impl MockSink {
    /// Create a mock that answers with `outcomes` in order
    pub fn with_outcomes(outcomes: Vec<MockOutcome>) -> Self {
        Self {
            outcomes,
            delay: None,
            delivered: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds
    pub fn success() -> Self {
        Self::with_outcomes(vec![MockOutcome::Success])
    }

    /// Create a mock that always fails with a transport error
    pub fn failing(message: &str) -> Self {
        Self::with_outcomes(vec![MockOutcome::TransportError(message.to_string())])
    }

    /// Delay every delivery (useful for testing timeouts)
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of delivery attempts so far
    pub fn call_count(&self) -> usize {
        self.delivered.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Every payload received so far, oldest first
    pub fn delivered(&self) -> Vec<WebhookPayload> {
        self.delivered
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl NotificationSink for MockSink {
    fn deliver<'a>(
        &'a self,
        payload: &'a WebhookPayload,
    ) -> Pin<Box<dyn Future<Output = Result<(), AlertError>> + Send + 'a>> {
        Box::pin(async move {
            let attempt = {
                let mut delivered = self
                    .delivered
                    .lock()
                    .map_err(|_| AlertError::Transport("mock state poisoned".to_string()))?;
                delivered.push(payload.clone());
                delivered.len() - 1
            };

            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match self.outcomes.get(attempt % self.outcomes.len().max(1)) {
                Some(outcome) => outcome.to_result(),
                None => Ok(()),
            }
        })
    }
}
