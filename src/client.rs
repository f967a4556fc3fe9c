//! HTTP client module for sending event batches to the collector.
//!
//! This module provides the production [`Transport`]: an async HTTP client
//! with connection pooling, retry logic with exponential backoff, and proper
//! error handling.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::delivery::{Ack, Transport, TransportError};
use crate::event::{AppIdentity, EventBatch, EventRecord};
use crate::facade::IdentityConsumer;

/// Default base delay for exponential backoff (in milliseconds).
const DEFAULT_BASE_DELAY_MS: u64 = 500;

/// Maximum delay between retries (in milliseconds).
const MAX_RETRY_DELAY_MS: u64 = 30_000;

/// Response from the event ingestion API.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestResponse {
    /// Status message from the API
    pub status: String,

    /// Number of events accepted
    #[serde(default)]
    pub accepted: u64,

    /// Number of events rejected (if any)
    #[serde(default)]
    pub rejected: u64,

    /// Optional batch ID assigned by the server
    #[serde(default)]
    pub batch_id: Option<String>,

    /// Optional error message
    #[serde(default)]
    pub error: Option<String>,
}

/// Errors that can occur while talking to the collector over HTTP.
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[source] reqwest::Error),

    /// Server returned an error status code
    #[error("Server error ({code}): {message}")]
    Status { code: StatusCode, message: String },

    /// Failed to parse response body
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// All retry attempts exhausted
    #[error("All {attempts} attempts exhausted. Last error: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    /// Request timeout
    #[error("Request timed out")]
    Timeout,

    /// Client configuration error
    #[error("Client configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else {
            ClientError::Request(err)
        }
    }
}

impl From<ClientError> for TransportError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::Status { code, message } => TransportError::Rejected {
                status: code.as_u16(),
                message,
            },
            other => TransportError::failed(other),
        }
    }
}

/// HTTP transport posting event batches to the collector's ingest endpoint.
///
/// The transport uses connection pooling (via reqwest's internal pool),
/// retries transient failures with exponential backoff, and stamps each
/// batch with the application identity and the current user identity.
///
/// # Example
///
/// ```no_run
/// use edge_analytics::client::HttpTransport;
/// use edge_analytics::config::Config;
/// use edge_analytics::delivery::Transport;
/// use edge_analytics::event::EventRecord;
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let config = Config::default();
///     let transport = HttpTransport::new(&config).expect("Failed to create transport");
///
///     let event = EventRecord::custom(&json!({"screen": "home"})).unwrap();
///     match transport.transmit(vec![event]).await {
///         Ok(ack) => println!("Sent {} events", ack.accepted),
///         Err(e) => eprintln!("Failed to send: {}", e),
///     }
/// }
/// ```
pub struct HttpTransport {
    /// The underlying HTTP client (reused for connection pooling)
    client: Client,

    /// URL for the event ingestion endpoint
    ingest_url: String,

    /// Maximum number of retry attempts
    max_retries: u32,

    /// Request timeout duration
    timeout: Duration,

    /// Application stamped on each batch
    app: AppIdentity,

    /// Current user identity, pushed by the facade
    user_id: RwLock<Option<String>>,
}

impl HttpTransport {
    /// Create a new transport with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Config` if the HTTP client cannot be built.
    pub fn new(config: &Config) -> Result<Self, ClientError> {
        Self::with_settings(
            config.ingest_url.clone(),
            config.request_timeout,
            config.max_retries,
            config.app_identity(),
        )
    }

    /// Create a new transport with custom settings.
    pub fn with_settings(
        ingest_url: impl Into<String>,
        timeout: Duration,
        max_retries: u32,
        app: AppIdentity,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| ClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            ingest_url: ingest_url.into(),
            max_retries,
            timeout,
            app,
            user_id: RwLock::new(None),
        })
    }

    /// Send a batch of events to the collector.
    ///
    /// Retries up to `max_retries` times on network errors, timeouts, 5xx
    /// and 429 responses. Other 4xx responses and parse errors fail at once.
    /// A retryable failure on the last attempt yields `RetriesExhausted`.
    pub async fn send_batch(&self, batch: &EventBatch) -> Result<IngestResponse, ClientError> {
        let batch_size = batch.len();

        debug!(
            batch_size = batch_size,
            batch_id = ?batch.batch_id,
            url = %self.ingest_url,
            "Sending event batch"
        );

        let mut attempt = 0;

        loop {
            if attempt > 0 {
                let delay = self.calculate_backoff_delay(attempt);
                warn!(
                    attempt = attempt,
                    max_retries = self.max_retries,
                    delay_ms = delay.as_millis(),
                    "Retrying after failure"
                );
                tokio::time::sleep(delay).await;
            }

            let e = match self.send_request(batch).await {
                Ok(response) => {
                    info!(
                        batch_size = batch_size,
                        accepted = response.accepted,
                        rejected = response.rejected,
                        "Successfully sent event batch"
                    );
                    return Ok(response);
                }
                Err(e) => e,
            };

            if !self.is_retryable_error(&e) {
                error!(
                    error = %e,
                    attempts = attempt + 1,
                    "Request failed permanently"
                );
                return Err(e);
            }

            if attempt >= self.max_retries {
                error!(
                    error = %e,
                    attempts = attempt + 1,
                    "Request failed, retries exhausted"
                );
                return Err(ClientError::RetriesExhausted {
                    attempts: attempt + 1,
                    last_error: e.to_string(),
                });
            }

            warn!(
                error = %e,
                attempt = attempt + 1,
                max_retries = self.max_retries,
                "Request failed, will retry"
            );
            attempt += 1;
        }
    }

    /// Send a single HTTP request without retry logic.
    async fn send_request(&self, batch: &EventBatch) -> Result<IngestResponse, ClientError> {
        let response = self
            .client
            .post(&self.ingest_url)
            .timeout(self.timeout)
            .json(batch)
            .send()
            .await?;

        let status = response.status();

        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| ClientError::Parse(e.to_string()))
        } else {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            Err(ClientError::Status {
                code: status,
                message,
            })
        }
    }

    /// Calculate the backoff delay for a given retry attempt.
    ///
    /// delay = min(base_delay * 2^attempt + jitter, max_delay)
    fn calculate_backoff_delay(&self, attempt: u32) -> Duration {
        let exponential_delay = DEFAULT_BASE_DELAY_MS.saturating_mul(1 << attempt.min(10));

        // Up to 25% jitter
        let jitter = rand::random::<u64>() % (exponential_delay / 4 + 1);

        let total_delay = exponential_delay
            .saturating_add(jitter)
            .min(MAX_RETRY_DELAY_MS);

        Duration::from_millis(total_delay)
    }

    fn is_retryable_error(&self, error: &ClientError) -> bool {
        match error {
            ClientError::Request(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            ClientError::Timeout => true,
            ClientError::Status { code, .. } => {
                code.is_server_error() || *code == StatusCode::TOO_MANY_REQUESTS
            }
            ClientError::Parse(_) | ClientError::RetriesExhausted { .. } | ClientError::Config(_) => {
                false
            }
        }
    }

    /// Build the envelope for a payload.
    fn batch_for(&self, events: Vec<EventRecord>) -> EventBatch {
        EventBatch::new(events)
            .with_app(self.app.clone())
            .with_user(self.user_id())
    }

    /// Get the configured ingest URL.
    pub fn ingest_url(&self) -> &str {
        &self.ingest_url
    }

    /// Get the maximum number of retries.
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Get the request timeout duration.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Current user identity stamped on outgoing batches.
    pub fn user_id(&self) -> Option<String> {
        self.user_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn transmit(&self, payload: Vec<EventRecord>) -> Result<Ack, TransportError> {
        let batch = self.batch_for(payload);
        let response = self.send_batch(&batch).await?;

        Ok(Ack {
            accepted: response.accepted,
            batch_id: response
                .batch_id
                .or_else(|| batch.batch_id.map(|id| id.to_string())),
        })
    }
}

impl IdentityConsumer for HttpTransport {
    fn identity_changed(&self, user_id: Option<&str>) {
        *self.user_id.write().unwrap_or_else(PoisonError::into_inner) =
            user_id.map(str::to_string);
    }
}
