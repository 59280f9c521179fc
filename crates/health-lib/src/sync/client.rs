//! HTTP client for the analysis service
//!
//! This module provides a client that:
//! - Posts samples as JSON to the analyzer's `/analyze` endpoint
//! - Enforces a per-attempt timeout
//! - Retries transient failures (connection errors, timeouts, 5xx) with
//!   exponential backoff, up to a configured bound
//! - Never retries a rejected payload (4xx) or a 2xx whose body does not
//!   decode, since the analyzer may already have stored the record

use super::Transport;
use crate::error::{ErrorKind, TransportError};
use crate::models::{Classification, ErrorBody, Sample};
use crate::observability::HealthMetrics;
use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, warn};
use url::Url;

/// Configuration for the analyzer client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Analyzer base URL (e.g., "http://analyzer:5000")
    pub endpoint: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Per-attempt request timeout
    pub request_timeout: Duration,
    /// Retries after the first attempt on transient failure
    pub max_retries: u32,
    /// Backoff before the first retry
    pub initial_backoff: Duration,
    /// Upper bound for the backoff
    pub max_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://health-analyzer:5000".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Outcome of a single attempt
enum AttemptError {
    Transient(String),
    /// Accepted by the analyzer but the classification could not be read
    InvalidResponse(String),
    Rejected {
        status: u16,
        code: Option<ErrorKind>,
        message: String,
    },
}

/// Client that delivers samples to the analysis service
pub struct AnalyzerClient {
    config: ClientConfig,
    http: reqwest::Client,
    analyze_url: Url,
    metrics: HealthMetrics,
}

impl AnalyzerClient {
    /// Create a new client with the given configuration
    pub fn new(config: ClientConfig) -> Result<Self, TransportError> {
        let analyze_url = analyze_url(&config.endpoint)?;
        let http = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))?;

        Ok(Self {
            config,
            http,
            analyze_url,
            metrics: HealthMetrics::new(),
        })
    }

    /// Create a client with default timeouts and retry policy
    pub fn with_defaults(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let config = ClientConfig {
            endpoint: endpoint.into(),
            ..ClientConfig::default()
        };
        Self::new(config)
    }

    /// Get the resolved `/analyze` URL
    pub fn analyze_url(&self) -> &Url {
        &self.analyze_url
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Backoff to wait before retry number `retry` (1-based)
    pub fn backoff_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.config
            .initial_backoff
            .saturating_mul(factor)
            .min(self.config.max_backoff)
    }

    /// Send a sample with no cancellation source
    pub async fn send_sample(&self, sample: &Sample) -> Result<Classification, TransportError> {
        // Keep the sender alive so the receiver never fires
        let (_keepalive, mut shutdown) = broadcast::channel(1);
        self.deliver(sample, &mut shutdown).await
    }

    async fn deliver(
        &self,
        sample: &Sample,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Classification, TransportError> {
        let mut attempts = 0u32;

        loop {
            attempts += 1;

            let outcome = tokio::select! {
                outcome = self.attempt(sample) => outcome,
                _ = shutdown.recv() => {
                    return Err(TransportError::Cancelled { attempts });
                }
            };

            match outcome {
                Ok(classification) => {
                    debug!(
                        attempts,
                        predicted_class = classification.predicted_class,
                        "Sample delivered"
                    );
                    return Ok(classification);
                }
                Err(AttemptError::Rejected {
                    status,
                    code,
                    message,
                }) => {
                    warn!(status, code = ?code, error = %message, "Analyzer rejected sample");
                    return Err(TransportError::RejectedSample {
                        status,
                        code,
                        message,
                    });
                }
                Err(AttemptError::InvalidResponse(reason)) => {
                    error!(
                        error = %reason,
                        attempt = attempts,
                        "Unreadable analyzer response, not retrying"
                    );
                    return Err(TransportError::Failure { attempts, reason });
                }
                Err(AttemptError::Transient(reason)) => {
                    if attempts > self.config.max_retries {
                        return Err(TransportError::Failure { attempts, reason });
                    }

                    let backoff = self.backoff_for(attempts);
                    self.metrics.inc_send_retries();
                    warn!(
                        error = %reason,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        "Sample delivery failed, retrying"
                    );

                    tokio::select! {
                        _ = tokio::time::sleep(backoff) => {}
                        _ = shutdown.recv() => {
                            return Err(TransportError::Cancelled { attempts });
                        }
                    }
                }
            }
        }
    }

    /// One POST to `/analyze`
    async fn attempt(&self, sample: &Sample) -> Result<Classification, AttemptError> {
        let response = self
            .http
            .post(self.analyze_url.clone())
            .json(sample)
            .send()
            .await
            .map_err(|e| AttemptError::Transient(describe_request_error(&e)))?;

        let status = response.status();
        if status.is_success() {
            return response
                .json::<Classification>()
                .await
                .map_err(|e| {
                    AttemptError::InvalidResponse(format!("invalid analyzer response: {}", e))
                });
        }

        let body = response.text().await.unwrap_or_default();
        let parsed: Option<ErrorBody> = serde_json::from_str(&body).ok();
        let message = parsed
            .as_ref()
            .map(|b| b.error.clone())
            .unwrap_or(body);

        if is_retryable(status) {
            Err(AttemptError::Transient(format!("analyzer returned {}: {}", status, message)))
        } else {
            Err(AttemptError::Rejected {
                status: status.as_u16(),
                code: parsed.and_then(|b| b.code),
                message,
            })
        }
    }
}

#[async_trait]
impl Transport for AnalyzerClient {
    async fn send(
        &self,
        sample: &Sample,
        shutdown: &mut broadcast::Receiver<()>,
    ) -> Result<Classification, TransportError> {
        self.deliver(sample, shutdown).await
    }
}

/// 5xx plus request timeout and rate limiting are worth retrying
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
}

fn describe_request_error(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {}", e)
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    }
}

/// Resolve `<endpoint>/analyze`, keeping any path prefix on the endpoint
fn analyze_url(endpoint: &str) -> Result<Url, TransportError> {
    let mut base = Url::parse(endpoint)
        .map_err(|e| TransportError::InvalidEndpoint(format!("{}: {}", endpoint, e)))?;
    if base.cannot_be_a_base() {
        return Err(TransportError::InvalidEndpoint(endpoint.to_string()));
    }
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join("analyze")
        .map_err(|e| TransportError::InvalidEndpoint(e.to_string()))
}

/// Builder for analyzer client configuration
pub struct AnalyzerClientBuilder {
    config: ClientConfig,
}

impl AnalyzerClientBuilder {
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.config.request_timeout = timeout;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn initial_backoff(mut self, backoff: Duration) -> Self {
        self.config.initial_backoff = backoff;
        self
    }

    pub fn max_backoff(mut self, backoff: Duration) -> Self {
        self.config.max_backoff = backoff;
        self
    }

    pub fn build(self) -> Result<AnalyzerClient, TransportError> {
        AnalyzerClient::new(self.config)
    }
}

impl Default for AnalyzerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
