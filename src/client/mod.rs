//! Resilient HTTP client for the partner DMS API.
//!
//! The client wraps a pooled `reqwest` client with request signing, bounded
//! retries with exponential backoff for transient transport failures, and a
//! circuit breaker shared across all calls to the partner.
//!
//! Only transport-level failures (timeouts, connect errors, 5xx responses)
//! are retried. Application-level rejections and malformed payloads fail the
//! attempt immediately; retrying them would send the same doomed request.

pub mod breaker;
pub mod signing;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::config::PartnerClientConfig;
use crate::error::IngestError;

pub use breaker::{BreakerStats, CircuitBreaker, CircuitState};

/// Credentials a dealer uses against the partner API.
#[derive(Debug, Clone)]
pub struct DealerCredentials {
    pub app_key: String,
    pub app_secret: String,
}

/// Application-level response envelope returned by every partner endpoint.
///
/// `status` is 1 for success and 0 for rejection; `data` is absent or null
/// when the window contained no records.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PartnerResponse {
    pub status: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl PartnerResponse {
    /// Extracts the record array, treating absent or null data as empty.
    pub fn records(&self) -> Result<Vec<serde_json::Value>, IngestError> {
        match &self.data {
            None | Some(serde_json::Value::Null) => Ok(Vec::new()),
            Some(serde_json::Value::Array(items)) => Ok(items.clone()),
            Some(other) => Err(IngestError::MalformedResponse {
                details: format!("expected data array, got {}", value_kind(other)),
            }),
        }
    }
}

fn value_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Resilient partner API client shared by all processors.
#[derive(Clone)]
pub struct PartnerClient {
    http: reqwest::Client,
    config: PartnerClientConfig,
    breaker: Arc<CircuitBreaker>,
}

impl PartnerClient {
    /// Builds a client from configuration, with a fresh circuit breaker.
    pub fn new(config: PartnerClientConfig) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(config.pool_max_idle_per_host)
            .pool_idle_timeout(Duration::from_secs(config.pool_idle_timeout_seconds))
            .build()?;

        let breaker = Arc::new(CircuitBreaker::new(
            config.breaker_failure_threshold,
            Duration::from_secs(config.breaker_recovery_timeout_seconds),
        ));

        Ok(Self {
            http,
            config,
            breaker,
        })
    }

    /// Current breaker statistics for status reporting.
    pub fn breaker_stats(&self) -> BreakerStats {
        self.breaker.stats()
    }

    /// Handle for operator-driven breaker control.
    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetches one page of records from the given endpoint.
    ///
    /// The call is signed with the dealer's credentials. On a `status: 0`
    /// envelope this returns [`IngestError::FetchRejected`]; the breaker
    /// still records a success because the partner answered.
    pub async fn fetch(
        &self,
        endpoint: &str,
        credentials: &DealerCredentials,
        params: &serde_json::Value,
    ) -> Result<PartnerResponse, IngestError> {
        self.breaker
            .try_acquire()
            .map_err(|retry_in_seconds| IngestError::CircuitOpen { retry_in_seconds })?;

        let body = serde_json::to_string(params).map_err(|e| IngestError::MalformedResponse {
            details: format!("failed to serialize request body: {}", e),
        })?;

        let mut attempt: u32 = 0;
        loop {
            match self.send_once(endpoint, credentials, &body).await {
                Ok(response) => {
                    self.breaker.record_success();
                    if response.status == 1 {
                        return Ok(response);
                    }
                    return Err(IngestError::FetchRejected {
                        message: response
                            .message
                            .unwrap_or_else(|| "no message provided".to_string()),
                    });
                }
                Err(err) if err.is_retryable() && attempt < self.config.max_retries => {
                    let delay = self.backoff_delay(attempt);
                    tracing::warn!(
                        endpoint,
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient partner failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => {
                    self.breaker.record_failure();
                    return Err(err);
                }
            }
        }
    }

    async fn send_once(
        &self,
        endpoint: &str,
        credentials: &DealerCredentials,
        body: &str,
    ) -> Result<PartnerResponse, IngestError> {
        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        );

        let timestamp_ms = Utc::now().timestamp_millis();
        let signature = signing::sign_request(
            &credentials.app_key,
            &credentials.app_secret,
            timestamp_ms,
            body,
        )
        .map_err(|e| IngestError::MalformedResponse {
            details: format!("request signing failed: {}", e),
        })?;

        let response = self
            .http
            .post(&url)
            .header("content-type", "application/json")
            .header(signing::HEADER_APP_KEY, &credentials.app_key)
            .header(signing::HEADER_TIMESTAMP, timestamp_ms.to_string())
            .header(signing::HEADER_SIGN, signature)
            .body(body.to_string())
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(IngestError::TransientNetwork {
                message: format!("partner returned {}", status),
            });
        }
        if !status.is_success() {
            return Err(IngestError::MalformedResponse {
                details: format!("unexpected partner status {}", status),
            });
        }

        let text = response.text().await.map_err(map_transport_error)?;
        if text.trim().is_empty() {
            return Err(IngestError::MalformedResponse {
                details: "empty response body".to_string(),
            });
        }

        serde_json::from_str::<PartnerResponse>(&text).map_err(|e| {
            IngestError::MalformedResponse {
                details: format!("unparseable response envelope: {}", e),
            }
        })
    }

    /// Exponential backoff with jitter: min(base * factor^attempt, max) ± 10%.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.config.retry_base_delay_ms as f64;
        let factor = self.config.retry_backoff_factor;
        let raw = base * factor.powi(attempt as i32);
        let capped = raw.min(self.config.retry_max_delay_ms as f64);
        let jitter = rand::thread_rng().gen_range(0.9..1.1);
        Duration::from_millis((capped * jitter) as u64)
    }
}

fn map_transport_error(err: reqwest::Error) -> IngestError {
    if err.is_timeout() || err.is_connect() {
        IngestError::TransientNetwork {
            message: err.to_string(),
        }
    } else {
        IngestError::MalformedResponse {
            details: err.to_string(),
        }
    }
}
