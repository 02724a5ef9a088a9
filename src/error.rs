//! # Error Handling
//!
//! This module provides unified error handling for the dealersync engine:
//! a domain error taxonomy for the ingestion pipeline and a consistent
//! problem+json response format with trace ID propagation for the API.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::telemetry;

/// Errors produced by the ingestion pipeline.
///
/// Retryability is a property of the variant: only [`IngestError::TransientNetwork`]
/// is retried by the client; everything else fails the attempt outright.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The dealer id does not exist.
    #[error("dealer {dealer_id} not found")]
    DealerNotFound { dealer_id: Uuid },

    /// The dealer exists but is not enabled for ingestion.
    #[error("dealer {dealer_id} is inactive")]
    DealerInactive { dealer_id: Uuid },

    /// The dealer has no usable partner API credentials.
    #[error("dealer {dealer_id} has no partner credentials")]
    MissingCredentials { dealer_id: Uuid },

    /// The circuit breaker is open; no request was attempted.
    #[error("circuit breaker open, retry in {retry_in_seconds}s")]
    CircuitOpen { retry_in_seconds: u64 },

    /// A transport-level failure (timeout, connect error). Retryable.
    #[error("transient network failure: {message}")]
    TransientNetwork { message: String },

    /// The partner returned a response we could not interpret.
    #[error("malformed partner response: {details}")]
    MalformedResponse { details: String },

    /// The partner rejected the fetch at the application level (status 0).
    #[error("partner rejected fetch: {message}")]
    FetchRejected { message: String },

    /// The batch transaction could not be committed; its writes are gone.
    #[error("transaction aborted: {details}")]
    TransactionAborted { details: String },

    /// A natural-key conflict that survived the row-by-row fallback.
    #[error("integrity conflict on {key}")]
    IntegrityConflict { key: String },

    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// The queue refused the job (per-dealer cap reached).
    #[error("queue rejected job for dealer {dealer_id}")]
    QueueRejected { dealer_id: Uuid },

    /// The job type key is not recognized.
    #[error("unknown job type '{value}'")]
    UnknownJobType { value: String },

    /// The referenced job id does not exist in the queue.
    #[error("job {job_id} not found")]
    JobNotFound { job_id: Uuid },
}

impl IngestError {
    /// True when the client may retry the call that produced this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, IngestError::TransientNetwork { .. })
    }
}

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Extract current trace ID from the active tracing span (falls back to generated correlation ID)
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                // Fallback: generate a correlation ID for basic client-server log correlation
                Some(format!("corr-{}", &Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

/// Detects a unique-constraint violation across the supported backends.
pub fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    if let Some(code) = db_error.code() {
        let code_str = code.as_ref();
        if code_str == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code_str) {
            return true;
        }
    }

    false
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        // Add Retry-After header if present
        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<IngestError> for ApiError {
    fn from(error: IngestError) -> Self {
        match error {
            IngestError::DealerNotFound { dealer_id } => Self::new(
                StatusCode::NOT_FOUND,
                "DEALER_NOT_FOUND",
                &format!("Dealer {} not found", dealer_id),
            ),
            IngestError::JobNotFound { job_id } => Self::new(
                StatusCode::NOT_FOUND,
                "JOB_NOT_FOUND",
                &format!("Job {} not found", job_id),
            ),
            IngestError::QueueRejected { dealer_id } => Self::new(
                StatusCode::CONFLICT,
                "QUEUE_REJECTED",
                &format!("Dealer {} already has an active job", dealer_id),
            ),
            IngestError::UnknownJobType { value } => Self::new(
                StatusCode::BAD_REQUEST,
                "VALIDATION_FAILED",
                &format!("Unknown job type '{}'", value),
            ),
            IngestError::CircuitOpen { retry_in_seconds } => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "CIRCUIT_OPEN",
                "Partner API circuit breaker is open",
            )
            .with_retry_after(retry_in_seconds),
            IngestError::Database(db_err) => db_err.into(),
            other => {
                tracing::error!(error = %other, "Ingestion error surfaced to API");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        // Log the full error for debugging
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            other => {
                tracing::error!("Database error: {:?}", other);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn api_error_basic() {
        let error = ApiError::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            "Test error message",
        );

        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.message, Box::from("Test error message"));
        assert_eq!(error.details, None);
        assert_eq!(error.retry_after, None);
    }

    #[test]
    fn api_error_with_details() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Test error message")
            .with_details(json!({"field": "value"}));

        assert_eq!(error.details, Some(Box::new(json!({"field": "value"}))));
    }

    #[test]
    fn content_type_header_is_problem_json() {
        let error = ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", "Test error");

        let response = error.into_response();

        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/problem+json"
        );
    }

    #[test]
    fn circuit_open_maps_to_503_with_retry_after() {
        let error: ApiError = IngestError::CircuitOpen {
            retry_in_seconds: 42,
        }
        .into();

        assert_eq!(error.status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.code, Box::from("CIRCUIT_OPEN"));
        assert_eq!(error.retry_after, Some(42));

        let response = error.into_response();
        assert_eq!(response.headers().get("retry-after").unwrap(), "42");
    }

    #[test]
    fn queue_rejected_maps_to_conflict() {
        let dealer_id = Uuid::new_v4();
        let error: ApiError = IngestError::QueueRejected { dealer_id }.into();

        assert_eq!(error.status, StatusCode::CONFLICT);
        assert_eq!(error.code, Box::from("QUEUE_REJECTED"));
        assert!(error.message.contains(&dealer_id.to_string()));
    }

    #[test]
    fn dealer_not_found_maps_to_404() {
        let dealer_id = Uuid::new_v4();
        let error: ApiError = IngestError::DealerNotFound { dealer_id }.into();

        assert_eq!(error.status, StatusCode::NOT_FOUND);
        assert_eq!(error.code, Box::from("DEALER_NOT_FOUND"));
    }

    #[test]
    fn unknown_job_type_maps_to_400() {
        let error: ApiError = IngestError::UnknownJobType {
            value: "parts".to_string(),
        }
        .into();

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert!(error.message.contains("parts"));
    }

    #[test]
    fn only_transient_network_is_retryable() {
        assert!(
            IngestError::TransientNetwork {
                message: "timeout".to_string()
            }
            .is_retryable()
        );
        assert!(
            !IngestError::MalformedResponse {
                details: "empty body".to_string()
            }
            .is_retryable()
        );
        assert!(
            !IngestError::FetchRejected {
                message: "invalid sign".to_string()
            }
            .is_retryable()
        );
        assert!(
            !IngestError::CircuitOpen {
                retry_in_seconds: 60
            }
            .is_retryable()
        );
    }

    #[test]
    fn transaction_aborted_is_internal_and_not_retryable() {
        let error = IngestError::TransactionAborted {
            details: "commit failed: connection reset".to_string(),
        };
        assert!(!error.is_retryable());

        let api_error: ApiError = error.into();
        assert_eq!(api_error.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_error.code, Box::from("INTERNAL_SERVER_ERROR"));
    }

    #[test]
    fn database_record_not_found_maps_to_404() {
        let db_error = sea_orm::DbErr::RecordNotFound("test_record".to_string());
        let api_error: ApiError = db_error.into();

        assert_eq!(api_error.status, StatusCode::NOT_FOUND);
        assert_eq!(api_error.code, Box::from("NOT_FOUND"));
        assert!(api_error.message.contains("test_record"));
    }

    #[test]
    fn trace_id_generation_falls_back_to_correlation_id() {
        let error = ApiError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Test error",
        );

        assert!(error.trace_id.is_some());
        let trace_id = error.trace_id.unwrap();
        assert!(trace_id.starts_with("corr-"));
        assert_eq!(trace_id.len(), 13); // "corr-" + 8 chars
    }

    #[test]
    fn auth_error_helpers() {
        let auth_error = unauthorized(None);
        assert_eq!(auth_error.status, StatusCode::UNAUTHORIZED);
        assert_eq!(auth_error.code, Box::from("UNAUTHORIZED"));
        assert_eq!(auth_error.message, Box::from("Authentication required"));

        let custom_auth_error = unauthorized(Some("Invalid token"));
        assert_eq!(custom_auth_error.message, Box::from("Invalid token"));
    }

    #[test]
    fn validation_error_with_field_details() {
        let field_errors = json!({
            "job_type": "must be one of service_orders, invoices, deliveries"
        });

        let error = validation_error("Validation failed", field_errors.clone());

        assert_eq!(error.status, StatusCode::BAD_REQUEST);
        assert_eq!(error.code, Box::from("VALIDATION_FAILED"));
        assert_eq!(error.details, Some(Box::new(field_errors)));
    }
}
