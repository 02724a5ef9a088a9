//! # Jobs API Handlers
//!
//! Handlers for submitting, inspecting, and cancelling ingestion jobs.

use axum::{
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::runner::{JobStatusView, RunRequest};
use crate::server::AppState;

/// Response payload after a job is accepted onto the queue
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobAccepted {
    /// Identifier of the queued job
    #[schema(example = "550e8400-e29b-41d4-a716-446655440000")]
    pub job_id: Uuid,
}

/// Response payload after a cancellation request
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct JobCancelled {
    pub job_id: Uuid,
    /// True when the job moved from pending to cancelled
    pub cancelled: bool,
}

/// Submit an ingestion job for one dealer
#[utoipa::path(
    post,
    path = "/jobs",
    security(("bearer_auth" = [])),
    request_body = RunRequest,
    responses(
        (status = 202, description = "Job accepted onto the queue", body = JobAccepted),
        (status = 400, description = "Invalid request payload", body = ApiError),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 409, description = "Dealer already has the maximum number of queued jobs", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn submit_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    payload: Result<Json<RunRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<JobAccepted>), ApiError> {
    let Json(request) = payload?;
    let job_id = state.runner.run(request)?;
    Ok((StatusCode::ACCEPTED, Json(JobAccepted { job_id })))
}

/// Look up one job: queue record, progress, and performance data
#[utoipa::path(
    get,
    path = "/jobs/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Job identifier")
    ),
    responses(
        (status = 200, description = "Job status with progress and performance data", body = JobStatusView),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown job id", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn get_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<JobStatusView>, ApiError> {
    let view = state.runner.status(id)?;
    Ok(Json(view))
}

/// Cancel a pending job
#[utoipa::path(
    delete,
    path = "/jobs/{id}",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Job identifier")
    ),
    responses(
        (status = 200, description = "Job cancelled", body = JobCancelled),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 404, description = "Unknown job id", body = ApiError),
        (status = 409, description = "Job already started or finished", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "jobs"
)]
pub async fn cancel_job(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
    Path(id): Path<Uuid>,
) -> Result<Json<JobCancelled>, ApiError> {
    let cancelled = state.runner.cancel(id)?;
    if !cancelled {
        return Err(ApiError::new(
            StatusCode::CONFLICT,
            "JOB_NOT_CANCELLABLE",
            "Job has already started or finished",
        ));
    }
    Ok(Json(JobCancelled {
        job_id: id,
        cancelled,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::create_test_app_state;
    use axum::{
        body::Body,
        http::{Request, header},
    };
    use serde_json::json;
    use tower::ServiceExt;

    async fn setup_app() -> axum::Router {
        let state = create_test_app_state().await;
        crate::server::create_app(state)
    }

    fn authed(builder: axum::http::request::Builder) -> axum::http::request::Builder {
        builder.header(header::AUTHORIZATION, "Bearer test-token-123")
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn submit_job_requires_auth() {
        let app = setup_app().await;

        let request = Request::builder()
            .method("POST")
            .uri("/jobs")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"dealer_id": Uuid::new_v4(), "job_type": "invoices"}).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn submit_job_returns_202_and_job_is_queryable() {
        let app = setup_app().await;
        let dealer_id = Uuid::new_v4();

        let request = authed(Request::builder().method("POST").uri("/jobs"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"dealer_id": dealer_id, "job_type": "service_orders"}).to_string(),
            ))
            .unwrap();

        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        let accepted = body_json(response).await;
        let job_id = accepted["job_id"].as_str().unwrap().to_string();

        let request = authed(
            Request::builder()
                .method("GET")
                .uri(format!("/jobs/{}", job_id)),
        )
        .body(Body::empty())
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let view = body_json(response).await;
        assert_eq!(
            view["job"]["dealer_id"].as_str().unwrap(),
            dealer_id.to_string()
        );
        // The dispatcher is not running in these tests, so the job stays
        // pending: zero progress and no performance record yet.
        assert_eq!(view["job"]["status"].as_str().unwrap(), "pending");
        assert_eq!(view["progress"].as_f64().unwrap(), 0.0);
        assert!(view.get("performance").is_none());
    }

    #[tokio::test]
    async fn submit_job_rejects_unknown_job_type() {
        let app = setup_app().await;

        let request = authed(Request::builder().method("POST").uri("/jobs"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"dealer_id": Uuid::new_v4(), "job_type": "parts"}).to_string(),
            ))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn second_job_for_same_dealer_is_rejected() {
        let app = setup_app().await;
        let dealer_id = Uuid::new_v4();

        for expected in [StatusCode::ACCEPTED, StatusCode::CONFLICT] {
            let request = authed(Request::builder().method("POST").uri("/jobs"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(
                    json!({"dealer_id": dealer_id, "job_type": "deliveries"}).to_string(),
                ))
                .unwrap();

            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), expected);
        }
    }

    #[tokio::test]
    async fn get_unknown_job_returns_404() {
        let app = setup_app().await;

        let request = authed(
            Request::builder()
                .method("GET")
                .uri(format!("/jobs/{}", Uuid::new_v4())),
        )
        .body(Body::empty())
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn error_responses_carry_the_request_trace_id() {
        let app = setup_app().await;

        let request = authed(
            Request::builder()
                .method("GET")
                .uri(format!("/jobs/{}", Uuid::new_v4())),
        )
        .body(Body::empty())
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let header = response
            .headers()
            .get("x-trace-id")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap();
        let body = body_json(response).await;
        assert!(header.starts_with("req-"));
        assert_eq!(body["trace_id"].as_str().unwrap(), header);
    }

    #[tokio::test]
    async fn cancel_pending_job_then_conflict_on_repeat() {
        let app = setup_app().await;
        let dealer_id = Uuid::new_v4();

        let request = authed(Request::builder().method("POST").uri("/jobs"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(
                json!({"dealer_id": dealer_id, "job_type": "invoices"}).to_string(),
            ))
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        let job_id = body_json(response).await["job_id"]
            .as_str()
            .unwrap()
            .to_string();

        let request = authed(
            Request::builder()
                .method("DELETE")
                .uri(format!("/jobs/{}", job_id)),
        )
        .body(Body::empty())
        .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cancelled = body_json(response).await;
        assert_eq!(cancelled["cancelled"], json!(true));

        // The job is no longer pending, so a second cancel conflicts.
        let request = authed(
            Request::builder()
                .method("DELETE")
                .uri(format!("/jobs/{}", job_id)),
        )
        .body(Body::empty())
        .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
