//! # System Status Handler
//!
//! Combined queue, performance, and circuit-breaker view for operators.

use axum::{extract::State, response::Json};

use crate::auth::OperatorAuth;
use crate::error::ApiError;
use crate::runner::SystemStatus;
use crate::server::AppState;

/// Report queue occupancy, rolling performance aggregates, and breaker state
#[utoipa::path(
    get,
    path = "/system/status",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "System status", body = SystemStatus),
        (status = 401, description = "Missing or invalid bearer token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    tag = "system"
)]
pub async fn system_status(
    State(state): State<AppState>,
    _operator_auth: OperatorAuth,
) -> Result<Json<SystemStatus>, ApiError> {
    Ok(Json(state.runner.system_status()))
}

#[cfg(test)]
mod tests {
    use crate::server::{create_app, create_test_app_state};
    use axum::{
        body::Body,
        http::{Request, StatusCode, header},
    };
    use tower::ServiceExt;

    #[tokio::test]
    async fn system_status_requires_auth() {
        let app = create_app(create_test_app_state().await);

        let request = Request::builder()
            .method("GET")
            .uri("/system/status")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn system_status_reports_queue_and_breaker() {
        let app = create_app(create_test_app_state().await);

        let request = Request::builder()
            .method("GET")
            .uri("/system/status")
            .header(header::AUTHORIZATION, "Bearer test-token-123")
            .body(Body::empty())
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let status: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

        assert_eq!(status["queue"]["running"].as_u64().unwrap(), 0);
        assert_eq!(status["queue"]["max_concurrent_jobs"].as_u64().unwrap(), 3);
        assert_eq!(status["breaker"]["state"].as_str().unwrap(), "closed");
        assert_eq!(status["performance"]["active_jobs"].as_u64().unwrap(), 0);
    }
}
