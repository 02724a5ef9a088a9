//! # Server Configuration
//!
//! This module contains the server setup and configuration for the ingestion API.

use std::sync::Arc;

use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderValue,
    middleware::Next,
    response::Response,
    routing::{get, post},
};
use sea_orm::DatabaseConnection;
use tokio_util::sync::CancellationToken;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;
use uuid::Uuid;

use crate::auth::auth_middleware;
use crate::client::PartnerClient;
use crate::config::AppConfig;
use crate::handlers;
use crate::monitor::PerformanceMonitor;
use crate::processors::{IngestEngine, ProcessorRegistry};
use crate::queue::JobQueueManager;
use crate::runner::TaskRunner;
use crate::telemetry::{self, TraceContext};

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub runner: Arc<TaskRunner>,
    pub db: DatabaseConnection,
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(state: &AppState) -> Self {
        Arc::clone(&state.config)
    }
}

/// Wires the runner and its queue/monitor/engine from configuration.
pub fn build_app_state(
    config: AppConfig,
    db: DatabaseConnection,
) -> Result<AppState, reqwest::Error> {
    let config = Arc::new(config);
    let client = PartnerClient::new(config.partner.clone())?;
    let engine = IngestEngine::new(db.clone(), client);
    let queue = Arc::new(JobQueueManager::new(config.queue.clone()));
    let monitor = Arc::new(PerformanceMonitor::new(config.monitor.clone()));
    let runner = Arc::new(TaskRunner::new(
        ProcessorRegistry::with_defaults(),
        queue,
        monitor,
        engine,
    ));

    Ok(AppState { config, runner, db })
}

/// Scopes every request to a fresh trace id so error payloads and log lines
/// share one correlation key; the id is echoed back in `x-trace-id`.
async fn trace_context_middleware(request: Request, next: Next) -> Response {
    let trace_id = format!("req-{}", Uuid::new_v4().simple());
    let context = TraceContext {
        trace_id: trace_id.clone(),
    };
    let mut response = telemetry::with_trace_context(context, next.run(request)).await;
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    response
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/jobs", post(handlers::jobs::submit_job))
        .route(
            "/jobs/{id}",
            get(handlers::jobs::get_job).delete(handlers::jobs::cancel_job),
        )
        .route("/system/status", get(handlers::system::system_status))
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.config),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .merge(protected)
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(trace_context_middleware))
        .layer(CorsLayer::permissive())
}

/// Starts the server and the queue's background tasks, then serves until
/// the shutdown token fires. Running jobs get the configured grace period.
pub async fn run_server(
    state: AppState,
    shutdown: CancellationToken,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::clone(&state.config);
    let runner = Arc::clone(&state.runner);

    runner.queue().start();
    let monitor_cancel = shutdown.child_token();
    runner.monitor().spawn_sampler(monitor_cancel);

    let app = create_app(state);

    let addr = config
        .bind_addr()
        .map_err(|e| format!("Invalid server address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, profile = %config.profile, "Server listening");

    let serve_shutdown = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { serve_shutdown.cancelled().await })
        .await?;

    runner.queue().shutdown().await;
    tracing::info!("Server stopped");

    Ok(())
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::jobs::submit_job,
        crate::handlers::jobs::get_job,
        crate::handlers::jobs::cancel_job,
        crate::handlers::system::system_status,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::jobs::JobAccepted,
            crate::handlers::jobs::JobCancelled,
            crate::runner::RunRequest,
            crate::runner::SystemStatus,
            crate::runner::JobStatusView,
            crate::queue::Job,
            crate::queue::JobPriority,
            crate::queue::JobStatus,
            crate::queue::QueueSnapshot,
            crate::queue::QueueStats,
            crate::queue::ResourceSample,
            crate::monitor::MonitorSummary,
            crate::monitor::TypeAggregates,
            crate::monitor::PerformanceRecord,
            crate::monitor::ResourceReading,
            crate::client::BreakerStats,
            crate::client::CircuitState,
            crate::processors::JobType,
            crate::processors::TimeWindow,
        )
    ),
    info(
        title = "DealerSync Ingestion API",
        description = "Batch ingestion of dealer service orders, invoices, and deliveries",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;

/// State for handler tests: in-memory components, dispatcher not started.
#[cfg(test)]
pub async fn create_test_app_state() -> AppState {
    let config = AppConfig {
        profile: "test".to_string(),
        database_url: "sqlite::memory:".to_string(),
        operator_tokens: vec!["test-token-123".to_string()],
        ..Default::default()
    };
    let db = crate::db::init_pool(&config)
        .await
        .expect("Failed to init test DB");
    build_app_state(config, db).expect("Failed to build test app state")
}
