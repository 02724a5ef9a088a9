//! Tracing setup plus the task-local trace id that request middleware and
//! job workers put in scope, so audit rows and API error payloads share one
//! correlation key.

use std::sync::atomic::{AtomicBool, Ordering};

use log::LevelFilter;
use thiserror::Error;
use tokio::task_local;
use tracing_log::LogTracer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::{SubscriberInitExt, TryInitError},
};

use crate::config::AppConfig;

/// Correlation id scoped to one request or one job execution.
#[derive(Debug, Clone)]
pub struct TraceContext {
    pub trace_id: String,
}

task_local! {
    static ACTIVE_TRACE_CONTEXT: TraceContext;
}

#[derive(Debug, Error)]
pub enum TelemetryInitError {
    #[error("failed to install log bridge: {0}")]
    LogTracer(#[from] log::SetLoggerError),
    #[error("failed to install tracing subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber once: env-filtered, json or pretty per
/// config, with legacy `log::` macros bridged into tracing.
pub fn init_tracing(config: &AppConfig) -> Result<(), TelemetryInitError> {
    if INITIALIZED.swap(true, Ordering::SeqCst) {
        return Ok(());
    }

    LogTracer::builder()
        .with_max_level(LevelFilter::Trace)
        .init()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    let fmt_layer = match config.log_format.as_str() {
        "pretty" => fmt::layer().pretty().boxed(),
        _ => fmt::layer().json().boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;
    Ok(())
}

/// Runs `future` with `context` visible through [`current_trace_id`].
pub async fn with_trace_context<Fut, R>(context: TraceContext, future: Fut) -> R
where
    Fut: std::future::Future<Output = R>,
{
    ACTIVE_TRACE_CONTEXT.scope(context, future).await
}

/// Trace id of the current task, when one is in scope.
pub fn current_trace_id() -> Option<String> {
    ACTIVE_TRACE_CONTEXT
        .try_with(|context| context.trace_id.clone())
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trace_id_is_visible_only_inside_its_scope() {
        assert_eq!(current_trace_id(), None);

        let context = TraceContext {
            trace_id: "req-abc123".to_string(),
        };
        let seen = with_trace_context(context, async { current_trace_id() }).await;
        assert_eq!(seen.as_deref(), Some("req-abc123"));

        assert_eq!(current_trace_id(), None);
    }
}
