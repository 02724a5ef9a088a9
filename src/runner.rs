//! Task runner: the front door that turns inbound requests into queued jobs.
//!
//! Holds the processor registry, queue manager, performance monitor, and the
//! ingest engine, all injected at construction. `run` returns the job id
//! immediately; execution happens on the queue's worker tasks.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use serde_json::Value;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::client::BreakerStats;
use crate::error::IngestError;
use crate::monitor::{MonitorSummary, PerformanceMonitor, PerformanceRecord, TypeAggregates};
use crate::processors::{IngestEngine, JobType, ProcessorRegistry, TimeWindow};
use crate::queue::{Job, JobBody, JobPriority, JobQueueManager, JobStatus, QueueSnapshot, new_job};

/// Fixed per-type duration estimates surfaced on job records.
fn estimated_duration_seconds(job_type: JobType) -> u64 {
    match job_type {
        JobType::ServiceOrders => 120,
        JobType::Invoices => 90,
        JobType::Deliveries => 60,
    }
}

/// An inbound run request.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RunRequest {
    pub dealer_id: Uuid,
    pub job_type: JobType,
    #[serde(default)]
    pub window: Option<TimeWindow>,
    #[serde(default)]
    pub priority: JobPriority,
    /// Extra fetch parameters passed through to the partner API.
    #[serde(default)]
    pub extra: Value,
}

/// Combined queue + performance + breaker view.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct SystemStatus {
    pub queue: QueueSnapshot,
    pub performance: MonitorSummary,
    pub breaker: BreakerStats,
}

/// One job's status: the queue record joined with the performance monitor's
/// per-job record and the rolling aggregates for its type.
#[derive(Debug, Clone, serde::Serialize, ToSchema)]
pub struct JobStatusView {
    pub job: Job,
    /// Estimated completion percentage, 0 to 100.
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub performance: Option<PerformanceRecord>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aggregates: Option<TypeAggregates>,
}

/// Pending jobs sit at 0, finished ones at 100; a running job advances
/// against its estimate but never reports done before it is.
fn progress_pct(job: &Job) -> f64 {
    match job.status {
        JobStatus::Pending => 0.0,
        JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled => 100.0,
        JobStatus::Running => {
            let elapsed = job
                .started_at
                .map(|started| (Utc::now() - started).num_milliseconds().max(0) as f64 / 1000.0)
                .unwrap_or(0.0);
            let estimate = job.estimated_duration_seconds.max(1) as f64;
            (elapsed / estimate * 100.0).min(95.0)
        }
    }
}

/// The engine's inbound interface: run, status, cancel, system status.
pub struct TaskRunner {
    registry: ProcessorRegistry,
    queue: Arc<JobQueueManager>,
    monitor: Arc<PerformanceMonitor>,
    engine: IngestEngine,
}

impl TaskRunner {
    pub fn new(
        registry: ProcessorRegistry,
        queue: Arc<JobQueueManager>,
        monitor: Arc<PerformanceMonitor>,
        engine: IngestEngine,
    ) -> Self {
        Self {
            registry,
            queue,
            monitor,
            engine,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueueManager> {
        &self.queue
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn engine(&self) -> &IngestEngine {
        &self.engine
    }

    /// Submits an ingestion job and returns its id without waiting for it.
    pub fn run(&self, request: RunRequest) -> Result<Uuid, IngestError> {
        let processor =
            self.registry
                .get(request.job_type)
                .ok_or_else(|| IngestError::UnknownJobType {
                    value: request.job_type.as_str().to_string(),
                })?;

        let job = new_job(
            request.dealer_id,
            request.job_type,
            request.priority,
            estimated_duration_seconds(request.job_type),
        );
        let job_id = job.id;

        let engine = self.engine.clone();
        let monitor = Arc::clone(&self.monitor);
        let dealer_id = request.dealer_id;
        let job_type = request.job_type;
        let window = request.window;
        let extra = request.extra.clone();

        let body: JobBody = Box::new(move || {
            Box::pin(async move {
                monitor.start_job_monitoring(job_id, job_type);
                let report = engine
                    .run_ingest(processor.as_ref(), dealer_id, window, &extra)
                    .await;
                monitor.record_job_counters(job_id, report.db_operations, report.api_calls);
                monitor.end_job_monitoring(
                    job_id,
                    !report.is_failed(),
                    report.records_processed,
                    report.errors.clone(),
                    report.warnings.clone(),
                );
                report
            })
        });

        if !self.queue.submit(job, body) {
            return Err(IngestError::QueueRejected { dealer_id });
        }

        tracing::info!(job_id = %job_id, dealer_id = %dealer_id, %job_type, "Job submitted");
        Ok(job_id)
    }

    /// Queue record joined with the monitor's per-job performance data.
    pub fn status(&self, job_id: Uuid) -> Result<JobStatusView, IngestError> {
        let job = self
            .queue
            .job(job_id)
            .ok_or(IngestError::JobNotFound { job_id })?;
        let performance = self.monitor.job_record(job_id);
        let aggregates = self.monitor.type_aggregates(job.job_type);
        let progress = progress_pct(&job);
        Ok(JobStatusView {
            job,
            progress,
            performance,
            aggregates,
        })
    }

    /// Cancels a pending job. `Ok(true)` when it moved to cancelled,
    /// `Ok(false)` when it had already started or finished.
    pub fn cancel(&self, job_id: Uuid) -> Result<bool, IngestError> {
        self.queue
            .cancel(job_id)
            .ok_or(IngestError::JobNotFound { job_id })
    }

    /// Queue-wide and performance-wide summaries plus breaker state.
    pub fn system_status(&self) -> SystemStatus {
        SystemStatus {
            queue: self.queue.snapshot(),
            performance: self.monitor.summary(),
            breaker: self.engine.client().breaker_stats(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job_with_status(status: JobStatus) -> Job {
        let mut job = new_job(Uuid::new_v4(), JobType::Invoices, JobPriority::Normal, 90);
        job.status = status;
        job
    }

    #[test]
    fn progress_is_zero_pending_and_full_when_done() {
        assert_eq!(progress_pct(&job_with_status(JobStatus::Pending)), 0.0);
        assert_eq!(progress_pct(&job_with_status(JobStatus::Completed)), 100.0);
        assert_eq!(progress_pct(&job_with_status(JobStatus::Failed)), 100.0);
        assert_eq!(progress_pct(&job_with_status(JobStatus::Cancelled)), 100.0);
    }

    #[test]
    fn running_progress_tracks_the_estimate_but_caps_below_done() {
        let mut job = job_with_status(JobStatus::Running);
        job.estimated_duration_seconds = 60;

        job.started_at = Some(Utc::now());
        assert!(progress_pct(&job) < 5.0);

        // Far past the estimate: capped, never reported as finished.
        job.started_at = Some(Utc::now() - chrono::Duration::seconds(600));
        assert_eq!(progress_pct(&job), 95.0);
    }
}
