//! Job queue manager: priority queue, per-dealer and global concurrency
//! caps, and resource-aware admission control.
//!
//! All mutable queue state lives behind a single mutex; the dispatcher task,
//! worker completions, and API calls all go through the same lock so there is
//! exactly one consistency boundary.
//!
//! Job state machine: `pending → running → {completed, failed}` and
//! `pending → cancelled`. Running jobs cannot be cancelled.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sysinfo::System;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::QueueConfig;
use crate::processors::{ExecutionReport, ExecutionStatus, JobType};

/// Job priority, highest dispatched first.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum JobPriority {
    Low,
    Normal,
    High,
    Critical,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

/// Lifecycle state of a queued job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    /// Pending and running jobs count against the dealer's active cap.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }
}

/// One job's queue-side record.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct Job {
    pub id: Uuid,
    pub dealer_id: Uuid,
    pub job_type: JobType,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub estimated_duration_seconds: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
}

/// Deferred job body: called once when the job is dispatched.
pub type JobBody =
    Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ExecutionReport> + Send>> + Send>;

/// Queue-wide counters exposed through `system_status`.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct QueueStats {
    pub jobs_processed: u64,
    pub jobs_failed: u64,
    pub jobs_cancelled: u64,
    pub peak_concurrency: usize,
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub running: usize,
    pub max_concurrent_jobs: usize,
    pub max_jobs_per_dealer: usize,
    pub stats: QueueStats,
    pub resources: ResourceSample,
    pub resource_gate_open: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingEntry {
    priority: JobPriority,
    seq: u64,
    job_id: Uuid,
}

// Max-heap: higher priority first, then earlier submission.
impl Ord for PendingEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for PendingEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct QueueState {
    jobs: HashMap<Uuid, Job>,
    bodies: HashMap<Uuid, JobBody>,
    ready: BinaryHeap<PendingEntry>,
    per_dealer_active: HashMap<Uuid, usize>,
    running: usize,
    next_seq: u64,
    stats: QueueStats,
}

impl QueueState {
    fn new() -> Self {
        Self {
            jobs: HashMap::new(),
            bodies: HashMap::new(),
            ready: BinaryHeap::new(),
            per_dealer_active: HashMap::new(),
            running: 0,
            next_seq: 0,
            stats: QueueStats::default(),
        }
    }

    fn release_dealer_slot(&mut self, dealer_id: Uuid) {
        if let Some(count) = self.per_dealer_active.get_mut(&dealer_id) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                self.per_dealer_active.remove(&dealer_id);
            }
        }
    }
}

/// Latest system resource sample used for admission control.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ResourceSample {
    pub memory_pct: f64,
    pub cpu_pct: f64,
    #[schema(value_type = String)]
    pub sampled_at: DateTime<Utc>,
}

impl Default for ResourceSample {
    fn default() -> Self {
        // Before the first sample arrives the gate stays open.
        Self {
            memory_pct: 0.0,
            cpu_pct: 0.0,
            sampled_at: Utc::now(),
        }
    }
}

/// Threshold predicate over a background resource sampler.
pub struct ResourceGate {
    memory_threshold_pct: f64,
    cpu_threshold_pct: f64,
    latest: Mutex<ResourceSample>,
}

impl ResourceGate {
    pub fn new(memory_threshold_pct: f64, cpu_threshold_pct: f64) -> Self {
        Self {
            memory_threshold_pct,
            cpu_threshold_pct,
            latest: Mutex::new(ResourceSample::default()),
        }
    }

    /// True when both memory and CPU are below their thresholds.
    pub fn can_start_new_job(&self) -> bool {
        let sample = self.latest();
        sample.memory_pct < self.memory_threshold_pct && sample.cpu_pct < self.cpu_threshold_pct
    }

    pub fn latest(&self) -> ResourceSample {
        *lock_unpoisoned(&self.latest)
    }

    /// Overrides the latest sample; used by the sampler task and by tests.
    pub fn record_sample(&self, memory_pct: f64, cpu_pct: f64) {
        *lock_unpoisoned(&self.latest) = ResourceSample {
            memory_pct,
            cpu_pct,
            sampled_at: Utc::now(),
        };
    }

    /// Spawns the background sampler; stops when the token is cancelled.
    pub fn spawn_sampler(
        self: &Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let gate = Arc::clone(self);
        tokio::spawn(async move {
            let mut sys = System::new();
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(interval) => {}
                }

                sys.refresh_memory();
                sys.refresh_cpu();
                let total = sys.total_memory();
                let memory_pct = if total > 0 {
                    sys.used_memory() as f64 / total as f64 * 100.0
                } else {
                    0.0
                };
                let cpu_pct = sys.global_cpu_info().cpu_usage() as f64;
                gate.record_sample(memory_pct, cpu_pct);
            }
        })
    }
}

/// The queue manager: submission, dispatch, cancellation, lifecycle.
pub struct JobQueueManager {
    config: QueueConfig,
    state: Arc<Mutex<QueueState>>,
    gate: Arc<ResourceGate>,
    cancel: CancellationToken,
    background: Mutex<Vec<JoinHandle<()>>>,
}

impl JobQueueManager {
    pub fn new(config: QueueConfig) -> Self {
        let gate = Arc::new(ResourceGate::new(
            config.memory_threshold_pct,
            config.cpu_threshold_pct,
        ));
        Self {
            config,
            state: Arc::new(Mutex::new(QueueState::new())),
            gate,
            cancel: CancellationToken::new(),
            background: Mutex::new(Vec::new()),
        }
    }

    pub fn resource_gate(&self) -> &Arc<ResourceGate> {
        &self.gate
    }

    /// Submits a job. Returns false without queueing when the dealer already
    /// holds `max_jobs_per_dealer` active jobs.
    pub fn submit(&self, job: Job, body: JobBody) -> bool {
        let mut state = lock_unpoisoned(&self.state);

        let active = state
            .per_dealer_active
            .get(&job.dealer_id)
            .copied()
            .unwrap_or(0);
        if active >= self.config.max_jobs_per_dealer {
            tracing::info!(
                dealer_id = %job.dealer_id,
                job_type = %job.job_type,
                active,
                "Job rejected: dealer at active-job cap"
            );
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        state.ready.push(PendingEntry {
            priority: job.priority,
            seq,
            job_id: job.id,
        });
        *state.per_dealer_active.entry(job.dealer_id).or_insert(0) += 1;
        state.bodies.insert(job.id, body);
        state.jobs.insert(job.id, job);
        true
    }

    /// Queue-side view of a job.
    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        lock_unpoisoned(&self.state).jobs.get(&job_id).cloned()
    }

    /// Cancels a pending job. `Ok(true)` when the job moved to cancelled,
    /// `Ok(false)` when it had already started (or finished), `None` when
    /// the id is unknown.
    pub fn cancel(&self, job_id: Uuid) -> Option<bool> {
        let mut state = lock_unpoisoned(&self.state);

        let job = state.jobs.get(&job_id)?;
        if job.status != JobStatus::Pending {
            return Some(false);
        }
        let dealer_id = job.dealer_id;

        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = JobStatus::Cancelled;
            job.completed_at = Some(Utc::now());
        }
        state.bodies.remove(&job_id);
        state.release_dealer_slot(dealer_id);
        state.stats.jobs_cancelled += 1;
        // The heap entry stays; dispatch skips non-pending ids.
        Some(true)
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        let state = lock_unpoisoned(&self.state);
        QueueSnapshot {
            pending: state.bodies.len(),
            running: state.running,
            max_concurrent_jobs: self.config.max_concurrent_jobs,
            max_jobs_per_dealer: self.config.max_jobs_per_dealer,
            stats: state.stats,
            resources: self.gate.latest(),
            resource_gate_open: self.gate.can_start_new_job(),
        }
    }

    /// Starts the dispatcher and resource sampler tasks.
    pub fn start(self: &Arc<Self>) {
        let manager = Arc::clone(self);
        let cancel = self.cancel.clone();
        let tick = Duration::from_millis(self.config.dispatch_tick_ms);
        let dispatcher = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(tick) => {}
                }
                manager.dispatch_ready();
            }
        });

        let sampler = self.gate.spawn_sampler(
            Duration::from_millis(self.config.resource_sample_interval_ms),
            self.cancel.clone(),
        );

        let mut background = lock_unpoisoned(&self.background);
        background.push(dispatcher);
        background.push(sampler);
    }

    /// Stops the dispatcher and waits up to the configured grace period for
    /// running jobs to drain.
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let handles: Vec<JoinHandle<()>> = {
            let mut background = lock_unpoisoned(&self.background);
            background.drain(..).collect()
        };
        for handle in handles {
            let _ = handle.await;
        }

        let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
        let deadline = tokio::time::Instant::now() + grace;
        loop {
            let running = lock_unpoisoned(&self.state).running;
            if running == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(running, "Shutdown grace period expired with jobs still running");
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Starts as many ready jobs as the global cap and resource gate allow.
    fn dispatch_ready(self: &Arc<Self>) {
        loop {
            let dispatched = {
                let mut state = lock_unpoisoned(&self.state);

                if state.running >= self.config.max_concurrent_jobs {
                    break;
                }
                if !self.gate.can_start_new_job() {
                    break;
                }

                let mut next = None;
                while let Some(entry) = state.ready.pop() {
                    let still_pending = state
                        .jobs
                        .get(&entry.job_id)
                        .map(|job| job.status == JobStatus::Pending)
                        .unwrap_or(false);
                    if still_pending {
                        next = Some(entry.job_id);
                        break;
                    }
                }

                let Some(job_id) = next else { break };
                let Some(body) = state.bodies.remove(&job_id) else {
                    break;
                };

                if let Some(job) = state.jobs.get_mut(&job_id) {
                    job.status = JobStatus::Running;
                    job.started_at = Some(Utc::now());
                }
                state.running += 1;
                if state.running > state.stats.peak_concurrency {
                    state.stats.peak_concurrency = state.running;
                }

                (job_id, body)
            };

            self.spawn_worker(dispatched.0, dispatched.1);
        }
    }

    /// Runs one job body on its own task. The body runs inside a nested task
    /// so a panic is contained and surfaces as a failed job, never into the
    /// dispatch loop.
    fn spawn_worker(self: &Arc<Self>, job_id: Uuid, body: JobBody) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            let inner = tokio::spawn(body());
            let report = match inner.await {
                Ok(report) => report,
                Err(join_err) => {
                    tracing::error!(job_id = %job_id, error = %join_err, "Job body panicked");
                    ExecutionReport::failed(format!("job body aborted: {}", join_err), 0.0)
                }
            };

            let mut state = lock_unpoisoned(&state);
            state.running = state.running.saturating_sub(1);

            let dealer_id = state.jobs.get(&job_id).map(|job| job.dealer_id);
            if let Some(dealer_id) = dealer_id {
                state.release_dealer_slot(dealer_id);
            }

            match &report.status {
                ExecutionStatus::Failed { error } => {
                    state.stats.jobs_failed += 1;
                    if let Some(job) = state.jobs.get_mut(&job_id) {
                        job.status = JobStatus::Failed;
                        job.error = Some(error.clone());
                    }
                }
                ExecutionStatus::Completed | ExecutionStatus::Skipped { .. } => {
                    state.stats.jobs_processed += 1;
                    if let Some(job) = state.jobs.get_mut(&job_id) {
                        job.status = JobStatus::Completed;
                        if let ExecutionStatus::Skipped { reason } = &report.status {
                            job.error = Some(format!("skipped: {}", reason));
                        }
                    }
                }
            }
            if let Some(job) = state.jobs.get_mut(&job_id) {
                job.completed_at = Some(Utc::now());
                job.records_processed = Some(report.records_processed);
                job.duration_seconds = Some(report.duration_seconds);
            }
        });
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Builds a fresh pending job record.
pub fn new_job(
    dealer_id: Uuid,
    job_type: JobType,
    priority: JobPriority,
    estimated_duration_seconds: u64,
) -> Job {
    Job {
        id: Uuid::new_v4(),
        dealer_id,
        job_type,
        priority,
        status: JobStatus::Pending,
        created_at: Utc::now(),
        started_at: None,
        completed_at: None,
        error: None,
        estimated_duration_seconds,
        records_processed: None,
        duration_seconds: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_body() -> JobBody {
        Box::new(|| Box::pin(async { ExecutionReport::completed(0, 0.0) }))
    }

    fn manager() -> JobQueueManager {
        JobQueueManager::new(QueueConfig::default())
    }

    #[test]
    fn submit_rejects_dealer_at_cap() {
        let queue = manager();
        let dealer = Uuid::new_v4();

        let first = new_job(dealer, JobType::ServiceOrders, JobPriority::Normal, 120);
        assert!(queue.submit(first, noop_body()));

        // Default cap is one active job per dealer.
        let second = new_job(dealer, JobType::Invoices, JobPriority::High, 90);
        assert!(!queue.submit(second, noop_body()));

        // A different dealer is unaffected.
        let other = new_job(Uuid::new_v4(), JobType::Invoices, JobPriority::Normal, 90);
        assert!(queue.submit(other, noop_body()));
    }

    #[test]
    fn pending_entries_order_by_priority_then_submission() {
        let mut heap = BinaryHeap::new();
        let low = PendingEntry {
            priority: JobPriority::Low,
            seq: 0,
            job_id: Uuid::new_v4(),
        };
        let high = PendingEntry {
            priority: JobPriority::High,
            seq: 1,
            job_id: Uuid::new_v4(),
        };
        let high_later = PendingEntry {
            priority: JobPriority::High,
            seq: 2,
            job_id: Uuid::new_v4(),
        };
        heap.push(low);
        heap.push(high_later);
        heap.push(high);

        assert_eq!(heap.pop().unwrap().job_id, high.job_id);
        assert_eq!(heap.pop().unwrap().job_id, high_later.job_id);
        assert_eq!(heap.pop().unwrap().job_id, low.job_id);
    }

    #[test]
    fn cancel_only_affects_pending_jobs() {
        let queue = manager();
        let dealer = Uuid::new_v4();
        let job = new_job(dealer, JobType::Deliveries, JobPriority::Normal, 60);
        let job_id = job.id;
        assert!(queue.submit(job, noop_body()));

        assert_eq!(queue.cancel(job_id), Some(true));
        assert_eq!(queue.job(job_id).unwrap().status, JobStatus::Cancelled);

        // Second cancel is a no-op.
        assert_eq!(queue.cancel(job_id), Some(false));
        // Unknown id.
        assert_eq!(queue.cancel(Uuid::new_v4()), None);
    }

    #[test]
    fn cancel_releases_dealer_slot() {
        let queue = manager();
        let dealer = Uuid::new_v4();
        let job = new_job(dealer, JobType::Invoices, JobPriority::Normal, 60);
        let job_id = job.id;
        assert!(queue.submit(job, noop_body()));
        assert_eq!(queue.cancel(job_id), Some(true));

        // Slot is free again.
        let next = new_job(dealer, JobType::Invoices, JobPriority::Normal, 60);
        assert!(queue.submit(next, noop_body()));
    }

    #[test]
    fn resource_gate_blocks_above_thresholds() {
        let gate = ResourceGate::new(80.0, 90.0);
        assert!(gate.can_start_new_job());

        gate.record_sample(85.0, 10.0);
        assert!(!gate.can_start_new_job());

        gate.record_sample(50.0, 95.0);
        assert!(!gate.can_start_new_job());

        gate.record_sample(50.0, 50.0);
        assert!(gate.can_start_new_job());
    }
}
