//! Performance monitor: per-job performance records, per-type rolling
//! averages, bounded resource history, and threshold checks surfaced through
//! `system_status`.
//!
//! Aggregates are maintained incrementally (`avg += (x - avg) / n`); the only
//! bounded buffers are the resource sample deque and the finished-record
//! deque.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use metrics::{counter, histogram};
use serde::Serialize;
use sysinfo::System;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::processors::JobType;

/// One system resource sample.
#[derive(Debug, Clone, Copy, Serialize, ToSchema)]
pub struct ResourceReading {
    pub memory_pct: f64,
    pub cpu_pct: f64,
    #[schema(value_type = String)]
    pub sampled_at: DateTime<Utc>,
}

/// Rolling aggregates for one job type.
#[derive(Debug, Clone, Copy, Default, Serialize, ToSchema)]
pub struct TypeAggregates {
    pub completed: u64,
    pub failed: u64,
    /// Rolling average wall-clock duration in seconds.
    pub avg_duration_seconds: f64,
    /// Rolling average records per second across completed runs.
    pub avg_throughput: f64,
}

/// One job's performance record, kept while it runs and after it ends.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PerformanceRecord {
    pub job_id: Uuid,
    pub job_type: JobType,
    #[schema(value_type = String)]
    pub started_at: DateTime<Utc>,
    #[schema(value_type = Option<String>)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,
    /// Absent while the job is still in flight.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub success: Option<bool>,
    pub records_processed: u64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    /// Database round trips the job made.
    pub db_operations: u64,
    /// Partner API calls the job made.
    pub api_calls: u64,
    /// Resource readings taken while the job was in flight.
    pub resource_samples: Vec<ResourceReading>,
}

/// Monitor-wide summary for status endpoints.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MonitorSummary {
    pub active_jobs: usize,
    pub total_completed: u64,
    pub total_failed: u64,
    pub per_type: HashMap<String, TypeAggregates>,
    pub peak_memory_pct: f64,
    pub peak_cpu_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latest_resources: Option<ResourceReading>,
    pub issues: Vec<String>,
}

struct ActiveJob {
    job_type: JobType,
    started: Instant,
    started_at: DateTime<Utc>,
    db_operations: u64,
    api_calls: u64,
    samples: Vec<ResourceReading>,
}

struct MonitorState {
    active: HashMap<Uuid, ActiveJob>,
    finished: VecDeque<PerformanceRecord>,
    per_type: HashMap<JobType, TypeAggregates>,
    total_completed: u64,
    total_failed: u64,
    history: VecDeque<ResourceReading>,
    peak_memory_pct: f64,
    peak_cpu_pct: f64,
}

/// Tracks in-flight jobs and system load.
pub struct PerformanceMonitor {
    config: MonitorConfig,
    state: Mutex<MonitorState>,
}

impl PerformanceMonitor {
    pub fn new(config: MonitorConfig) -> Self {
        Self {
            config,
            state: Mutex::new(MonitorState {
                active: HashMap::new(),
                finished: VecDeque::new(),
                per_type: HashMap::new(),
                total_completed: 0,
                total_failed: 0,
                history: VecDeque::new(),
                peak_memory_pct: 0.0,
                peak_cpu_pct: 0.0,
            }),
        }
    }

    /// Marks a job as in flight.
    pub fn start_job_monitoring(&self, job_id: Uuid, job_type: JobType) {
        let mut state = self.lock();
        state.active.insert(
            job_id,
            ActiveJob {
                job_type,
                started: Instant::now(),
                started_at: Utc::now(),
                db_operations: 0,
                api_calls: 0,
                samples: Vec::new(),
            },
        );
    }

    /// Adds database and API call counts to an in-flight job.
    pub fn record_job_counters(&self, job_id: Uuid, db_operations: u64, api_calls: u64) {
        let mut state = self.lock();
        if let Some(active) = state.active.get_mut(&job_id) {
            active.db_operations += db_operations;
            active.api_calls += api_calls;
        }
    }

    /// Finishes a job, appending its errors and warnings to the per-job
    /// record and folding its numbers into the rolling aggregates. Returns
    /// the measured duration, or `None` for an unknown job id.
    pub fn end_job_monitoring(
        &self,
        job_id: Uuid,
        success: bool,
        records_processed: u64,
        errors: Vec<String>,
        warnings: Vec<String>,
    ) -> Option<f64> {
        self.finish(job_id, success, records_processed, errors, warnings, None)
    }

    /// Like [`end_job_monitoring`](Self::end_job_monitoring) but with an
    /// explicit duration instead of the internally measured one.
    pub fn end_job_monitoring_with_duration(
        &self,
        job_id: Uuid,
        success: bool,
        records_processed: u64,
        errors: Vec<String>,
        warnings: Vec<String>,
        duration_seconds: f64,
    ) -> Option<f64> {
        self.finish(
            job_id,
            success,
            records_processed,
            errors,
            warnings,
            Some(duration_seconds),
        )
    }

    fn finish(
        &self,
        job_id: Uuid,
        success: bool,
        records_processed: u64,
        errors: Vec<String>,
        warnings: Vec<String>,
        duration_override: Option<f64>,
    ) -> Option<f64> {
        let mut state = self.lock();
        let active = state.active.remove(&job_id)?;
        let duration = duration_override.unwrap_or_else(|| active.started.elapsed().as_secs_f64());
        let job_type = active.job_type;

        let aggregates = state.per_type.entry(job_type).or_default();
        if success {
            aggregates.completed += 1;
            let n = aggregates.completed as f64;
            aggregates.avg_duration_seconds += (duration - aggregates.avg_duration_seconds) / n;
            if duration > 0.0 {
                let throughput = records_processed as f64 / duration;
                aggregates.avg_throughput += (throughput - aggregates.avg_throughput) / n;
            }
            state.total_completed += 1;
            counter!("ingest_jobs_completed_total", "job_type" => job_type.as_str()).increment(1);
            histogram!("ingest_job_duration_seconds", "job_type" => job_type.as_str())
                .record(duration);
        } else {
            aggregates.failed += 1;
            state.total_failed += 1;
            counter!("ingest_jobs_failed_total", "job_type" => job_type.as_str()).increment(1);
        }

        state.finished.push_back(PerformanceRecord {
            job_id,
            job_type,
            started_at: active.started_at,
            ended_at: Some(Utc::now()),
            duration_seconds: Some(duration),
            success: Some(success),
            records_processed,
            errors,
            warnings,
            db_operations: active.db_operations,
            api_calls: active.api_calls,
            resource_samples: active.samples,
        });
        while state.finished.len() > self.config.history_capacity {
            state.finished.pop_front();
        }

        Some(duration)
    }

    /// Per-job record: partial while the job is in flight, complete after
    /// it ends, `None` once it falls out of the bounded history.
    pub fn job_record(&self, job_id: Uuid) -> Option<PerformanceRecord> {
        let state = self.lock();
        if let Some(active) = state.active.get(&job_id) {
            return Some(PerformanceRecord {
                job_id,
                job_type: active.job_type,
                started_at: active.started_at,
                ended_at: None,
                duration_seconds: None,
                success: None,
                records_processed: 0,
                errors: Vec::new(),
                warnings: Vec::new(),
                db_operations: active.db_operations,
                api_calls: active.api_calls,
                resource_samples: active.samples.clone(),
            });
        }
        state
            .finished
            .iter()
            .rev()
            .find(|record| record.job_id == job_id)
            .cloned()
    }

    /// Rolling aggregates for one job type, if any run has finished.
    pub fn type_aggregates(&self, job_type: JobType) -> Option<TypeAggregates> {
        self.lock().per_type.get(&job_type).copied()
    }

    /// Appends a resource sample, trimming the history to its capacity. The
    /// sample is also attached to every in-flight job's record.
    pub fn record_resource_sample(&self, memory_pct: f64, cpu_pct: f64) {
        let mut state = self.lock();
        let reading = ResourceReading {
            memory_pct,
            cpu_pct,
            sampled_at: Utc::now(),
        };
        state.history.push_back(reading);
        while state.history.len() > self.config.history_capacity {
            state.history.pop_front();
        }
        let per_job_cap = self.config.history_capacity;
        for active in state.active.values_mut() {
            active.samples.push(reading);
            if active.samples.len() > per_job_cap {
                active.samples.remove(0);
            }
        }
        if memory_pct > state.peak_memory_pct {
            state.peak_memory_pct = memory_pct;
        }
        if cpu_pct > state.peak_cpu_pct {
            state.peak_cpu_pct = cpu_pct;
        }
    }

    /// Spawns the background resource sampler; stops when cancelled.
    pub fn spawn_sampler(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let monitor = Arc::clone(self);
        let interval = Duration::from_secs(monitor.config.sample_interval_seconds);
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
                monitor.record_resource_sample(memory_pct, cpu_pct);
            }
        })
    }

    /// Human-readable threshold violations, empty when everything is nominal.
    pub fn check_thresholds(&self) -> Vec<String> {
        let state = self.lock();
        let mut issues = Vec::new();

        for (job_id, active) in &state.active {
            let running_for = active.started.elapsed().as_secs();
            if running_for > self.config.max_job_duration_seconds {
                issues.push(format!(
                    "job {} ({}) running for {}s, limit is {}s",
                    job_id,
                    active.job_type,
                    running_for,
                    self.config.max_job_duration_seconds
                ));
            }
        }

        for (job_type, aggregates) in &state.per_type {
            if aggregates.completed > 0
                && aggregates.avg_throughput > 0.0
                && aggregates.avg_throughput < self.config.min_throughput
            {
                issues.push(format!(
                    "{} throughput {:.2} records/s below floor {:.2}",
                    job_type, aggregates.avg_throughput, self.config.min_throughput
                ));
            }
        }

        let total = state.total_completed + state.total_failed;
        if total > 0 {
            let error_rate = state.total_failed as f64 / total as f64 * 100.0;
            if error_rate > self.config.max_error_rate_pct {
                issues.push(format!(
                    "error rate {:.1}% above ceiling {:.1}%",
                    error_rate, self.config.max_error_rate_pct
                ));
            }
        }

        if state.peak_memory_pct > self.config.memory_ceiling_pct {
            issues.push(format!(
                "peak memory {:.1}% above ceiling {:.1}%",
                state.peak_memory_pct, self.config.memory_ceiling_pct
            ));
        }
        if state.peak_cpu_pct > self.config.cpu_ceiling_pct {
            issues.push(format!(
                "peak cpu {:.1}% above ceiling {:.1}%",
                state.peak_cpu_pct, self.config.cpu_ceiling_pct
            ));
        }

        issues
    }

    /// Full summary including current issues.
    pub fn summary(&self) -> MonitorSummary {
        let issues = self.check_thresholds();
        let state = self.lock();
        MonitorSummary {
            active_jobs: state.active.len(),
            total_completed: state.total_completed,
            total_failed: state.total_failed,
            per_type: state
                .per_type
                .iter()
                .map(|(job_type, aggregates)| (job_type.as_str().to_string(), *aggregates))
                .collect(),
            peak_memory_pct: state.peak_memory_pct,
            peak_cpu_pct: state.peak_cpu_pct,
            latest_resources: state.history.back().copied(),
            issues,
        }
    }

    fn lock(&self) -> MutexGuard<'_, MonitorState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> PerformanceMonitor {
        PerformanceMonitor::new(MonitorConfig::default())
    }

    #[test]
    fn rolling_average_matches_arithmetic_mean() {
        let m = monitor();
        let durations = [2.0, 4.0, 9.0, 1.0, 5.0];
        let records = 100u64;

        for duration in durations {
            let id = Uuid::new_v4();
            m.start_job_monitoring(id, JobType::Invoices);
            m.end_job_monitoring_with_duration(id, true, records, vec![], vec![], duration);
        }

        let mean: f64 = durations.iter().sum::<f64>() / durations.len() as f64;
        let throughput_mean: f64 = durations
            .iter()
            .map(|d| records as f64 / d)
            .sum::<f64>()
            / durations.len() as f64;

        let aggregates = m.type_aggregates(JobType::Invoices).unwrap();
        assert_eq!(aggregates.completed, durations.len() as u64);
        assert!((aggregates.avg_duration_seconds - mean).abs() < 1e-9);
        assert!((aggregates.avg_throughput - throughput_mean).abs() < 1e-9);
    }

    #[test]
    fn end_monitoring_unknown_job_is_none() {
        let m = monitor();
        assert!(
            m.end_job_monitoring(Uuid::new_v4(), true, 0, vec![], vec![])
                .is_none()
        );
    }

    #[test]
    fn failures_count_separately_from_completions() {
        let m = monitor();

        let ok = Uuid::new_v4();
        m.start_job_monitoring(ok, JobType::Deliveries);
        m.end_job_monitoring(ok, true, 10, vec![], vec![]);

        let bad = Uuid::new_v4();
        m.start_job_monitoring(bad, JobType::Deliveries);
        m.end_job_monitoring(bad, false, 0, vec!["boom".to_string()], vec![]);

        let summary = m.summary();
        assert_eq!(summary.total_completed, 1);
        assert_eq!(summary.total_failed, 1);
        let aggregates = summary.per_type.get("deliveries").unwrap();
        assert_eq!(aggregates.completed, 1);
        assert_eq!(aggregates.failed, 1);
    }

    #[test]
    fn job_record_keeps_errors_warnings_counters_and_samples() {
        let m = monitor();
        let id = Uuid::new_v4();

        m.start_job_monitoring(id, JobType::Invoices);
        m.record_resource_sample(40.0, 20.0);
        m.record_job_counters(id, 7, 2);

        // In flight: counters and samples visible, no outcome yet.
        let running = m.job_record(id).unwrap();
        assert_eq!(running.success, None);
        assert_eq!(running.db_operations, 7);
        assert_eq!(running.resource_samples.len(), 1);

        m.end_job_monitoring(
            id,
            false,
            0,
            vec!["partner rejected fetch: invalid window".to_string()],
            vec!["audit row write retried: timeout".to_string()],
        );

        let record = m.job_record(id).unwrap();
        assert_eq!(record.success, Some(false));
        assert_eq!(record.db_operations, 7);
        assert_eq!(record.api_calls, 2);
        assert_eq!(record.errors.len(), 1);
        assert!(record.errors[0].contains("invalid window"));
        assert_eq!(record.warnings.len(), 1);
        assert_eq!(record.resource_samples.len(), 1);
        assert!(record.ended_at.is_some());
    }

    #[test]
    fn finished_records_fall_out_of_bounded_history() {
        let config = MonitorConfig {
            history_capacity: 2,
            ..MonitorConfig::default()
        };
        let m = PerformanceMonitor::new(config);

        let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            m.start_job_monitoring(*id, JobType::ServiceOrders);
            m.end_job_monitoring(*id, true, 1, vec![], vec![]);
        }

        assert!(m.job_record(ids[0]).is_none());
        assert!(m.job_record(ids[1]).is_some());
        assert!(m.job_record(ids[2]).is_some());
    }

    #[test]
    fn history_is_bounded() {
        let config = MonitorConfig {
            history_capacity: 4,
            ..MonitorConfig::default()
        };
        let m = PerformanceMonitor::new(config);

        for i in 0..10 {
            m.record_resource_sample(i as f64, i as f64);
        }

        let summary = m.summary();
        assert_eq!(summary.latest_resources.unwrap().memory_pct, 9.0);
        assert_eq!(summary.peak_memory_pct, 9.0);
        // Internal history trimmed to capacity.
        assert_eq!(m.lock().history.len(), 4);
    }

    #[test]
    fn error_rate_threshold_raises_issue() {
        let config = MonitorConfig {
            max_error_rate_pct: 25.0,
            ..MonitorConfig::default()
        };
        let m = PerformanceMonitor::new(config);

        for success in [false, false, true] {
            let id = Uuid::new_v4();
            m.start_job_monitoring(id, JobType::ServiceOrders);
            m.end_job_monitoring(id, success, 5, vec![], vec![]);
        }

        let issues = m.check_thresholds();
        assert!(
            issues.iter().any(|i| i.contains("error rate")),
            "issues: {:?}",
            issues
        );
    }

    #[test]
    fn peak_memory_threshold_raises_issue() {
        let m = monitor();
        m.record_resource_sample(99.0, 10.0);
        let issues = m.check_thresholds();
        assert!(issues.iter().any(|i| i.contains("peak memory")));
    }
}
