//! Queue manager integration tests: dispatch concurrency, priority order,
//! resource-gated admission, cancellation, and panic containment.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use dealersync::config::QueueConfig;
use dealersync::processors::{ExecutionReport, JobType};
use dealersync::queue::{JobBody, JobPriority, JobQueueManager, JobStatus, new_job};
use uuid::Uuid;

/// Sampler interval long enough that no real sample lands during a test,
/// so `record_sample` stays in control of the gate.
const SAMPLER_NEVER_MS: u64 = 3_600_000;

fn test_config() -> QueueConfig {
    QueueConfig {
        dispatch_tick_ms: 10,
        resource_sample_interval_ms: SAMPLER_NEVER_MS,
        shutdown_grace_seconds: 5,
        ..QueueConfig::default()
    }
}

fn completed_report() -> ExecutionReport {
    ExecutionReport::completed(1, 0.0)
}

fn sleeping_body(millis: u64) -> JobBody {
    Box::new(move || {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            completed_report()
        })
    })
}

fn recording_body(log: Arc<Mutex<Vec<Uuid>>>, dealer_id: Uuid) -> JobBody {
    Box::new(move || {
        Box::pin(async move {
            log.lock().unwrap().push(dealer_id);
            completed_report()
        })
    })
}

async fn wait_for<F: Fn() -> bool>(condition: F, timeout: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

#[tokio::test]
async fn global_cap_limits_concurrent_jobs() {
    let queue = Arc::new(JobQueueManager::new(test_config()));
    queue.start();

    for _ in 0..5 {
        let job = new_job(
            Uuid::new_v4(),
            JobType::Invoices,
            JobPriority::Normal,
            90,
        );
        assert!(queue.submit(job, sleeping_body(400)));
    }

    let q = Arc::clone(&queue);
    assert!(
        wait_for(|| q.snapshot().running == 3, Duration::from_secs(2)).await,
        "expected three running jobs, got {:?}",
        queue.snapshot()
    );
    // Never above the cap while the first wave is still sleeping.
    assert!(queue.snapshot().running <= 3);

    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.snapshot().stats.jobs_processed == 5,
            Duration::from_secs(5)
        )
        .await,
        "expected all jobs to finish, got {:?}",
        queue.snapshot()
    );
    assert_eq!(queue.snapshot().stats.peak_concurrency, 3);

    queue.shutdown().await;
}

#[tokio::test]
async fn jobs_dispatch_in_priority_then_submission_order() {
    let config = QueueConfig {
        max_concurrent_jobs: 1,
        ..test_config()
    };
    let queue = Arc::new(JobQueueManager::new(config));

    // Hold the gate shut so every job is queued before dispatch begins.
    queue.resource_gate().record_sample(99.0, 99.0);
    queue.start();

    let order = Arc::new(Mutex::new(Vec::new()));
    let low = Uuid::new_v4();
    let high = Uuid::new_v4();
    let critical = Uuid::new_v4();

    for (dealer, priority) in [
        (low, JobPriority::Low),
        (high, JobPriority::High),
        (critical, JobPriority::Critical),
    ] {
        let job = new_job(dealer, JobType::ServiceOrders, priority, 120);
        assert!(queue.submit(job, recording_body(Arc::clone(&order), dealer)));
    }

    queue.resource_gate().record_sample(10.0, 10.0);

    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.snapshot().stats.jobs_processed == 3,
            Duration::from_secs(5)
        )
        .await
    );
    assert_eq!(*order.lock().unwrap(), vec![critical, high, low]);

    queue.shutdown().await;
}

#[tokio::test]
async fn closed_resource_gate_blocks_dispatch() {
    let queue = Arc::new(JobQueueManager::new(test_config()));
    queue.resource_gate().record_sample(95.0, 50.0);
    queue.start();

    let job = new_job(Uuid::new_v4(), JobType::Deliveries, JobPriority::Normal, 60);
    let job_id = job.id;
    assert!(queue.submit(job, sleeping_body(0)));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(queue.job(job_id).unwrap().status, JobStatus::Pending);
    assert!(!queue.snapshot().resource_gate_open);

    // Gate opens, job runs.
    queue.resource_gate().record_sample(10.0, 10.0);
    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.job(job_id).unwrap().status == JobStatus::Completed,
            Duration::from_secs(5)
        )
        .await
    );

    queue.shutdown().await;
}

#[tokio::test]
async fn cancelled_job_never_runs_and_frees_the_dealer_slot() {
    let queue = Arc::new(JobQueueManager::new(test_config()));
    queue.resource_gate().record_sample(99.0, 99.0);
    queue.start();

    let dealer = Uuid::new_v4();
    let ran = Arc::new(Mutex::new(Vec::new()));

    let job = new_job(dealer, JobType::Invoices, JobPriority::Normal, 90);
    let job_id = job.id;
    assert!(queue.submit(job, recording_body(Arc::clone(&ran), dealer)));

    assert_eq!(queue.cancel(job_id), Some(true));

    // The slot is free immediately: the same dealer can queue again.
    let replacement = new_job(dealer, JobType::Invoices, JobPriority::Normal, 90);
    let replacement_id = replacement.id;
    assert!(queue.submit(replacement, sleeping_body(0)));

    queue.resource_gate().record_sample(10.0, 10.0);

    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.job(replacement_id).unwrap().status == JobStatus::Completed,
            Duration::from_secs(5)
        )
        .await
    );

    assert_eq!(queue.job(job_id).unwrap().status, JobStatus::Cancelled);
    assert!(ran.lock().unwrap().is_empty(), "cancelled body must not run");
    assert_eq!(queue.snapshot().stats.jobs_cancelled, 1);

    queue.shutdown().await;
}

#[tokio::test]
async fn panicking_body_surfaces_as_failed_job() {
    let queue = Arc::new(JobQueueManager::new(test_config()));
    queue.start();

    let job = new_job(Uuid::new_v4(), JobType::Deliveries, JobPriority::Normal, 60);
    let job_id = job.id;
    let body: JobBody = Box::new(|| Box::pin(async { panic!("boom") }));
    assert!(queue.submit(job, body));

    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.job(job_id).unwrap().status == JobStatus::Failed,
            Duration::from_secs(5)
        )
        .await
    );

    let job = queue.job(job_id).unwrap();
    assert!(job.error.unwrap().contains("aborted"));
    assert_eq!(queue.snapshot().stats.jobs_failed, 1);
    // The dispatcher survived the panic and keeps dispatching.
    let next = new_job(Uuid::new_v4(), JobType::Invoices, JobPriority::Normal, 90);
    let next_id = next.id;
    assert!(queue.submit(next, sleeping_body(0)));
    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.job(next_id).unwrap().status == JobStatus::Completed,
            Duration::from_secs(5)
        )
        .await
    );

    queue.shutdown().await;
}

#[tokio::test]
async fn skipped_execution_counts_as_processed_with_reason() {
    let queue = Arc::new(JobQueueManager::new(test_config()));
    queue.start();

    let job = new_job(Uuid::new_v4(), JobType::ServiceOrders, JobPriority::Normal, 120);
    let job_id = job.id;
    let body: JobBody = Box::new(|| {
        Box::pin(async { ExecutionReport::skipped("inactive".to_string(), 0.0) })
    });
    assert!(queue.submit(job, body));

    let q = Arc::clone(&queue);
    assert!(
        wait_for(
            || q.job(job_id).unwrap().status == JobStatus::Completed,
            Duration::from_secs(5)
        )
        .await
    );

    let job = queue.job(job_id).unwrap();
    assert_eq!(job.error.as_deref(), Some("skipped: inactive"));
    assert_eq!(queue.snapshot().stats.jobs_processed, 1);
    assert_eq!(queue.snapshot().stats.jobs_failed, 0);

    queue.shutdown().await;
}
