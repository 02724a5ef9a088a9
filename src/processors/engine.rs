//! Shared execution template for all batch processors.
//!
//! `run_ingest` drives a single attempt through the fixed sequence: probe the
//! pool, resolve the dealer, default the window, fetch (live or synthetic),
//! validate the envelope, upsert inside one transaction, and always finish by
//! writing exactly one audit row.
//!
//! Failure policy per step: a probe failure after bounded retries fails the
//! attempt; a missing dealer is fatal; an inactive dealer is a skip, not a
//! failure; any fetch failure collapses to the uniform `{status: 0, message}`
//! shape before validation; a persistence failure rolls the transaction back
//! before the failed audit row is written.

use std::time::{Duration, Instant};

use chrono::Utc;
use sea_orm::{DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use crate::client::{PartnerClient, PartnerResponse};
use crate::db;
use crate::error::IngestError;
use crate::models::dealer::Model as DealerModel;
use crate::processors::trait_::RecordProcessor;
use crate::processors::{ExecutionReport, TimeWindow};
use crate::repositories::fetch_log::{AttemptRecord, AttemptStatus, FetchLogRepository};

/// Probe retries before the attempt is declared unable to reach the database.
const LIVENESS_RETRIES: u32 = 3;
const LIVENESS_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Drives processor executions against one database pool and partner client.
#[derive(Clone)]
pub struct IngestEngine {
    db: DatabaseConnection,
    client: PartnerClient,
}

struct AttemptFailure {
    error: IngestError,
    records_fetched: i64,
}

/// Counters and warnings accumulated across one attempt, folded into the
/// final report for the performance monitor.
#[derive(Default)]
struct AttemptMetrics {
    db_operations: u64,
    api_calls: u64,
    warnings: Vec<String>,
}

impl AttemptMetrics {
    fn fold_into(self, mut report: ExecutionReport) -> ExecutionReport {
        report.db_operations = self.db_operations;
        report.api_calls = self.api_calls;
        report.warnings = self.warnings;
        report
    }
}

impl IngestEngine {
    pub fn new(db: DatabaseConnection, client: PartnerClient) -> Self {
        Self { db, client }
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn client(&self) -> &PartnerClient {
        &self.client
    }

    /// Runs one ingestion attempt end to end. Never returns an error: every
    /// outcome, including internal failures, is folded into the report, and
    /// an audit row is written for every attempt that reached a resolvable
    /// dealer.
    pub async fn run_ingest(
        &self,
        processor: &dyn RecordProcessor,
        dealer_id: Uuid,
        window: Option<TimeWindow>,
        extra: &serde_json::Value,
    ) -> ExecutionReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let job_type = processor.job_type();
        let mut metrics = AttemptMetrics::default();

        // Step 1: the pool must answer a trivial probe before we begin.
        if !self.await_liveness(&mut metrics).await {
            tracing::error!(dealer_id = %dealer_id, %job_type, "Database liveness probe failed");
            return metrics.fold_into(ExecutionReport::failed(
                "database liveness probe failed".to_string(),
                start.elapsed().as_secs_f64(),
            ));
        }

        // Step 2: resolve the dealer.
        metrics.db_operations += 1;
        let dealer = {
            let repo = crate::repositories::dealer::DealerRepository::new(&self.db);
            match repo.resolve_for_ingest(dealer_id).await {
                Ok(dealer) => dealer,
                Err(IngestError::DealerInactive { .. }) => {
                    // A skip is not a processing failure: record it as such.
                    let duration = start.elapsed().as_secs_f64();
                    self.write_audit(
                        &mut metrics,
                        AttemptRecord {
                            dealer_id,
                            job_type: job_type.as_str().to_string(),
                            status: AttemptStatus::Skipped,
                            records_fetched: 0,
                            error_message: None,
                            duration_seconds: Some(duration),
                            started_at,
                            completed_at: Some(Utc::now()),
                        },
                    )
                    .await;
                    return metrics
                        .fold_into(ExecutionReport::skipped("inactive".to_string(), duration));
                }
                Err(err) => {
                    // Missing dealer: fatal, and no audit row can reference it.
                    tracing::error!(dealer_id = %dealer_id, %job_type, error = %err, "Dealer resolution failed");
                    return metrics.fold_into(ExecutionReport::failed(
                        err.to_string(),
                        start.elapsed().as_secs_f64(),
                    ));
                }
            }
        };

        // Step 3: window defaulting is the processor's call.
        let window = window.unwrap_or_else(|| processor.default_window());

        match self
            .fetch_and_persist(&mut metrics, processor, &dealer, &window, extra)
            .await
        {
            Ok(processed) => {
                let duration = start.elapsed().as_secs_f64();
                tracing::info!(
                    dealer_id = %dealer_id,
                    %job_type,
                    records = processed,
                    duration_seconds = duration,
                    "Ingestion completed"
                );
                self.write_audit(
                    &mut metrics,
                    AttemptRecord {
                        dealer_id,
                        job_type: job_type.as_str().to_string(),
                        status: AttemptStatus::Completed,
                        records_fetched: processed as i64,
                        error_message: None,
                        duration_seconds: Some(duration),
                        started_at,
                        completed_at: Some(Utc::now()),
                    },
                )
                .await;
                metrics.fold_into(ExecutionReport::completed(processed, duration))
            }
            Err(failure) => {
                let duration = start.elapsed().as_secs_f64();
                let error_text = failure.error.to_string();
                tracing::warn!(
                    dealer_id = %dealer_id,
                    %job_type,
                    error = %error_text,
                    duration_seconds = duration,
                    "Ingestion failed"
                );
                self.write_audit(
                    &mut metrics,
                    AttemptRecord {
                        dealer_id,
                        job_type: job_type.as_str().to_string(),
                        status: AttemptStatus::Failed,
                        records_fetched: failure.records_fetched,
                        error_message: Some(error_text.clone()),
                        duration_seconds: Some(duration),
                        started_at,
                        completed_at: Some(Utc::now()),
                    },
                )
                .await;
                metrics.fold_into(ExecutionReport::failed(error_text, duration))
            }
        }
    }

    /// Steps 4 through 7 minus the audit row: fetch, validate, persist, commit.
    async fn fetch_and_persist(
        &self,
        metrics: &mut AttemptMetrics,
        processor: &dyn RecordProcessor,
        dealer: &DealerModel,
        window: &TimeWindow,
        extra: &serde_json::Value,
    ) -> Result<u64, AttemptFailure> {
        // Step 4: live fetch, or deterministic synthetic data for demo and
        // credential-less dealers. Every fetch failure becomes the uniform
        // {status: 0, message} shape.
        let payload = if dealer.demo || !dealer.has_credentials() {
            processor.synthetic_payload(dealer, window)
        } else {
            metrics.api_calls += 1;
            match processor.fetch(&self.client, dealer, window, extra).await {
                Ok(payload) => payload,
                Err(err) => PartnerResponse {
                    status: 0,
                    message: Some(err.to_string()),
                    data: None,
                },
            }
        };

        // Step 5: the envelope's own status flag decides.
        if payload.status != 1 {
            return Err(AttemptFailure {
                error: IngestError::FetchRejected {
                    message: payload
                        .message
                        .unwrap_or_else(|| "no message provided".to_string()),
                },
                records_fetched: 0,
            });
        }

        let records = payload.records().map_err(|error| AttemptFailure {
            error,
            records_fetched: 0,
        })?;
        let fetched = records.len() as i64;

        // Step 6 + 7: one transaction per attempt; roll back on any error.
        metrics.db_operations += 1;
        let txn = self.db.begin().await.map_err(|db_err| AttemptFailure {
            error: IngestError::Database(db_err),
            records_fetched: fetched,
        })?;

        match processor
            .transform_and_store(&txn, dealer.id, &records)
            .await
        {
            Ok(outcome) => {
                txn.commit().await.map_err(|db_err| AttemptFailure {
                    error: IngestError::TransactionAborted {
                        details: db_err.to_string(),
                    },
                    records_fetched: fetched,
                })?;
                Ok(outcome.total())
            }
            Err(error) => {
                if let Err(rollback_err) = txn.rollback().await {
                    tracing::error!(
                        dealer_id = %dealer.id,
                        error = %rollback_err,
                        "Rollback after persistence failure also failed"
                    );
                }
                Err(AttemptFailure {
                    error,
                    records_fetched: fetched,
                })
            }
        }
    }

    async fn await_liveness(&self, metrics: &mut AttemptMetrics) -> bool {
        for attempt in 0..LIVENESS_RETRIES {
            metrics.db_operations += 1;
            if db::is_connection_healthy(&self.db).await {
                return true;
            }
            tracing::warn!(attempt = attempt + 1, "Database liveness probe failed, retrying");
            tokio::time::sleep(LIVENESS_RETRY_DELAY).await;
        }
        false
    }

    /// Writes the attempt's audit row, recovering once on a fresh pooled
    /// connection when the first write fails. A probe failure only tells us
    /// the session state is unknown, so the retry is attempted regardless;
    /// if both writes fail the loss is logged and the attempt's report is
    /// still returned to the caller.
    async fn write_audit(&self, metrics: &mut AttemptMetrics, attempt: AttemptRecord) {
        let repo = FetchLogRepository::new(&self.db);
        metrics.db_operations += 1;
        if let Err(first_err) = repo.record_attempt(attempt.clone()).await {
            tracing::warn!(
                dealer_id = %attempt.dealer_id,
                error = %first_err,
                "Audit row write failed, probing for a fresh connection"
            );
            metrics
                .warnings
                .push(format!("audit row write retried: {}", first_err));

            let fresh = db::probe_fresh_transaction(&self.db).await;
            if !fresh {
                tracing::warn!("Fresh-transaction probe failed before audit retry");
            }

            metrics.db_operations += 1;
            if let Err(second_err) = repo.record_attempt(attempt.clone()).await {
                tracing::error!(
                    dealer_id = %attempt.dealer_id,
                    job_type = %attempt.job_type,
                    error = %second_err,
                    "Audit row lost after recovery attempt"
                );
            }
        }
    }
}
