//! # Fetch Log Repository
//!
//! Append-only audit rows, one per ingestion attempt. Writes happen after the
//! batch transaction has committed or rolled back, never inside it.

use crate::error::IngestError;
use crate::models::fetch_log::{ActiveModel as FetchLogActiveModel, Model as FetchLogModel};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use uuid::Uuid;

/// Terminal status recorded in an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Completed,
    Failed,
    Skipped,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Completed => "completed",
            AttemptStatus::Failed => "failed",
            AttemptStatus::Skipped => "skipped",
        }
    }
}

/// One attempt's audit data, assembled by the ingestion engine.
#[derive(Debug, Clone)]
pub struct AttemptRecord {
    pub dealer_id: Uuid,
    pub job_type: String,
    pub status: AttemptStatus,
    pub records_fetched: i64,
    pub error_message: Option<String>,
    pub duration_seconds: Option<f64>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Repository for FetchLog database operations
pub struct FetchLogRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> FetchLogRepository<'a> {
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Appends one audit row for a finished attempt.
    pub async fn record_attempt(
        &self,
        attempt: AttemptRecord,
    ) -> Result<FetchLogModel, IngestError> {
        let row = FetchLogActiveModel {
            id: Set(Uuid::new_v4()),
            dealer_id: Set(attempt.dealer_id),
            job_type: Set(attempt.job_type),
            status: Set(attempt.status.as_str().to_string()),
            records_fetched: Set(attempt.records_fetched),
            error_message: Set(attempt.error_message),
            duration_seconds: Set(attempt.duration_seconds),
            started_at: Set(attempt.started_at.into()),
            completed_at: Set(attempt.completed_at.map(Into::into)),
        };

        Ok(row.insert(self.db).await?)
    }
}
