//! Batch processors: one per partner record type.
//!
//! A processor owns the record-type specifics (endpoint, time-window default,
//! payload transformation, synthetic data for demo dealers); the shared
//! execution template lives in [`engine`].

pub mod deliveries;
pub mod engine;
pub(crate) mod fields;
pub mod invoices;
pub mod registry;
pub mod service_orders;
pub mod trait_;

use chrono::{NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::IngestError;

pub use engine::IngestEngine;
pub use registry::ProcessorRegistry;
pub use trait_::RecordProcessor;

/// Record types the engine knows how to ingest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ServiceOrders,
    Invoices,
    Deliveries,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ServiceOrders => "service_orders",
            JobType::Invoices => "invoices",
            JobType::Deliveries => "deliveries",
        }
    }

    pub fn parse(value: &str) -> Result<Self, IngestError> {
        match value {
            "service_orders" => Ok(JobType::ServiceOrders),
            "invoices" => Ok(JobType::Invoices),
            "deliveries" => Ok(JobType::Deliveries),
            other => Err(IngestError::UnknownJobType {
                value: other.to_string(),
            }),
        }
    }

    pub fn all() -> [JobType; 3] {
        [JobType::ServiceOrders, JobType::Invoices, JobType::Deliveries]
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The [from, to] range of records requested per fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TimeWindow {
    /// Inclusive start, partner-local naive time.
    #[schema(value_type = String, example = "2026-08-25 00:00:00")]
    pub from: NaiveDateTime,
    /// Inclusive end, partner-local naive time.
    #[schema(value_type = String, example = "2026-08-25 23:59:59")]
    pub to: NaiveDateTime,
}

/// Wire format the partner expects for window bounds.
pub const WINDOW_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

impl TimeWindow {
    pub fn new(from: NaiveDateTime, to: NaiveDateTime) -> Self {
        Self { from, to }
    }

    /// Today from 00:00:00 through 23:59:59.
    pub fn today_full_day() -> Self {
        Self::today_between(
            NaiveTime::from_hms_opt(0, 0, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default(),
        )
    }

    /// Today between the given start and end times.
    pub fn today_between(start: NaiveTime, end: NaiveTime) -> Self {
        let today = Utc::now().date_naive();
        Self {
            from: today.and_time(start),
            to: today.and_time(end),
        }
    }

    pub fn format_from(&self) -> String {
        self.from.format(WINDOW_FORMAT).to_string()
    }

    pub fn format_to(&self) -> String {
        self.to.format(WINDOW_FORMAT).to_string()
    }
}

/// Terminal outcome of a single processor execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExecutionStatus {
    Completed,
    Skipped { reason: String },
    Failed { error: String },
}

/// What one ingestion attempt produced, success or not.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ExecutionReport {
    #[serde(flatten)]
    pub status: ExecutionStatus,
    pub records_processed: u64,
    pub duration_seconds: f64,
    /// Error messages collected during the attempt.
    #[serde(default)]
    pub errors: Vec<String>,
    /// Non-fatal anomalies, e.g. a retried audit write.
    #[serde(default)]
    pub warnings: Vec<String>,
    /// Database round trips made by the attempt.
    #[serde(default)]
    pub db_operations: u64,
    /// Partner API calls made by the attempt.
    #[serde(default)]
    pub api_calls: u64,
}

impl ExecutionReport {
    pub fn completed(records_processed: u64, duration_seconds: f64) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            records_processed,
            duration_seconds,
            errors: Vec::new(),
            warnings: Vec::new(),
            db_operations: 0,
            api_calls: 0,
        }
    }

    pub fn skipped(reason: String, duration_seconds: f64) -> Self {
        Self {
            status: ExecutionStatus::Skipped { reason },
            records_processed: 0,
            duration_seconds,
            errors: Vec::new(),
            warnings: Vec::new(),
            db_operations: 0,
            api_calls: 0,
        }
    }

    pub fn failed(error: String, duration_seconds: f64) -> Self {
        Self {
            errors: vec![error.clone()],
            status: ExecutionStatus::Failed { error },
            records_processed: 0,
            duration_seconds,
            warnings: Vec::new(),
            db_operations: 0,
            api_calls: 0,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, ExecutionStatus::Failed { .. })
    }
}
