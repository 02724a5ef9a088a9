//! FetchLog entity model
//!
//! One append-only audit row per ingestion attempt, success or failure.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// FetchLog entity capturing the outcome of a single ingestion attempt
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "fetch_logs")]
pub struct Model {
    /// Unique identifier for the log row (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dealer the attempt ran for
    pub dealer_id: Uuid,

    /// Job type key (service_orders, invoices, deliveries)
    pub job_type: String,

    /// Outcome of the attempt (completed, failed, skipped)
    pub status: String,

    /// Number of records fetched from the partner API
    pub records_fetched: i64,

    /// Error text when the attempt failed
    pub error_message: Option<String>,

    /// Wall-clock duration of the attempt in seconds
    pub duration_seconds: Option<f64>,

    /// Timestamp when the attempt started
    pub started_at: DateTimeWithTimeZone,

    /// Timestamp when the attempt finished
    pub completed_at: Option<DateTimeWithTimeZone>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "Dealer",
        from = "Column::DealerId",
        to = "super::dealer::Column::Id"
    )]
    Dealer,
}

impl Related<Dealer> for Entity {
    fn to() -> RelationDef {
        Relation::Dealer.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
