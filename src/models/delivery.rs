//! Delivery entity model
//!
//! The delivery number is the natural key, unique per dealer.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Delivery entity representing a vehicle hand-over
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "deliveries")]
pub struct Model {
    /// Unique identifier for the delivery (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dealer the delivery belongs to
    pub dealer_id: Uuid,

    /// Partner-side delivery number (natural key within a dealer)
    pub delivery_no: String,

    /// Vehicle identification number
    pub vin: Option<String>,

    /// Customer display name
    pub customer_name: Option<String>,

    /// Advisor handling the hand-over
    pub advisor: Option<String>,

    /// Timestamp the vehicle was handed over
    pub delivered_at: Option<DateTimeWithTimeZone>,

    /// Timestamp when the row was created
    pub created_at: DateTimeWithTimeZone,

    /// Timestamp when the row was last updated
    pub updated_at: DateTimeWithTimeZone,
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
