//! ServiceOrder entity model
//!
//! Parent record for a workshop service order. The order number is the
//! natural key, unique per dealer; repeated fetches of the same window update
//! the parent in place and never re-insert its line items.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// ServiceOrder entity representing a dealer workshop order
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "service_orders")]
pub struct Model {
    /// Unique identifier for the order (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dealer the order belongs to
    pub dealer_id: Uuid,

    /// Partner-side order number (natural key within a dealer)
    pub order_no: String,

    /// Vehicle identification number
    pub vin: Option<String>,

    /// Customer display name
    pub customer_name: Option<String>,

    /// Customer phone number
    pub customer_phone: Option<String>,

    /// Service advisor handling the order
    pub advisor: Option<String>,

    /// Total order amount
    pub total_amount: f64,

    /// Timestamp the order was placed in the partner system
    pub ordered_at: Option<DateTimeWithTimeZone>,

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
    #[sea_orm(has_many = "super::service_order_item::Entity")]
    Items,
}

impl Related<Dealer> for Entity {
    fn to() -> RelationDef {
        Relation::Dealer.def()
    }
}

impl Related<super::service_order_item::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Items.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
