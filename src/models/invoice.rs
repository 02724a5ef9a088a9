//! Invoice entity model
//!
//! The invoice number is the natural key, unique per dealer.

use super::dealer::Entity as Dealer;
use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Invoice entity representing a settled dealer invoice
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "invoices")]
pub struct Model {
    /// Unique identifier for the invoice (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Dealer the invoice belongs to
    pub dealer_id: Uuid,

    /// Partner-side invoice number (natural key within a dealer)
    pub invoice_no: String,

    /// Customer display name
    pub customer_name: Option<String>,

    /// Invoice amount before tax
    pub amount: f64,

    /// Tax amount
    pub tax_amount: f64,

    /// Timestamp the invoice was issued in the partner system
    pub invoiced_at: Option<DateTimeWithTimeZone>,

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
