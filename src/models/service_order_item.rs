//! ServiceOrderItem entity model
//!
//! Child line items of a service order, inserted only when the parent order
//! is first created.

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;

/// ServiceOrderItem entity representing one line item on an order
#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "service_order_items")]
pub struct Model {
    /// Unique identifier for the line item (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Parent service order
    pub order_id: Uuid,

    /// Labour or part code
    pub item_code: String,

    /// Human-readable item name
    pub item_name: Option<String>,

    /// Quantity on the line
    pub quantity: f64,

    /// Unit price on the line
    pub unit_price: f64,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::service_order::Entity",
        from = "Column::OrderId",
        to = "super::service_order::Column::Id"
    )]
    Order,
}

impl Related<super::service_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Order.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
