//! # Data Models
//!
//! SeaORM entity models for the ingestion engine's persisted tables.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod dealer;
pub mod delivery;
pub mod fetch_log;
pub mod invoice;
pub mod service_order;
pub mod service_order_item;

pub use dealer::Entity as Dealer;
pub use delivery::Entity as Delivery;
pub use fetch_log::Entity as FetchLog;
pub use invoice::Entity as Invoice;
pub use service_order::Entity as ServiceOrder;
pub use service_order_item::Entity as ServiceOrderItem;

/// Basic service information response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ServiceInfo {
    /// The name of the service
    pub service: String,
    /// The version of the service
    pub version: String,
}

impl Default for ServiceInfo {
    fn default() -> Self {
        Self {
            service: "dealersync".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}
