//! # Dealer Repository
//!
//! Lookup and management operations for dealer tenants.

use crate::error::IngestError;
use crate::models::dealer::{
    ActiveModel as DealerActiveModel, Entity as Dealer, Model as DealerModel,
};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use uuid::Uuid;

/// Request data for registering a new dealer
#[derive(Debug, Clone)]
pub struct CreateDealerRequest {
    /// Display name for the dealer
    pub name: String,
    /// Partner API key, absent for demo dealers
    pub api_key: Option<String>,
    /// Partner API secret, absent for demo dealers
    pub api_secret: Option<String>,
    /// Whether the dealer runs against synthetic data
    pub demo: bool,
}

/// Repository for Dealer database operations
pub struct DealerRepository<'a> {
    db: &'a DatabaseConnection,
}

impl<'a> DealerRepository<'a> {
    /// Create a new DealerRepository with the given database connection
    pub fn new(db: &'a DatabaseConnection) -> Self {
        Self { db }
    }

    /// Register a new dealer
    pub async fn create_dealer(
        &self,
        request: CreateDealerRequest,
    ) -> Result<DealerModel, IngestError> {
        let dealer = DealerActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(request.name),
            api_key: Set(request.api_key),
            api_secret: Set(request.api_secret),
            active: Set(true),
            demo: Set(request.demo),
            created_at: Set(Utc::now().into()),
        };

        Ok(dealer.insert(self.db).await?)
    }

    /// Get dealer by ID
    pub async fn find_by_id(&self, dealer_id: Uuid) -> Result<Option<DealerModel>, IngestError> {
        Ok(Dealer::find_by_id(dealer_id).one(self.db).await?)
    }

    /// Resolve a dealer for ingestion: missing is fatal, inactive is reported
    /// separately so callers can skip without writing a failure audit row.
    pub async fn resolve_for_ingest(&self, dealer_id: Uuid) -> Result<DealerModel, IngestError> {
        let dealer = self
            .find_by_id(dealer_id)
            .await?
            .ok_or(IngestError::DealerNotFound { dealer_id })?;

        if !dealer.active {
            return Err(IngestError::DealerInactive { dealer_id });
        }

        Ok(dealer)
    }
}
