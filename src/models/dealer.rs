//! Dealer entity model
//!
//! This module contains the SeaORM entity model for the dealers table. A
//! dealer is a tenant of the ingestion engine; the engine reads these rows
//! but never mutates them (the account service owns them).

use sea_orm::ActiveModelBehavior;
use sea_orm::entity::prelude::*;
use sea_orm::prelude::DateTimeWithTimeZone;

/// Dealer entity representing an independently-credentialed tenant
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "dealers")]
pub struct Model {
    /// Unique identifier for the dealer (primary key)
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Display name for the dealer
    pub name: String,

    /// Partner API key, absent for dealers without live credentials
    pub api_key: Option<String>,

    /// Partner API secret paired with the key
    pub api_secret: Option<String>,

    /// Inactive dealers are skipped by the ingestion engine
    pub active: bool,

    /// Demo dealers receive synthetic data instead of live fetches
    pub demo: bool,

    /// Timestamp when the dealer was created
    pub created_at: DateTimeWithTimeZone,
}

impl Model {
    /// True when the dealer carries a usable key/secret pair.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (self.api_key.as_deref(), self.api_secret.as_deref()),
            (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty()
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
