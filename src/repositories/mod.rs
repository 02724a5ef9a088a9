//! Repository layer for database operations.
//!
//! Record upserts are generic over [`sea_orm::ConnectionTrait`] so they can
//! run inside the per-batch transaction; dealer lookups and audit writes run
//! on the pooled connection directly.

pub mod dealer;
pub mod delivery;
pub mod fetch_log;
pub mod invoice;
pub mod service_order;

/// Rows written per `insert_many` statement during batch upserts.
pub const INSERT_CHUNK_SIZE: usize = 200;

/// Outcome of a batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub inserted: u64,
    pub updated: u64,
}

impl UpsertOutcome {
    pub fn total(&self) -> u64 {
        self.inserted + self.updated
    }
}
