//! Database migrations for the dealersync ingestion engine.
//!
//! This module contains all database migrations using SeaORM Migration.

pub use sea_orm_migration::prelude::*;

mod m2025_05_01_000001_create_dealers;
mod m2025_05_01_000002_create_fetch_logs;
mod m2025_05_01_000003_create_service_orders;
mod m2025_05_01_000004_create_invoices;
mod m2025_05_01_000005_create_deliveries;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m2025_05_01_000001_create_dealers::Migration),
            Box::new(m2025_05_01_000002_create_fetch_logs::Migration),
            Box::new(m2025_05_01_000003_create_service_orders::Migration),
            Box::new(m2025_05_01_000004_create_invoices::Migration),
            Box::new(m2025_05_01_000005_create_deliveries::Migration),
        ]
    }
}
