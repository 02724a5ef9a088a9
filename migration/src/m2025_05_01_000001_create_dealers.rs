//! Migration to create the dealers table.
//!
//! Dealers are the tenants of the ingestion engine: each carries its own
//! partner API credentials and an active flag the engine treats as read-only.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Dealers::Table)
                    .if_not_exists()
                    .col(ColumnDef::new(Dealers::Id).uuid().not_null().primary_key())
                    .col(ColumnDef::new(Dealers::Name).text().not_null())
                    .col(ColumnDef::new(Dealers::ApiKey).text().null())
                    .col(ColumnDef::new(Dealers::ApiSecret).text().null())
                    .col(
                        ColumnDef::new(Dealers::Active)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(Dealers::Demo)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(Dealers::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(Dealers::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
    Name,
    ApiKey,
    ApiSecret,
    Active,
    Demo,
    CreatedAt,
}
