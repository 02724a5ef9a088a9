//! Migration to create the fetch_logs table.
//!
//! One append-only row is written per ingestion attempt, success or failure,
//! independent of the business records themselves.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(FetchLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(FetchLogs::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(FetchLogs::DealerId).uuid().not_null())
                    .col(ColumnDef::new(FetchLogs::JobType).text().not_null())
                    .col(ColumnDef::new(FetchLogs::Status).text().not_null())
                    .col(
                        ColumnDef::new(FetchLogs::RecordsFetched)
                            .big_integer()
                            .not_null()
                            .default(0),
                    )
                    .col(ColumnDef::new(FetchLogs::ErrorMessage).text().null())
                    .col(ColumnDef::new(FetchLogs::DurationSeconds).double().null())
                    .col(
                        ColumnDef::new(FetchLogs::StartedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(FetchLogs::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_fetch_logs_dealer_id")
                            .from(FetchLogs::Table, FetchLogs::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_fetch_logs_dealer_type_started")
                    .table(FetchLogs::Table)
                    .col(FetchLogs::DealerId)
                    .col(FetchLogs::JobType)
                    .col(FetchLogs::StartedAt)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_fetch_logs_dealer_type_started")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(FetchLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum FetchLogs {
    Table,
    Id,
    DealerId,
    JobType,
    Status,
    RecordsFetched,
    ErrorMessage,
    DurationSeconds,
    StartedAt,
    CompletedAt,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
