//! Migration to create the service_orders and service_order_items tables.
//!
//! The order number is the natural key, unique per dealer; line items hang off
//! the parent order and are only written when the parent is first created.

use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ServiceOrders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceOrders::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServiceOrders::DealerId).uuid().not_null())
                    .col(ColumnDef::new(ServiceOrders::OrderNo).text().not_null())
                    .col(ColumnDef::new(ServiceOrders::Vin).text().null())
                    .col(ColumnDef::new(ServiceOrders::CustomerName).text().null())
                    .col(ColumnDef::new(ServiceOrders::CustomerPhone).text().null())
                    .col(ColumnDef::new(ServiceOrders::Advisor).text().null())
                    .col(
                        ColumnDef::new(ServiceOrders::TotalAmount)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .col(
                        ColumnDef::new(ServiceOrders::OrderedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(ServiceOrders::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        ColumnDef::new(ServiceOrders::UpdatedAt)
                            .timestamp_with_time_zone()
                            .not_null()
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_orders_dealer_id")
                            .from(ServiceOrders::Table, ServiceOrders::DealerId)
                            .to(Dealers::Table, Dealers::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_service_orders_dealer_order_no")
                    .table(ServiceOrders::Table)
                    .col(ServiceOrders::DealerId)
                    .col(ServiceOrders::OrderNo)
                    .unique()
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(ServiceOrderItems::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ServiceOrderItems::Id)
                            .uuid()
                            .not_null()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ServiceOrderItems::OrderId).uuid().not_null())
                    .col(ColumnDef::new(ServiceOrderItems::ItemCode).text().not_null())
                    .col(ColumnDef::new(ServiceOrderItems::ItemName).text().null())
                    .col(
                        ColumnDef::new(ServiceOrderItems::Quantity)
                            .double()
                            .not_null()
                            .default(1.0),
                    )
                    .col(
                        ColumnDef::new(ServiceOrderItems::UnitPrice)
                            .double()
                            .not_null()
                            .default(0.0),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_service_order_items_order_id")
                            .from(ServiceOrderItems::Table, ServiceOrderItems::OrderId)
                            .to(ServiceOrders::Table, ServiceOrders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_service_order_items_order_id")
                    .table(ServiceOrderItems::Table)
                    .col(ServiceOrderItems::OrderId)
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_index(
                Index::drop()
                    .name("idx_service_order_items_order_id")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ServiceOrderItems::Table).to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("uq_service_orders_dealer_order_no")
                    .to_owned(),
            )
            .await?;

        manager
            .drop_table(Table::drop().table(ServiceOrders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
enum ServiceOrders {
    Table,
    Id,
    DealerId,
    OrderNo,
    Vin,
    CustomerName,
    CustomerPhone,
    Advisor,
    TotalAmount,
    OrderedAt,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum ServiceOrderItems {
    Table,
    Id,
    OrderId,
    ItemCode,
    ItemName,
    Quantity,
    UnitPrice,
}

#[derive(DeriveIden)]
enum Dealers {
    Table,
    Id,
}
