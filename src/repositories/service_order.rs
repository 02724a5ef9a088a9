//! # Service Order Repository
//!
//! Idempotent upserts keyed on (dealer_id, order_no). New orders are inserted
//! together with their line items; orders seen before get their parent fields
//! updated in place and keep their original items.

use std::collections::HashMap;

use crate::error::{IngestError, is_unique_violation};
use crate::models::service_order::{
    ActiveModel as OrderActiveModel, Column, Entity as ServiceOrder, Model as OrderModel,
};
use crate::models::service_order_item::ActiveModel as ItemActiveModel;
use crate::models::service_order_item::Entity as ServiceOrderItem;
use crate::repositories::{INSERT_CHUNK_SIZE, UpsertOutcome};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};
use uuid::Uuid;

/// One line item on an incoming order.
#[derive(Debug, Clone)]
pub struct ServiceOrderItemRecord {
    pub item_code: String,
    pub item_name: Option<String>,
    pub quantity: f64,
    pub unit_price: f64,
}

/// One incoming order, already transformed from the partner payload.
#[derive(Debug, Clone)]
pub struct ServiceOrderRecord {
    pub order_no: String,
    pub vin: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub advisor: Option<String>,
    pub total_amount: f64,
    pub ordered_at: Option<DateTimeWithTimeZone>,
    pub items: Vec<ServiceOrderItemRecord>,
}

/// Upserts a batch of orders inside the caller's transaction.
///
/// Duplicate order numbers within the batch collapse to the last occurrence.
/// New rows go through chunked `insert_many`; a unique violation (concurrent
/// writer) drops to a row-by-row fallback for the affected chunk.
pub async fn upsert_batch<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    records: &[ServiceOrderRecord],
) -> Result<UpsertOutcome, IngestError> {
    if records.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let mut deduped: HashMap<&str, &ServiceOrderRecord> = HashMap::new();
    for record in records {
        deduped.insert(record.order_no.as_str(), record);
    }

    let keys: Vec<String> = deduped.keys().map(|k| k.to_string()).collect();
    let existing: HashMap<String, OrderModel> = ServiceOrder::find()
        .filter(Column::DealerId.eq(dealer_id))
        .filter(Column::OrderNo.is_in(keys))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.order_no.clone(), m))
        .collect();

    let mut outcome = UpsertOutcome::default();
    let now = Utc::now();
    let mut fresh: Vec<&ServiceOrderRecord> = Vec::new();

    for record in deduped.values() {
        match existing.get(&record.order_no) {
            Some(current) => {
                update_parent(conn, current.clone(), record, now.into()).await?;
                outcome.updated += 1;
            }
            None => fresh.push(record),
        }
    }

    for chunk in fresh.chunks(INSERT_CHUNK_SIZE) {
        match insert_chunk(conn, dealer_id, chunk, now.into()).await {
            Ok(count) => outcome.inserted += count,
            Err(IngestError::Database(db_err)) if is_unique_violation(&db_err) => {
                tracing::debug!(
                    dealer_id = %dealer_id,
                    chunk_len = chunk.len(),
                    "Batch insert hit unique violation, falling back to row-by-row"
                );
                outcome.inserted += insert_rows_individually(conn, dealer_id, chunk, &mut outcome)
                    .await?;
            }
            Err(other) => return Err(other),
        }
    }

    Ok(outcome)
}

async fn update_parent<C: ConnectionTrait>(
    conn: &C,
    current: OrderModel,
    record: &ServiceOrderRecord,
    now: DateTimeWithTimeZone,
) -> Result<(), IngestError> {
    let mut active = current.into_active_model();
    active.vin = Set(record.vin.clone());
    active.customer_name = Set(record.customer_name.clone());
    active.customer_phone = Set(record.customer_phone.clone());
    active.advisor = Set(record.advisor.clone());
    active.total_amount = Set(record.total_amount);
    active.ordered_at = Set(record.ordered_at);
    active.updated_at = Set(now);
    active.update(conn).await?;
    Ok(())
}

async fn insert_chunk<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    chunk: &[&ServiceOrderRecord],
    now: DateTimeWithTimeZone,
) -> Result<u64, IngestError> {
    if chunk.is_empty() {
        return Ok(0);
    }

    let mut parents = Vec::with_capacity(chunk.len());
    let mut items = Vec::new();

    for record in chunk {
        let order_id = Uuid::new_v4();
        parents.push(order_active_model(order_id, dealer_id, record, now));
        for item in &record.items {
            items.push(item_active_model(order_id, item));
        }
    }

    ServiceOrder::insert_many(parents).exec(conn).await?;
    if !items.is_empty() {
        ServiceOrderItem::insert_many(items).exec(conn).await?;
    }

    Ok(chunk.len() as u64)
}

/// Row-by-row fallback: re-checks existence per order so a concurrent insert
/// turns into an update instead of a failure.
async fn insert_rows_individually<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    chunk: &[&ServiceOrderRecord],
    outcome: &mut UpsertOutcome,
) -> Result<u64, IngestError> {
    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut inserted = 0;

    for record in chunk {
        let current = ServiceOrder::find()
            .filter(Column::DealerId.eq(dealer_id))
            .filter(Column::OrderNo.eq(record.order_no.clone()))
            .one(conn)
            .await?;

        match current {
            Some(model) => {
                update_parent(conn, model, record, now).await?;
                outcome.updated += 1;
            }
            None => {
                let order_id = Uuid::new_v4();
                order_active_model(order_id, dealer_id, record, now)
                    .insert(conn)
                    .await
                    .map_err(|db_err| {
                        if is_unique_violation(&db_err) {
                            IngestError::IntegrityConflict {
                                key: format!("service_orders({}, {})", dealer_id, record.order_no),
                            }
                        } else {
                            IngestError::Database(db_err)
                        }
                    })?;
                for item in &record.items {
                    item_active_model(order_id, item).insert(conn).await?;
                }
                inserted += 1;
            }
        }
    }

    Ok(inserted)
}

fn order_active_model(
    order_id: Uuid,
    dealer_id: Uuid,
    record: &ServiceOrderRecord,
    now: DateTimeWithTimeZone,
) -> OrderActiveModel {
    OrderActiveModel {
        id: Set(order_id),
        dealer_id: Set(dealer_id),
        order_no: Set(record.order_no.clone()),
        vin: Set(record.vin.clone()),
        customer_name: Set(record.customer_name.clone()),
        customer_phone: Set(record.customer_phone.clone()),
        advisor: Set(record.advisor.clone()),
        total_amount: Set(record.total_amount),
        ordered_at: Set(record.ordered_at),
        created_at: Set(now),
        updated_at: Set(now),
    }
}

fn item_active_model(order_id: Uuid, item: &ServiceOrderItemRecord) -> ItemActiveModel {
    ItemActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        item_code: Set(item.item_code.clone()),
        item_name: Set(item.item_name.clone()),
        quantity: Set(item.quantity),
        unit_price: Set(item.unit_price),
    }
}
