//! # Delivery Repository
//!
//! Idempotent upserts keyed on (dealer_id, delivery_no).

use std::collections::HashMap;

use crate::error::{IngestError, is_unique_violation};
use crate::models::delivery::{
    ActiveModel as DeliveryActiveModel, Column, Entity as Delivery, Model as DeliveryModel,
};
use crate::repositories::{INSERT_CHUNK_SIZE, UpsertOutcome};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};
use uuid::Uuid;

/// One incoming delivery, already transformed from the partner payload.
#[derive(Debug, Clone)]
pub struct DeliveryRecord {
    pub delivery_no: String,
    pub vin: Option<String>,
    pub customer_name: Option<String>,
    pub advisor: Option<String>,
    pub delivered_at: Option<DateTimeWithTimeZone>,
}

/// Upserts a batch of deliveries inside the caller's transaction.
pub async fn upsert_batch<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    records: &[DeliveryRecord],
) -> Result<UpsertOutcome, IngestError> {
    if records.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let mut deduped: HashMap<&str, &DeliveryRecord> = HashMap::new();
    for record in records {
        deduped.insert(record.delivery_no.as_str(), record);
    }

    let keys: Vec<String> = deduped.keys().map(|k| k.to_string()).collect();
    let existing: HashMap<String, DeliveryModel> = Delivery::find()
        .filter(Column::DealerId.eq(dealer_id))
        .filter(Column::DeliveryNo.is_in(keys))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.delivery_no.clone(), m))
        .collect();

    let mut outcome = UpsertOutcome::default();
    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut fresh: Vec<&DeliveryRecord> = Vec::new();

    for record in deduped.values() {
        match existing.get(&record.delivery_no) {
            Some(current) => {
                update_row(conn, current.clone(), record, now).await?;
                outcome.updated += 1;
            }
            None => fresh.push(record),
        }
    }

    for chunk in fresh.chunks(INSERT_CHUNK_SIZE) {
        let models: Vec<DeliveryActiveModel> = chunk
            .iter()
            .map(|record| active_model(dealer_id, record, now))
            .collect();

        match Delivery::insert_many(models).exec(conn).await {
            Ok(_) => outcome.inserted += chunk.len() as u64,
            Err(db_err) if is_unique_violation(&db_err) => {
                tracing::debug!(
                    dealer_id = %dealer_id,
                    chunk_len = chunk.len(),
                    "Batch insert hit unique violation, falling back to row-by-row"
                );
                insert_rows_individually(conn, dealer_id, chunk, &mut outcome).await?;
            }
            Err(db_err) => return Err(db_err.into()),
        }
    }

    Ok(outcome)
}

async fn update_row<C: ConnectionTrait>(
    conn: &C,
    current: DeliveryModel,
    record: &DeliveryRecord,
    now: DateTimeWithTimeZone,
) -> Result<(), IngestError> {
    let mut active = current.into_active_model();
    active.vin = Set(record.vin.clone());
    active.customer_name = Set(record.customer_name.clone());
    active.advisor = Set(record.advisor.clone());
    active.delivered_at = Set(record.delivered_at);
    active.updated_at = Set(now);
    active.update(conn).await?;
    Ok(())
}

async fn insert_rows_individually<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    chunk: &[&DeliveryRecord],
    outcome: &mut UpsertOutcome,
) -> Result<(), IngestError> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    for record in chunk {
        let current = Delivery::find()
            .filter(Column::DealerId.eq(dealer_id))
            .filter(Column::DeliveryNo.eq(record.delivery_no.clone()))
            .one(conn)
            .await?;

        match current {
            Some(model) => {
                update_row(conn, model, record, now).await?;
                outcome.updated += 1;
            }
            None => {
                active_model(dealer_id, record, now)
                    .insert(conn)
                    .await
                    .map_err(|db_err| {
                        if is_unique_violation(&db_err) {
                            IngestError::IntegrityConflict {
                                key: format!("deliveries({}, {})", dealer_id, record.delivery_no),
                            }
                        } else {
                            IngestError::Database(db_err)
                        }
                    })?;
                outcome.inserted += 1;
            }
        }
    }

    Ok(())
}

fn active_model(
    dealer_id: Uuid,
    record: &DeliveryRecord,
    now: DateTimeWithTimeZone,
) -> DeliveryActiveModel {
    DeliveryActiveModel {
        id: Set(Uuid::new_v4()),
        dealer_id: Set(dealer_id),
        delivery_no: Set(record.delivery_no.clone()),
        vin: Set(record.vin.clone()),
        customer_name: Set(record.customer_name.clone()),
        advisor: Set(record.advisor.clone()),
        delivered_at: Set(record.delivered_at),
        created_at: Set(now),
        updated_at: Set(now),
    }
}
