//! # Invoice Repository
//!
//! Idempotent upserts keyed on (dealer_id, invoice_no).

use std::collections::HashMap;

use crate::error::{IngestError, is_unique_violation};
use crate::models::invoice::{
    ActiveModel as InvoiceActiveModel, Column, Entity as Invoice, Model as InvoiceModel,
};
use crate::repositories::{INSERT_CHUNK_SIZE, UpsertOutcome};
use chrono::Utc;
use sea_orm::prelude::DateTimeWithTimeZone;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter, Set,
};
use uuid::Uuid;

/// One incoming invoice, already transformed from the partner payload.
#[derive(Debug, Clone)]
pub struct InvoiceRecord {
    pub invoice_no: String,
    pub customer_name: Option<String>,
    pub amount: f64,
    pub tax_amount: f64,
    pub invoiced_at: Option<DateTimeWithTimeZone>,
}

/// Upserts a batch of invoices inside the caller's transaction.
pub async fn upsert_batch<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    records: &[InvoiceRecord],
) -> Result<UpsertOutcome, IngestError> {
    if records.is_empty() {
        return Ok(UpsertOutcome::default());
    }

    let mut deduped: HashMap<&str, &InvoiceRecord> = HashMap::new();
    for record in records {
        deduped.insert(record.invoice_no.as_str(), record);
    }

    let keys: Vec<String> = deduped.keys().map(|k| k.to_string()).collect();
    let existing: HashMap<String, InvoiceModel> = Invoice::find()
        .filter(Column::DealerId.eq(dealer_id))
        .filter(Column::InvoiceNo.is_in(keys))
        .all(conn)
        .await?
        .into_iter()
        .map(|m| (m.invoice_no.clone(), m))
        .collect();

    let mut outcome = UpsertOutcome::default();
    let now: DateTimeWithTimeZone = Utc::now().into();
    let mut fresh: Vec<&InvoiceRecord> = Vec::new();

    for record in deduped.values() {
        match existing.get(&record.invoice_no) {
            Some(current) => {
                update_row(conn, current.clone(), record, now).await?;
                outcome.updated += 1;
            }
            None => fresh.push(record),
        }
    }

    for chunk in fresh.chunks(INSERT_CHUNK_SIZE) {
        let models: Vec<InvoiceActiveModel> = chunk
            .iter()
            .map(|record| active_model(dealer_id, record, now))
            .collect();

        match Invoice::insert_many(models).exec(conn).await {
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
    current: InvoiceModel,
    record: &InvoiceRecord,
    now: DateTimeWithTimeZone,
) -> Result<(), IngestError> {
    let mut active = current.into_active_model();
    active.customer_name = Set(record.customer_name.clone());
    active.amount = Set(record.amount);
    active.tax_amount = Set(record.tax_amount);
    active.invoiced_at = Set(record.invoiced_at);
    active.updated_at = Set(now);
    active.update(conn).await?;
    Ok(())
}

async fn insert_rows_individually<C: ConnectionTrait>(
    conn: &C,
    dealer_id: Uuid,
    chunk: &[&InvoiceRecord],
    outcome: &mut UpsertOutcome,
) -> Result<(), IngestError> {
    let now: DateTimeWithTimeZone = Utc::now().into();

    for record in chunk {
        let current = Invoice::find()
            .filter(Column::DealerId.eq(dealer_id))
            .filter(Column::InvoiceNo.eq(record.invoice_no.clone()))
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
                                key: format!("invoices({}, {})", dealer_id, record.invoice_no),
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
    record: &InvoiceRecord,
    now: DateTimeWithTimeZone,
) -> InvoiceActiveModel {
    InvoiceActiveModel {
        id: Set(Uuid::new_v4()),
        dealer_id: Set(dealer_id),
        invoice_no: Set(record.invoice_no.clone()),
        customer_name: Set(record.customer_name.clone()),
        amount: Set(record.amount),
        tax_amount: Set(record.tax_amount),
        invoiced_at: Set(record.invoiced_at),
        created_at: Set(now),
        updated_at: Set(now),
    }
}
