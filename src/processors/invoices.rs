//! Invoice processor. Natural key: (dealer, invoice number).

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use uuid::Uuid;

use crate::client::PartnerResponse;
use crate::error::IngestError;
use crate::models::dealer::Model as DealerModel;
use crate::processors::fields::{datetime_field, f64_field, str_field};
use crate::processors::trait_::RecordProcessor;
use crate::processors::{JobType, TimeWindow};
use crate::repositories::UpsertOutcome;
use crate::repositories::invoice::{InvoiceRecord, upsert_batch};

pub struct InvoiceProcessor;

const SYNTHETIC_INVOICE_COUNT: usize = 4;

#[async_trait]
impl RecordProcessor for InvoiceProcessor {
    fn job_type(&self) -> JobType {
        JobType::Invoices
    }

    fn endpoint(&self) -> &'static str {
        "invoice/list"
    }

    fn synthetic_payload(&self, dealer: &DealerModel, window: &TimeWindow) -> PartnerResponse {
        let dealer_tag = dealer.id.simple().to_string();
        let date = window.from.date();
        let data: Vec<serde_json::Value> = (1..=SYNTHETIC_INVOICE_COUNT)
            .map(|i| {
                serde_json::json!({
                    "invoiceNo": format!("DEMO-INV-{}-{}-{:03}", &dealer_tag[..8], date, i),
                    "customerName": format!("Demo Customer {}", i),
                    "amount": 800.0 * i as f64,
                    "taxAmount": 104.0 * i as f64,
                    "invoiceTime": format!("{} 11:{:02}:00", date, i),
                })
            })
            .collect();

        PartnerResponse {
            status: 1,
            message: Some("synthetic".to_string()),
            data: Some(serde_json::Value::Array(data)),
        }
    }

    async fn transform_and_store(
        &self,
        txn: &DatabaseTransaction,
        dealer_id: Uuid,
        records: &[serde_json::Value],
    ) -> Result<UpsertOutcome, IngestError> {
        let mut transformed = Vec::with_capacity(records.len());

        for record in records {
            let Some(invoice_no) = str_field(record, &["invoiceNo", "invoice_no", "billNo"]) else {
                tracing::warn!(dealer_id = %dealer_id, "Skipping invoice without invoice number");
                continue;
            };

            transformed.push(InvoiceRecord {
                invoice_no,
                customer_name: str_field(record, &["customerName", "customer_name"]),
                amount: f64_field(record, &["amount", "invoiceAmount"]).unwrap_or(0.0),
                tax_amount: f64_field(record, &["taxAmount", "tax"]).unwrap_or(0.0),
                invoiced_at: datetime_field(record, &["invoiceTime", "invoicedAt", "invoice_time"]),
            });
        }

        upsert_batch(txn, dealer_id, &transformed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn synthetic_payload_is_deterministic() {
        let dealer = DealerModel {
            id: Uuid::nil(),
            name: "Demo Motors".to_string(),
            api_key: None,
            api_secret: None,
            active: true,
            demo: true,
            created_at: chrono::Utc::now().into(),
        };
        let date = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        let window = TimeWindow::new(
            date.and_hms_opt(0, 0, 0).unwrap(),
            date.and_hms_opt(23, 59, 59).unwrap(),
        );

        let processor = InvoiceProcessor;
        let a = processor.synthetic_payload(&dealer, &window);
        let b = processor.synthetic_payload(&dealer, &window);
        assert_eq!(
            serde_json::to_string(&a.data).unwrap(),
            serde_json::to_string(&b.data).unwrap()
        );
        assert_eq!(a.records().unwrap().len(), SYNTHETIC_INVOICE_COUNT);
    }
}
