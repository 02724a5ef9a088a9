//! Delivery processor. Natural key: (dealer, delivery number).
//!
//! The partner's delivery endpoint rejects windows touching the first minute
//! of the day, so the default window here is 01:01:00 through 23:59:00
//! instead of the full day.

use async_trait::async_trait;
use chrono::NaiveTime;
use sea_orm::DatabaseTransaction;
use uuid::Uuid;

use crate::client::PartnerResponse;
use crate::error::IngestError;
use crate::models::dealer::Model as DealerModel;
use crate::processors::fields::{datetime_field, str_field};
use crate::processors::trait_::RecordProcessor;
use crate::processors::{JobType, TimeWindow};
use crate::repositories::UpsertOutcome;
use crate::repositories::delivery::{DeliveryRecord, upsert_batch};

pub struct DeliveryProcessor;

const SYNTHETIC_DELIVERY_COUNT: usize = 3;

#[async_trait]
impl RecordProcessor for DeliveryProcessor {
    fn job_type(&self) -> JobType {
        JobType::Deliveries
    }

    fn endpoint(&self) -> &'static str {
        "delivery/list"
    }

    fn default_window(&self) -> TimeWindow {
        TimeWindow::today_between(
            NaiveTime::from_hms_opt(1, 1, 0).unwrap_or_default(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap_or_default(),
        )
    }

    fn synthetic_payload(&self, dealer: &DealerModel, window: &TimeWindow) -> PartnerResponse {
        let dealer_tag = dealer.id.simple().to_string();
        let date = window.from.date();
        let data: Vec<serde_json::Value> = (1..=SYNTHETIC_DELIVERY_COUNT)
            .map(|i| {
                serde_json::json!({
                    "deliveryNo": format!("DEMO-DLV-{}-{}-{:03}", &dealer_tag[..8], date, i),
                    "vin": format!("DEMOVIN{:010}", i),
                    "customerName": format!("Demo Customer {}", i),
                    "advisor": "Demo Advisor",
                    "deliveryTime": format!("{} 15:{:02}:00", date, i),
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
            let Some(delivery_no) = str_field(record, &["deliveryNo", "delivery_no"]) else {
                tracing::warn!(dealer_id = %dealer_id, "Skipping delivery without delivery number");
                continue;
            };

            transformed.push(DeliveryRecord {
                delivery_no,
                vin: str_field(record, &["vin", "VIN"]),
                customer_name: str_field(record, &["customerName", "customer_name"]),
                advisor: str_field(record, &["advisor", "deliveryAdvisor"]),
                delivered_at: datetime_field(
                    record,
                    &["deliveryTime", "deliveredAt", "delivery_time"],
                ),
            });
        }

        upsert_batch(txn, dealer_id, &transformed).await
    }
}
