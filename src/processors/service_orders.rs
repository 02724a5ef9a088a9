//! Service order processor: parent orders with child line items.
//!
//! The natural key is (dealer, order number). Re-fetching a window updates
//! the parent order in place; line items are written once at creation and
//! never re-inserted.

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
use crate::repositories::service_order::{
    ServiceOrderItemRecord, ServiceOrderRecord, upsert_batch,
};

pub struct ServiceOrderProcessor;

/// Orders per synthetic batch.
const SYNTHETIC_ORDER_COUNT: usize = 5;

#[async_trait]
impl RecordProcessor for ServiceOrderProcessor {
    fn job_type(&self) -> JobType {
        JobType::ServiceOrders
    }

    fn endpoint(&self) -> &'static str {
        "serviceOrder/list"
    }

    fn synthetic_payload(&self, dealer: &DealerModel, window: &TimeWindow) -> PartnerResponse {
        let dealer_tag = dealer.id.simple().to_string();
        let date = window.from.date();
        let data: Vec<serde_json::Value> = (1..=SYNTHETIC_ORDER_COUNT)
            .map(|i| {
                serde_json::json!({
                    "orderNo": format!("DEMO-SO-{}-{}-{:03}", &dealer_tag[..8], date, i),
                    "vin": format!("DEMOVIN{:010}", i),
                    "customerName": format!("Demo Customer {}", i),
                    "customerPhone": format!("555-01{:02}", i),
                    "advisor": "Demo Advisor",
                    "totalAmount": 150.0 * i as f64,
                    "orderTime": format!("{} 09:{:02}:00", date, i),
                    "items": [
                        {
                            "itemCode": format!("LAB-{:03}", i),
                            "itemName": "Labour",
                            "quantity": 1.0,
                            "unitPrice": 100.0 * i as f64,
                        },
                        {
                            "itemCode": format!("PRT-{:03}", i),
                            "itemName": "Parts",
                            "quantity": 2.0,
                            "unitPrice": 25.0 * i as f64,
                        },
                    ],
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
            let Some(order_no) = str_field(record, &["orderNo", "order_no", "billNo"]) else {
                tracing::warn!(dealer_id = %dealer_id, "Skipping service order without order number");
                continue;
            };

            let items = record
                .get("items")
                .or_else(|| record.get("itemList"))
                .and_then(|v| v.as_array())
                .map(|items| {
                    items
                        .iter()
                        .filter_map(|item| {
                            let item_code = str_field(item, &["itemCode", "item_code", "code"])?;
                            Some(ServiceOrderItemRecord {
                                item_code,
                                item_name: str_field(item, &["itemName", "item_name", "name"]),
                                quantity: f64_field(item, &["quantity", "qty"]).unwrap_or(1.0),
                                unit_price: f64_field(item, &["unitPrice", "price"]).unwrap_or(0.0),
                            })
                        })
                        .collect()
                })
                .unwrap_or_default();

            transformed.push(ServiceOrderRecord {
                order_no,
                vin: str_field(record, &["vin", "VIN"]),
                customer_name: str_field(record, &["customerName", "customer_name"]),
                customer_phone: str_field(record, &["customerPhone", "customer_phone", "phone"]),
                advisor: str_field(record, &["advisor", "serviceAdvisor"]),
                total_amount: f64_field(record, &["totalAmount", "amount"]).unwrap_or(0.0),
                ordered_at: datetime_field(record, &["orderTime", "orderedAt", "order_time"]),
                items,
            });
        }

        upsert_batch(txn, dealer_id, &transformed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn demo_dealer() -> DealerModel {
        DealerModel {
            id: Uuid::nil(),
            name: "Demo Motors".to_string(),
            api_key: None,
            api_secret: None,
            active: true,
            demo: true,
            created_at: chrono::Utc::now().into(),
        }
    }

    fn window() -> TimeWindow {
        let date = NaiveDate::from_ymd_opt(2026, 8, 25).unwrap();
        TimeWindow::new(
            date.and_hms_opt(0, 0, 0).unwrap(),
            date.and_hms_opt(23, 59, 59).unwrap(),
        )
    }

    #[test]
    fn synthetic_payload_is_deterministic() {
        let processor = ServiceOrderProcessor;
        let dealer = demo_dealer();
        let a = processor.synthetic_payload(&dealer, &window());
        let b = processor.synthetic_payload(&dealer, &window());
        assert_eq!(
            serde_json::to_string(&a.data).unwrap(),
            serde_json::to_string(&b.data).unwrap()
        );
        assert_eq!(a.status, 1);
    }

    #[test]
    fn synthetic_orders_have_unique_keys_and_items() {
        let processor = ServiceOrderProcessor;
        let payload = processor.synthetic_payload(&demo_dealer(), &window());
        let records = payload.records().unwrap();
        assert_eq!(records.len(), SYNTHETIC_ORDER_COUNT);

        let mut keys: Vec<&str> = records
            .iter()
            .filter_map(|r| r.get("orderNo").and_then(|v| v.as_str()))
            .collect();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), SYNTHETIC_ORDER_COUNT);

        for record in &records {
            assert_eq!(record.get("items").unwrap().as_array().unwrap().len(), 2);
        }
    }
}
