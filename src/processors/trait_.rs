//! The `RecordProcessor` trait: the per-record-type half of the template.
//!
//! Concrete processors supply the endpoint, the default window, the payload
//! transformation, and the synthetic generator; the shared driver in
//! [`super::engine`] owns ordering, transactions, and audit rows.

use async_trait::async_trait;
use sea_orm::DatabaseTransaction;
use uuid::Uuid;

use crate::client::{DealerCredentials, PartnerClient, PartnerResponse};
use crate::error::IngestError;
use crate::models::dealer::Model as DealerModel;
use crate::processors::{JobType, TimeWindow};
use crate::repositories::UpsertOutcome;

/// One record type's ingestion behavior.
#[async_trait]
pub trait RecordProcessor: Send + Sync {
    /// The job-type key this processor handles.
    fn job_type(&self) -> JobType;

    /// Partner API endpoint path for this record type.
    fn endpoint(&self) -> &'static str;

    /// Default fetch window when the caller supplies none.
    fn default_window(&self) -> TimeWindow {
        TimeWindow::today_full_day()
    }

    /// Deterministic synthetic payload for demo and credential-less dealers.
    ///
    /// Must be a pure function of the dealer and window so repeated runs
    /// remain idempotent.
    fn synthetic_payload(&self, dealer: &DealerModel, window: &TimeWindow) -> PartnerResponse;

    /// Fetches one window of records from the partner API.
    async fn fetch(
        &self,
        client: &PartnerClient,
        dealer: &DealerModel,
        window: &TimeWindow,
        extra: &serde_json::Value,
    ) -> Result<PartnerResponse, IngestError> {
        let credentials = dealer_credentials(dealer)?;

        let mut params = serde_json::json!({
            "dealerId": dealer.id.to_string(),
            "fromTime": window.format_from(),
            "toTime": window.format_to(),
        });
        if let (Some(params_obj), Some(extra_obj)) = (params.as_object_mut(), extra.as_object()) {
            for (key, value) in extra_obj {
                params_obj.insert(key.clone(), value.clone());
            }
        }

        client.fetch(self.endpoint(), &credentials, &params).await
    }

    /// Transforms raw partner records and upserts them inside the caller's
    /// transaction, returning insert/update counts.
    async fn transform_and_store(
        &self,
        txn: &DatabaseTransaction,
        dealer_id: Uuid,
        records: &[serde_json::Value],
    ) -> Result<UpsertOutcome, IngestError>;
}

/// Extracts the partner credentials a live fetch requires.
pub fn dealer_credentials(dealer: &DealerModel) -> Result<DealerCredentials, IngestError> {
    match (&dealer.api_key, &dealer.api_secret) {
        (Some(key), Some(secret)) if !key.is_empty() && !secret.is_empty() => {
            Ok(DealerCredentials {
                app_key: key.clone(),
                app_secret: secret.clone(),
            })
        }
        _ => Err(IngestError::MissingCredentials {
            dealer_id: dealer.id,
        }),
    }
}
