use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// Append-only audit row written once per completed scan.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub user_id: Uuid,
    pub barcode: String,
    pub product_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub analysis_result: String, // JSON text of the analysis
}

#[derive(Debug, Clone)]
pub struct NewScan {
    pub user_id: Uuid,
    pub barcode: String,
    pub product_name: String,
    pub analysis_result: String,
}
