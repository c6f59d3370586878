use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::nutrition::{lookup::ProductRecord, nutrients::NutrientMap};
use crate::scan::pipeline::{Analysis, ScanResult, ScanStage};
use crate::scan::repo_types::ScanRecord;

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub filename: String,
    pub image_url: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
}

/// Upload form descriptor for `GET /scan`.
#[derive(Debug, Serialize)]
pub struct FormView {
    pub stage: ScanStage,
    pub field: &'static str,
    pub accept: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NoticeQuery {
    pub notice: Option<String>,
}

/// Waiting page data: where the client should post to start processing.
#[derive(Debug, Serialize)]
pub struct LoadingView {
    pub filename: String,
    pub image_url: String,
    pub process_url: String,
}

#[derive(Debug, Serialize)]
pub struct NutrientRow {
    pub key: String,
    pub label: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct ResultView {
    pub product_name: String,
    pub product: ProductRecord,
    pub advisability: String,
    pub summary: String,
    pub summary_points: Vec<String>,
    pub nutrients: Vec<NutrientRow>,
    pub nutrient_map: NutrientMap,
}

impl ResultView {
    pub fn new(result: ScanResult, summary_points: Vec<String>) -> Self {
        let ScanResult {
            product,
            analysis: Analysis {
                advisability,
                summary,
            },
            nutrient_map,
        } = result;
        let nutrients = product
            .nutriments
            .iter()
            .map(|(key, value)| NutrientRow {
                label: nutrient_map.label_or_key(key).to_string(),
                key: key.clone(),
                value: value.clone(),
            })
            .collect();
        Self {
            product_name: product.display_name().to_string(),
            product,
            advisability,
            summary,
            summary_points,
            nutrients,
            nutrient_map,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Pagination {
    #[serde(default = "default_limit")]
    pub limit: i64,
    #[serde(default)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    20
}

#[derive(Debug, Serialize)]
pub struct HistoryEntry {
    #[serde(flatten)]
    pub record: ScanRecord,
    pub analysis: Option<Analysis>,
}

impl From<ScanRecord> for HistoryEntry {
    fn from(record: ScanRecord) -> Self {
        let analysis = serde_json::from_str(&record.analysis_result).ok();
        Self { record, analysis }
    }
}
