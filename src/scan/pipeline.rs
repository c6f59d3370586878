use std::fmt;

use bytes::Bytes;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    nutrition::{
        lookup::ProductRecord,
        nutrients::{with_default_nutrients, NutrientMap, NUTRIENT_MAP},
        prompt::build_prompt,
    },
    scan::{dto::ResultView, error::ScanError, repo_types::NewScan},
    state::AppState,
    storage::unique_name,
};

/// Where a user's scan currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStage {
    AwaitingUpload,
    Uploaded,
    Decoding,
    LookingUp,
    Analyzing,
    ResultReady,
    Consumed,
}

impl fmt::Display for ScanStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::AwaitingUpload => "awaiting_upload",
            Self::Uploaded => "uploaded",
            Self::Decoding => "decoding",
            Self::LookingUp => "looking_up",
            Self::Analyzing => "analyzing",
            Self::ResultReady => "result_ready",
            Self::Consumed => "consumed",
        };
        f.write_str(s)
    }
}

fn enter(stage: ScanStage, user_id: Uuid, filename: &str) {
    info!(stage = %stage, %user_id, filename, "scan stage");
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    pub advisability: String,
    pub summary: String,
}

impl Analysis {
    fn placeholder(advisability: &str, summary: &str) -> Self {
        Self {
            advisability: advisability.to_string(),
            summary: summary.to_string(),
        }
    }
}

/// Session-scoped outcome of a successful scan, read once by the result view.
#[derive(Debug, Clone, Serialize)]
pub struct ScanResult {
    pub product: ProductRecord,
    pub analysis: Analysis,
    pub nutrient_map: NutrientMap,
}

pub struct StoredUpload {
    pub filename: String,
    pub image_url: String,
}

lazy_static! {
    // Greedy: spans from the first `{` to the last `}` anywhere in the text.
    static ref JSON_BLOCK: Regex = Regex::new(r"(?s)\{.*\}").unwrap();
}

fn string_field(value: &Value, key: &str, default: &str) -> String {
    match value.get(key) {
        Some(Value::String(s)) => s.clone(),
        None | Some(Value::Null) => default.to_string(),
        Some(other) => other.to_string(),
    }
}

/// Pulls `advisability` and `summary` out of a free-text completion.
///
/// The JSON candidate is the greedy `{...}` span of the whole text, so two
/// separate objects in one reply are read as a single unparseable block.
pub fn parse_advice(raw: &str) -> Analysis {
    let Some(block) = JSON_BLOCK.find(raw) else {
        return Analysis::placeholder("Not found", "Could not extract JSON block.");
    };
    match serde_json::from_str::<Value>(block.as_str()) {
        Ok(value) => Analysis {
            advisability: string_field(&value, "advisability", "Unknown"),
            summary: string_field(&value, "summary", "No summary provided."),
        },
        Err(_) => Analysis::placeholder("Error", "Could not parse summary."),
    }
}

/// Splits on every literal `.`, trimming and dropping empty fragments.
pub fn split_summary(summary: &str) -> Vec<String> {
    summary
        .split('.')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

fn validate_image(body: &[u8]) -> Result<(), ScanError> {
    if body.is_empty() {
        return Err(ScanError::InvalidUpload("The submitted file is empty.".into()));
    }
    image::guess_format(body).map_err(|_| {
        ScanError::InvalidUpload(
            "Upload a valid image. The file you uploaded was either not an image or a corrupted image."
                .into(),
        )
    })?;
    Ok(())
}

/// Stores an uploaded image under a fresh unique name and records it as the
/// user's pending upload.
#[instrument(skip(st, body), fields(bytes = body.len()))]
pub async fn store_upload(
    st: &AppState,
    user_id: Uuid,
    original_name: &str,
    body: Bytes,
) -> Result<StoredUpload, ScanError> {
    validate_image(&body)?;

    let name = unique_name(original_name);
    let filename = st
        .storage
        .save(&name, body)
        .await
        .map_err(|e| ScanError::Service(format!("Upload failed: {:#}", e)))?;
    st.sessions.set_uploaded(user_id, filename.clone()).await;
    enter(ScanStage::Uploaded, user_id, &filename);

    Ok(StoredUpload {
        image_url: st.storage.url(&filename),
        filename,
    })
}

/// Decode → lookup → analyze for the user's pending upload. On success the
/// result is stored in the user's session.
///
/// The uploaded image is removed early only when the user no longer exists;
/// on `NoBarcode` and `ProductNotFound` it stays until the session is
/// consumed or discarded.
#[instrument(skip(st))]
pub async fn process_scan(
    st: &AppState,
    user_id: Uuid,
    filename: &str,
) -> Result<ScanResult, ScanError> {
    if st.sessions.uploaded(user_id).await.as_deref() != Some(filename) {
        warn!(%user_id, filename, "processing requested for an upload outside this session");
        return Err(ScanError::UnknownUpload);
    }
    let image_path = st
        .storage
        .path(filename)
        .map_err(|_| ScanError::UnknownUpload)?;

    enter(ScanStage::Decoding, user_id, filename);
    let barcode = st
        .decoder
        .decode(&image_path)
        .await
        .ok_or(ScanError::NoBarcode)?;

    enter(ScanStage::LookingUp, user_id, filename);
    let mut product = st
        .products
        .fetch(&barcode)
        .await?
        .ok_or(ScanError::ProductNotFound)?;

    let Some(user) = st.scans.find_user(user_id).await? else {
        if st.storage.exists(filename).await {
            if let Err(e) = st.storage.delete(filename).await {
                warn!(error = %e, filename, "failed to delete upload of unknown user");
            }
        }
        st.sessions.take_uploaded(user_id).await;
        return Err(ScanError::UserNotFound);
    };

    enter(ScanStage::Analyzing, user_id, filename);
    product.nutriments = with_default_nutrients(std::mem::take(&mut product.nutriments));
    let reference = st
        .knowledge
        .extract_text(&st.config.reference_doc)
        .await
        .map_err(ScanError::service)?;
    let prompt = build_prompt(&user, user.bmi(), &product, &reference);
    let raw = st.advisor.analyze(&prompt).await?;
    let analysis = parse_advice(&raw);
    info!(%user_id, %barcode, advisability = %analysis.advisability, "analysis parsed");

    let record = NewScan {
        user_id,
        barcode,
        product_name: product.display_name().to_string(),
        analysis_result: serde_json::to_string(&analysis)
            .map_err(|e| ScanError::Service(e.to_string()))?,
    };
    if let Err(e) = st.scans.insert_scan(record).await {
        warn!(error = %e, %user_id, "failed to record scan history");
    }

    let result = ScanResult {
        product,
        analysis,
        nutrient_map: NUTRIENT_MAP,
    };
    st.sessions.set_results(user_id, result.clone()).await;
    enter(ScanStage::ResultReady, user_id, filename);
    Ok(result)
}

/// Takes the pending result out of the session and deletes the uploaded
/// image. `None` when nothing is pending.
#[instrument(skip(st))]
pub async fn consume_result(st: &AppState, user_id: Uuid) -> Option<ResultView> {
    let results = st.sessions.take_results(user_id).await?;
    let points = split_summary(&results.analysis.summary);

    let uploaded = st.sessions.take_uploaded(user_id).await;
    if let Some(name) = &uploaded {
        if st.storage.exists(name).await {
            if let Err(e) = st.storage.delete(name).await {
                warn!(error = %e, filename = %name, "failed to delete consumed upload");
            }
        }
    }
    enter(
        ScanStage::Consumed,
        user_id,
        uploaded.as_deref().unwrap_or_default(),
    );

    Some(ResultView::new(results, points))
}

/// Forgets all scan state of the user and removes a pending upload.
pub async fn discard_session(st: &AppState, user_id: Uuid) {
    let session = st.sessions.clear(user_id).await;
    if let Some(name) = session.uploaded_filename {
        if let Err(e) = st.storage.delete(&name).await {
            warn!(error = %e, filename = %name, "failed to delete pending upload");
        }
    }
}
