use anyhow::Context;
use axum::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

const FIELDS: &str = "code,product_name,brands,nutriscore_grade,image_url,nutriments";
const USER_AGENT: &str = concat!("nutriscan/", env!("CARGO_PKG_VERSION"));

/// Product facts as returned by the product database.
/// `nutriments` keeps the upstream key order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub brands: Option<String>,
    #[serde(default)]
    pub nutriscore_grade: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub nutriments: Map<String, Value>,
}

impl ProductRecord {
    pub fn display_name(&self) -> &str {
        self.product_name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or("Unknown")
    }
}

#[async_trait]
pub trait ProductLookup: Send + Sync {
    /// `Ok(None)` means the barcode is unknown, which is a normal outcome.
    async fn fetch(&self, barcode: &str) -> anyhow::Result<Option<ProductRecord>>;
}

#[derive(Deserialize)]
struct ProductEnvelope {
    #[serde(default)]
    status: i64,
    #[serde(default)]
    product: Option<ProductRecord>,
}

/// Open Food Facts product API client.
pub struct OpenFoodFacts {
    client: Client,
    base_url: String,
}

impl OpenFoodFacts {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl ProductLookup for OpenFoodFacts {
    async fn fetch(&self, barcode: &str) -> anyhow::Result<Option<ProductRecord>> {
        let barcode = barcode.trim();
        if barcode.is_empty() || !barcode.chars().all(|c| c.is_ascii_alphanumeric()) {
            debug!(barcode, "barcode not queryable");
            return Ok(None);
        }

        let response = self
            .client
            .get(format!("{}/api/v2/product/{}.json", self.base_url, barcode))
            .query(&[("fields", FIELDS)])
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .context("product lookup request failed")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(barcode, "product unknown upstream");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("product database returned {}: {}", status, body);
        }

        let envelope: ProductEnvelope = response
            .json()
            .await
            .context("failed to parse product response")?;
        Ok(product_from_envelope(envelope))
    }
}

fn product_from_envelope(envelope: ProductEnvelope) -> Option<ProductRecord> {
    if envelope.status != 1 {
        return None;
    }
    envelope.product
}
