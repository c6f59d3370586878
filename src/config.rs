use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub ttl_minutes: i64,
    pub refresh_ttl_minutes: i64,
}

/// Hosted chat-completion endpoint used for the advisability verdict.
#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub jwt: JwtConfig,
    pub media_root: PathBuf,
    pub media_url: String,
    pub reference_doc: PathBuf,
    pub products_base_url: String,
    pub llm: LlmConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "nutriscan".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "nutriscan-users".into()),
            ttl_minutes: std::env::var("JWT_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60),
            refresh_ttl_minutes: std::env::var("JWT_REFRESH_TTL_MINUTES")
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(60 * 24 * 14),
        };
        let llm = LlmConfig {
            base_url: std::env::var("LLM_BASE_URL")
                .unwrap_or_else(|_| "https://router.huggingface.co/v1".into()),
            api_key: std::env::var("HF_TOKEN")?,
            model: std::env::var("LLM_MODEL")
                .unwrap_or_else(|_| "meta-llama/Meta-Llama-3-8B-Instruct".into()),
            max_tokens: 400,
            temperature: 0.7,
        };
        Ok(Self {
            database_url,
            jwt,
            media_root: std::env::var("MEDIA_ROOT")
                .unwrap_or_else(|_| "media".into())
                .into(),
            media_url: std::env::var("MEDIA_URL").unwrap_or_else(|_| "/media/".into()),
            reference_doc: std::env::var("REFERENCE_DOC")
                .unwrap_or_else(|_| "healthy-diet-fact-sheet-394.pdf".into())
                .into(),
            products_base_url: std::env::var("PRODUCTS_BASE_URL")
                .unwrap_or_else(|_| "https://world.openfoodfacts.org".into()),
            llm,
        })
    }

    /// Directory holding uploaded scan images.
    pub fn scans_dir(&self) -> PathBuf {
        self.media_root.join("scans")
    }

    /// Public URL prefix for uploaded scan images, always ending in `/`.
    pub fn scans_url(&self) -> String {
        let base = self.media_url.trim_end_matches('/');
        format!("{}/scans/", base)
    }
}
