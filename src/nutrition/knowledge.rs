use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::RwLock;
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum KnowledgeError {
    #[error("reference document not found: {0}")]
    NotFound(PathBuf),
    #[error("failed to read reference document: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to extract text from reference document: {0}")]
    Pdf(String),
}

/// Extracted reference text, cached by MD5 of the file content for the
/// lifetime of the process. Entries are never evicted or mutated.
#[derive(Default)]
pub struct KnowledgeBase {
    cache: RwLock<HashMap<String, Arc<str>>>,
}

impl KnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn extract_text(&self, path: &Path) -> Result<Arc<str>, KnowledgeError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KnowledgeError::NotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };
        let digest = format!("{:x}", md5::compute(&bytes));

        if let Some(text) = self.cache.read().await.get(&digest) {
            debug!(digest = %digest, "reference text cache hit");
            return Ok(text.clone());
        }

        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        let text: Arc<str> = if is_pdf {
            tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem(&bytes))
                .await
                .map_err(|e| KnowledgeError::Pdf(e.to_string()))?
                .map_err(|e| KnowledgeError::Pdf(e.to_string()))?
                .into()
        } else {
            String::from_utf8_lossy(&bytes).into_owned().into()
        };

        info!(
            path = %path.display(),
            digest = %digest,
            words = text.split_whitespace().count(),
            "reference text extracted"
        );
        self.cache.write().await.insert(digest, text.clone());
        Ok(text)
    }

    #[cfg(test)]
    pub async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}
