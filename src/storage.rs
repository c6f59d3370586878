use std::path::PathBuf;

use anyhow::Context;
use axum::async_trait;
use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Persists `body` under `name` and returns the stored name.
    /// Never overwrites an existing object.
    async fn save(&self, name: &str, body: Bytes) -> anyhow::Result<String>;
    async fn exists(&self, name: &str) -> bool;
    /// Removes `name`; a missing object is not an error.
    async fn delete(&self, name: &str) -> anyhow::Result<()>;
    fn path(&self, name: &str) -> anyhow::Result<PathBuf>;
    fn url(&self, name: &str) -> String;
}

/// Filesystem storage rooted at `<media root>/scans`.
#[derive(Clone)]
pub struct LocalStorage {
    root: PathBuf,
    base_url: String,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            base_url: base_url.into(),
        }
    }

    #[cfg(test)]
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }
}

#[async_trait]
impl StorageClient for LocalStorage {
    async fn save(&self, name: &str, body: Bytes) -> anyhow::Result<String> {
        let path = self.path(name)?;
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("create storage dir {}", self.root.display()))?;

        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
            .with_context(|| format!("create {}", path.display()))?;
        file.write_all(&body)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        file.flush().await?;

        debug!(name, bytes = body.len(), "stored upload");
        Ok(name.to_string())
    }

    async fn exists(&self, name: &str) -> bool {
        match self.path(name) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }

    async fn delete(&self, name: &str) -> anyhow::Result<()> {
        let path = self.path(name)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!(name, "deleted upload");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("delete {}", path.display())),
        }
    }

    fn path(&self, name: &str) -> anyhow::Result<PathBuf> {
        anyhow::ensure!(is_plain_name(name), "invalid storage name: {:?}", name);
        Ok(self.root.join(name))
    }

    fn url(&self, name: &str) -> String {
        format!("{}{}", self.base_url, name)
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

/// Builds a collision-resistant storage name: `<uuid hex>_<sanitised original>`.
pub fn unique_name(original: &str) -> String {
    format!("{}_{}", Uuid::new_v4().simple(), sanitize_filename(original))
}

/// Keeps the final path component and replaces anything outside
/// `[A-Za-z0-9._-]` with `_`.
pub fn sanitize_filename(original: &str) -> String {
    let base = original
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "upload".to_string()
    } else {
        cleaned.to_string()
    }
}
