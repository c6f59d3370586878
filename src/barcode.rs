use std::path::{Path, PathBuf};

use axum::async_trait;
use tracing::debug;

#[async_trait]
pub trait BarcodeDecoder: Send + Sync {
    /// Returns the payload of the first barcode found in the image, or `None`
    /// when nothing is detected or the image cannot be loaded.
    async fn decode(&self, image_path: &Path) -> Option<String>;
}

/// Decodes 1D/2D barcodes with `rxing` on a blocking worker thread.
#[derive(Clone, Default)]
pub struct RxingDecoder;

#[async_trait]
impl BarcodeDecoder for RxingDecoder {
    async fn decode(&self, image_path: &Path) -> Option<String> {
        let path: PathBuf = image_path.to_path_buf();
        let joined = tokio::task::spawn_blocking(move || decode_file(&path)).await;
        match joined {
            Ok(Ok(text)) => Some(text),
            Ok(Err(e)) => {
                debug!(error = %e, path = %image_path.display(), "no barcode decoded");
                None
            }
            Err(e) => {
                debug!(error = %e, "barcode worker failed");
                None
            }
        }
    }
}

fn decode_file(path: &Path) -> anyhow::Result<String> {
    let img = image::open(path)?.to_luma8();
    let (width, height) = img.dimensions();
    let result = rxing::helpers::detect_in_luma(img.into_raw(), width, height, None)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    let text = result.getText().trim().to_string();
    anyhow::ensure!(!text.is_empty(), "empty barcode payload");
    Ok(text)
}
