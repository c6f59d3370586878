use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure outcomes of the upload and processing endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("No image uploaded.")]
    NoImage,
    #[error("Invalid form data.")]
    InvalidUpload(String),
    #[error("Unknown upload.")]
    UnknownUpload,
    #[error("No barcode detected in the image.")]
    NoBarcode,
    #[error("Product not found in database.")]
    ProductNotFound,
    #[error("User not found.")]
    UserNotFound,
    #[error("Please log in first.")]
    LoginRequired,
    #[error("User not logged in.")]
    NotLoggedIn,
    #[error("{0}")]
    Service(String),
}

/// Where clients are sent when an upload arrives without a session.
pub const LOGIN_URL: &str = "/api/v1/auth/login";

impl ScanError {
    pub fn service(e: impl std::fmt::Display) -> Self {
        Self::Service(e.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoImage | Self::InvalidUpload(_) | Self::UnknownUpload => StatusCode::BAD_REQUEST,
            Self::LoginRequired | Self::NotLoggedIn => StatusCode::UNAUTHORIZED,
            Self::NoBarcode => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProductNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::Service(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<anyhow::Error> for ScanError {
    fn from(e: anyhow::Error) -> Self {
        Self::Service(format!("{:#}", e))
    }
}

impl IntoResponse for ScanError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::InvalidUpload(reason) => json!({
                "status": "error",
                "message": self.to_string(),
                "errors": { "image": [reason] },
            }),
            Self::LoginRequired => json!({
                "status": "error",
                "message": self.to_string(),
                "redirect_url": LOGIN_URL,
            }),
            _ => json!({ "status": "error", "message": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_match_client_contract() {
        assert_eq!(ScanError::NoBarcode.to_string(), "No barcode detected in the image.");
        assert_eq!(ScanError::ProductNotFound.to_string(), "Product not found in database.");
        assert_eq!(ScanError::UserNotFound.to_string(), "User not found.");
        assert_eq!(ScanError::service("boom").to_string(), "boom");
    }

    #[test]
    fn anyhow_chain_is_kept_in_message() {
        let err: ScanError = anyhow::anyhow!("connection refused")
            .context("product lookup request failed")
            .into();
        assert_eq!(
            err.to_string(),
            "product lookup request failed: connection refused"
        );
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }
}
