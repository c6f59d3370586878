use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use tracing::{error, info, instrument, warn};

use crate::{
    auth::services::{AuthRejection, AuthUser},
    scan::{
        dto::{
            FormView, HistoryEntry, LoadingView, NoticeQuery, Pagination, StatusResponse,
            UploadResponse,
        },
        error::ScanError,
        pipeline::{self, ScanStage},
    },
    state::AppState,
};

const IMAGE_FIELD: &str = "image";
const MAX_UPLOAD_BYTES: usize = 20 * 1024 * 1024;
const NO_RESULTS_REDIRECT: &str = "/api/v1/scan?notice=No%20recent%20scan%20results%20found.";

pub fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/scan", get(scan_form).post(upload_scan))
        .route("/scan-loading/:filename", get(scan_loading))
        .route("/process-scan/:filename", get(process_scan).post(process_scan))
        .route("/result", get(scan_result))
        .route("/scans", get(scan_history))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
}

#[instrument(skip(_user))]
pub async fn scan_form(_user: AuthUser, Query(q): Query<NoticeQuery>) -> Json<FormView> {
    Json(FormView {
        stage: ScanStage::AwaitingUpload,
        field: IMAGE_FIELD,
        accept: "image/*",
        notice: q.notice,
    })
}

#[instrument(skip(state, auth, multipart))]
pub async fn upload_scan(
    State(state): State<AppState>,
    auth: Result<AuthUser, AuthRejection>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ScanError> {
    let AuthUser(user_id) = auth.map_err(|_| ScanError::LoginRequired)?;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ScanError::InvalidUpload(e.body_text()))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }
        let original_name = field.file_name().unwrap_or("upload").to_string();
        let body = field
            .bytes()
            .await
            .map_err(|e| ScanError::InvalidUpload(e.body_text()))?;

        let stored = pipeline::store_upload(&state, user_id, &original_name, body)
            .await
            .map_err(|e| {
                warn!(error = %e, %user_id, "upload rejected");
                e
            })?;
        info!(%user_id, filename = %stored.filename, "image uploaded");
        return Ok(Json(UploadResponse {
            status: "success",
            filename: stored.filename,
            image_url: stored.image_url,
        }));
    }
    Err(ScanError::NoImage)
}

#[instrument(skip(state))]
pub async fn scan_loading(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(filename): Path<String>,
) -> Result<Json<LoadingView>, ScanError> {
    if state.sessions.uploaded(user_id).await.as_deref() != Some(filename.as_str()) {
        return Err(ScanError::UnknownUpload);
    }
    Ok(Json(LoadingView {
        image_url: state.storage.url(&filename),
        process_url: format!("/api/v1/process-scan/{}", filename),
        filename,
    }))
}

#[instrument(skip(state, auth))]
pub async fn process_scan(
    State(state): State<AppState>,
    auth: Result<AuthUser, AuthRejection>,
    Path(filename): Path<String>,
) -> Result<Json<StatusResponse>, ScanError> {
    let AuthUser(user_id) = auth.map_err(|_| ScanError::NotLoggedIn)?;
    match pipeline::process_scan(&state, user_id, &filename).await {
        Ok(_) => Ok(Json(StatusResponse { status: "success" })),
        Err(e) => {
            if matches!(e, ScanError::Service(_)) {
                error!(error = %e, %user_id, "scan processing failed");
            } else {
                warn!(error = %e, %user_id, "scan not completed");
            }
            Err(e)
        }
    }
}

/// Shows the pending result once; afterwards the client is sent back to the
/// upload form.
#[instrument(skip(state))]
pub async fn scan_result(State(state): State<AppState>, AuthUser(user_id): AuthUser) -> Response {
    match pipeline::consume_result(&state, user_id).await {
        Some(view) => Json(view).into_response(),
        None => Redirect::to(NO_RESULTS_REDIRECT).into_response(),
    }
}

#[instrument(skip(state))]
pub async fn scan_history(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(p): Query<Pagination>,
) -> Result<Json<Vec<HistoryEntry>>, (StatusCode, String)> {
    let limit = p.limit.clamp(1, 100);
    let offset = p.offset.max(0);
    let rows = state
        .scans
        .list_scans(user_id, limit, offset)
        .await
        .map_err(|e| {
            error!(error = %e, "list scans failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;
    Ok(Json(rows.into_iter().map(HistoryEntry::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::services::{JwtKeys, TokenKind};
    use crate::state::fakes::{FakeDecoder, MemoryScanStore};
    use axum::{
        body::{to_bytes, Body},
        extract::FromRef,
        http::{header, Request},
    };
    use serde_json::Value;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const PNG_1X1: &[u8] = &[
        0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
        0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
        0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0A, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
        0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
        0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
    ];
    const BOUNDARY: &str = "scanboundary";

    struct Harness {
        state: AppState,
        store: Arc<MemoryScanStore>,
        user_id: Uuid,
        token: String,
        _dir: tempfile::TempDir,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let mut state = AppState::fake(dir.path());
        let store = Arc::new(MemoryScanStore::default());
        let user_id = store.add_user("Ada", Some(70.0), Some(175.0));
        state.scans = store.clone();
        let token = token_for(&state, user_id);
        Harness {
            state,
            store,
            user_id,
            token,
            _dir: dir,
        }
    }

    fn token_for(state: &AppState, user_id: Uuid) -> String {
        JwtKeys::from_ref(state)
            .issue(user_id, TokenKind::Access)
            .unwrap()
    }

    fn multipart_body(field: &str, filename: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\nContent-Type: image/png\r\n\r\n"
        )
        .into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    async fn send(state: &AppState, req: Request<Body>) -> (StatusCode, Response) {
        let res = scan_routes()
            .with_state(state.clone())
            .oneshot(req)
            .await
            .unwrap();
        (res.status(), res)
    }

    async fn json_body(res: Response) -> Value {
        let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn upload(state: &AppState, token: &str, field: &str, data: &[u8]) -> (StatusCode, Value) {
        let req = Request::post("/scan")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body(field, "snack photo.png", data)))
            .unwrap();
        let (status, res) = send(state, req).await;
        (status, json_body(res).await)
    }

    fn authed(method: &str, uri: &str, token: &str) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    }

    #[tokio::test]
    async fn anonymous_upload_is_sent_to_login() {
        let h = harness();
        let req = Request::post("/scan")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(multipart_body("image", "a.png", PNG_1X1)))
            .unwrap();
        let (status, res) = send(&h.state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(res).await,
            serde_json::json!({
                "status": "error",
                "message": "Please log in first.",
                "redirect_url": "/api/v1/auth/login",
            })
        );
        assert_eq!(h.state.sessions.uploaded(h.user_id).await, None);
    }

    #[tokio::test]
    async fn anonymous_process_is_not_logged_in() {
        let h = harness();
        let req = Request::post("/process-scan/whatever.png")
            .body(Body::empty())
            .unwrap();
        let (status, res) = send(&h.state, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(res).await,
            serde_json::json!({ "status": "error", "message": "User not logged in." })
        );
    }

    #[tokio::test]
    async fn refresh_token_cannot_open_the_form() {
        let h = harness();
        let refresh = JwtKeys::from_ref(&h.state)
            .issue(h.user_id, TokenKind::Refresh)
            .unwrap();
        let (status, res) = send(&h.state, authed("GET", "/scan", &refresh)).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(
            json_body(res).await,
            serde_json::json!({ "status": "error", "message": "Access token required" })
        );
    }

    #[tokio::test]
    async fn form_echoes_notice() {
        let h = harness();
        let (status, res) = send(&h.state, authed("GET", "/scan?notice=hello", &h.token)).await;
        assert_eq!(status, StatusCode::OK);
        let body = json_body(res).await;
        assert_eq!(body["field"], "image");
        assert_eq!(body["stage"], "awaiting_upload");
        assert_eq!(body["notice"], "hello");
    }

    #[tokio::test]
    async fn upload_without_image_field_is_rejected() {
        let h = harness();
        let (status, body) = upload(&h.state, &h.token, "document", PNG_1X1).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No image uploaded.");
    }

    #[tokio::test]
    async fn rejected_uploads_leave_no_trace() {
        let h = harness();
        for data in [&b""[..], &b"not an image"[..]] {
            let (status, body) = upload(&h.state, &h.token, "image", data).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(body["status"], "error");
            assert_eq!(body["message"], "Invalid form data.");
            assert!(body["errors"]["image"][0].is_string());
        }
        let (_, body) = upload(&h.state, &h.token, "image", b"not an image").await;
        assert!(body["errors"]["image"][0].as_str().unwrap().contains("valid image"));

        assert_eq!(h.state.sessions.uploaded(h.user_id).await, None);
        let scans_dir = h.state.config.scans_dir();
        let stored = std::fs::read_dir(&scans_dir)
            .map(|entries| entries.count())
            .unwrap_or(0);
        assert_eq!(stored, 0, "nothing should be written to {}", scans_dir.display());
    }

    #[tokio::test]
    async fn upload_then_no_barcode() {
        let mut h = harness();
        h.state.decoder = Arc::new(FakeDecoder::nothing());
        let (status, body) = upload(&h.state, &h.token, "image", PNG_1X1).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "success");
        let filename = body["filename"].as_str().unwrap().to_string();
        assert!(filename.ends_with("_snack_photo.png"));

        let (status, res) = send(
            &h.state,
            authed("POST", &format!("/process-scan/{filename}"), &h.token),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        let body = json_body(res).await;
        assert_eq!(
            body,
            serde_json::json!({ "status": "error", "message": "No barcode detected in the image." })
        );
        assert!(!h.state.sessions.has_results(h.user_id).await);
        assert!(h.store.scans().is_empty());
    }

    #[tokio::test]
    async fn full_flow_shows_result_once_and_removes_image() {
        let h = harness();
        let (_, body) = upload(&h.state, &h.token, "image", PNG_1X1).await;
        let filename = body["filename"].as_str().unwrap().to_string();

        let (status, res) = send(
            &h.state,
            authed("GET", &format!("/scan-loading/{filename}"), &h.token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let loading = json_body(res).await;
        assert_eq!(loading["process_url"], format!("/api/v1/process-scan/{filename}"));

        let (status, res) = send(
            &h.state,
            authed("POST", &format!("/process-scan/{filename}"), &h.token),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json_body(res).await["status"], "success");
        assert_eq!(h.store.scans().len(), 1);

        let (status, res) = send(&h.state, authed("GET", "/result", &h.token)).await;
        assert_eq!(status, StatusCode::OK);
        let view = json_body(res).await;
        assert_eq!(view["product_name"], "Test Cola");
        assert_eq!(view["advisability"], "Yes");
        assert!(!view["summary_points"].as_array().unwrap().is_empty());
        assert!(!h.state.storage.exists(&filename).await);

        let (status, res) = send(&h.state, authed("GET", "/result", &h.token)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
        assert_eq!(
            res.headers()[header::LOCATION],
            "/api/v1/scan?notice=No%20recent%20scan%20results%20found."
        );
    }

    #[tokio::test]
    async fn result_redirects_when_nothing_pending() {
        let h = harness();
        let (status, _) = send(&h.state, authed("GET", "/result", &h.token)).await;
        assert_eq!(status, StatusCode::SEE_OTHER);
    }

    #[tokio::test]
    async fn other_users_upload_cannot_be_processed() {
        let h = harness();
        let (_, body) = upload(&h.state, &h.token, "image", PNG_1X1).await;
        let filename = body["filename"].as_str().unwrap().to_string();

        let intruder = h.store.add_user("Eve", None, None);
        let token = token_for(&h.state, intruder);
        let (status, res) = send(
            &h.state,
            authed("POST", &format!("/process-scan/{filename}"), &token),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json_body(res).await["message"], "Unknown upload.");
        assert!(h.state.storage.exists(&filename).await);
        assert!(!h.state.sessions.has_results(h.user_id).await);
    }

    #[tokio::test]
    async fn deleted_user_gets_not_found_and_file_is_removed() {
        let h = harness();
        let ghost = Uuid::new_v4();
        let token = token_for(&h.state, ghost);
        let (_, body) = upload(&h.state, &token, "image", PNG_1X1).await;
        let filename = body["filename"].as_str().unwrap().to_string();

        let (status, res) = send(
            &h.state,
            authed("GET", &format!("/process-scan/{filename}"), &token),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json_body(res).await["message"], "User not found.");
        assert!(!h.state.storage.exists(&filename).await);
    }

    #[tokio::test]
    async fn history_lists_newest_first() {
        let h = harness();
        for _ in 0..2 {
            let (_, body) = upload(&h.state, &h.token, "image", PNG_1X1).await;
            let filename = body["filename"].as_str().unwrap().to_string();
            send(
                &h.state,
                authed("POST", &format!("/process-scan/{filename}"), &h.token),
            )
            .await;
        }

        let (status, res) = send(&h.state, authed("GET", "/scans?limit=1", &h.token)).await;
        assert_eq!(status, StatusCode::OK);
        let rows = json_body(res).await;
        let rows = rows.as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["barcode"], "5449000000996");
        assert_eq!(rows[0]["analysis"]["advisability"], "Yes");
    }
}
