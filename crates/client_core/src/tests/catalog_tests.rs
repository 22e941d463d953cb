use super::*;

use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use chrono::Utc;
use shared::{
    domain::{FilterRecordId, MediaKind},
    error::ErrorCode,
    protocol::PhotoInfo,
};
use tokio::net::TcpListener;

#[derive(Clone, Default)]
struct StubState {
    uploads: Arc<Mutex<Vec<PhotoUploadRequest>>>,
}

fn flower() -> FilterRecord {
    FilterRecord {
        id: FilterRecordId(2),
        name: "flower".into(),
        display_name: "Flower Garden".into(),
        description: None,
        background_image: Some("/backgrounds/flower.jpg".into()),
        icon: Some("🌸".into()),
        is_active: true,
        sort_order: 1,
        usage_count: 4,
        last_used_at: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

async fn list_filters() -> Json<Vec<FilterRecord>> {
    Json(vec![flower()])
}

async fn health() -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ApiError::new(ErrorCode::Internal, "relay unavailable")),
    )
}

async fn upload_photo(
    State(state): State<StubState>,
    Json(req): Json<PhotoUploadRequest>,
) -> Json<PhotoUploadResponse> {
    let now = Utc::now();
    let info = PhotoInfo {
        id: "photo_1_abcdefghi".into(),
        kind: MediaKind::Photo,
        file_name: "photo_1_abcdefghi.png".into(),
        file_path: "uploads/photo_1_abcdefghi.png".into(),
        filter_used: req.filter_used.clone(),
        estimated_size_mb: 0.0,
        actual_file_size: 4,
        mime_type: "image/png".into(),
        extension: "png".into(),
        timestamp: now,
        received_at: now,
        metadata: serde_json::Map::new(),
    };
    state.uploads.lock().expect("lock").push(req);
    Json(PhotoUploadResponse {
        received: true,
        saved: true,
        photo_info: info,
    })
}

async fn spawn_stub() -> (String, StubState) {
    let state = StubState::default();
    let app = Router::new()
        .route("/api/filters", get(list_filters))
        .route("/api/media/photo", post(upload_photo))
        .route("/health", get(health))
        .with_state(state.clone());
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    (format!("http://{addr}/"), state)
}

#[test]
fn photo_data_url_prefixes_base64_payload() {
    assert_eq!(
        photo_data_url("image/png", b"\x89PNG"),
        "data:image/png;base64,iVBORw=="
    );
}

#[tokio::test]
async fn list_filters_decodes_catalog() {
    let (url, _state) = spawn_stub().await;
    let filters = CatalogClient::new(url).list_filters().await.expect("filters");
    assert_eq!(filters.len(), 1);
    assert_eq!(filters[0].display_name, "Flower Garden");
}

#[tokio::test]
async fn error_responses_surface_as_api_exceptions() {
    let (url, _state) = spawn_stub().await;
    let err = CatalogClient::new(url).health().await.expect_err("health fails");
    let api = err.downcast_ref::<ApiException>().expect("api exception");
    assert_eq!(api.code, ErrorCode::Internal);
    assert_eq!(api.message, "relay unavailable");
}

#[tokio::test]
async fn media_uploader_sends_file_as_data_url_with_filter() {
    let (url, state) = spawn_stub().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let photo = dir.path().join("shot.PNG");
    std::fs::write(&photo, b"\x89PNG").expect("write");

    let mut uploader = MediaUploader::new(CatalogClient::new(url), &photo);
    uploader
        .capture(&FilterId::new("space"))
        .await
        .expect("capture");

    assert_eq!(uploader.uploads(), 1);
    let uploads = state.uploads.lock().expect("lock");
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].filter_used.as_str(), "space");
    assert_eq!(uploads[0].photo_data, "data:image/png;base64,iVBORw==");
}

#[tokio::test]
async fn media_uploader_rejects_unsupported_files_without_uploading() {
    let (url, state) = spawn_stub().await;
    let dir = tempfile::tempdir().expect("tempdir");
    let photo = dir.path().join("shot.gif");
    std::fs::write(&photo, b"GIF89a").expect("write");

    let mut uploader = MediaUploader::new(CatalogClient::new(url), &photo);
    assert!(uploader.capture(&FilterId::none()).await.is_err());
    assert_eq!(uploader.uploads(), 0);
    assert!(state.uploads.lock().expect("lock").is_empty());
}
