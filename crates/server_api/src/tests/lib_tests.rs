use super::*;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use shared::{
    domain::MediaKind,
    protocol::{CreateFilterRequest, PhotoUploadRequest, VideoUploadRequest},
};

async fn setup() -> (ApiContext, tempfile::TempDir) {
    let storage = Storage::new("sqlite::memory:").await.expect("db");
    storage.seed_default_filters().await.expect("seed");
    let media_dir = tempfile::tempdir().expect("tempdir");
    (
        ApiContext {
            storage,
            media_dir: media_dir.path().join("uploads"),
        },
        media_dir,
    )
}

fn create_request(name: &str, display_name: &str) -> CreateFilterRequest {
    CreateFilterRequest {
        name: name.to_string(),
        display_name: display_name.to_string(),
        description: None,
        background_image: None,
        icon: Some("🌊".to_string()),
        is_active: true,
        sort_order: 10,
    }
}

#[tokio::test]
async fn create_filter_requires_name_and_display_name() {
    let (ctx, _dir) = setup().await;
    let err = create_filter(&ctx, create_request("  ", "Ocean"))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);

    let err = create_filter(&ctx, create_request("ocean", ""))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn create_filter_rejects_overlong_name() {
    let (ctx, _dir) = setup().await;
    let err = create_filter(&ctx, create_request(&"x".repeat(51), "Long"))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn create_filter_reports_duplicate_names_as_conflict() {
    let (ctx, _dir) = setup().await;
    let err = create_filter(&ctx, create_request("Flower", "Another flower"))
        .await
        .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Conflict);
}

#[tokio::test]
async fn created_filter_is_listed_and_retrievable() {
    let (ctx, _dir) = setup().await;
    let created = create_filter(&ctx, create_request("Ocean", "Ocean Floor"))
        .await
        .expect("create");
    assert_eq!(created.name, "ocean");

    let listed = list_filters(&ctx).await.expect("list");
    assert_eq!(listed.last().map(|f| f.name.as_str()), Some("ocean"));

    let fetched = get_filter(&ctx, "OCEAN").await.expect("get");
    assert_eq!(fetched.display_name, "Ocean Floor");
}

#[tokio::test]
async fn record_use_and_delete_report_missing_filters() {
    let (ctx, _dir) = setup().await;
    let err = record_filter_use(&ctx, "nope").await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);
    let err = delete_filter(&ctx, "nope").await.expect_err("missing");
    assert_eq!(err.code, ErrorCode::NotFound);

    let usage = record_filter_use(&ctx, "space").await.expect("use");
    assert_eq!(usage.usage_count, 1);
    let deleted = delete_filter(&ctx, "Space").await.expect("delete");
    assert_eq!(deleted.name, "space");
    assert_eq!(
        get_filter(&ctx, "space").await.expect_err("gone").code,
        ErrorCode::NotFound
    );
}

#[tokio::test]
async fn usage_stats_compute_rounded_percentages() {
    let (ctx, _dir) = setup().await;
    let empty = filter_usage_stats(&ctx).await.expect("stats");
    assert_eq!(empty.total_usage, 0);
    assert!(empty.filters.iter().all(|f| f.usage_percentage == 0.0));

    record_filter_use(&ctx, "flower").await.expect("use");
    record_filter_use(&ctx, "flower").await.expect("use");
    record_filter_use(&ctx, "space").await.expect("use");

    let stats = filter_usage_stats(&ctx).await.expect("stats");
    assert_eq!(stats.total_filters, 4);
    assert_eq!(stats.total_usage, 3);
    assert_eq!(stats.filters[0].name, "flower");
    assert_eq!(stats.filters[0].usage_percentage, 66.67);
    assert_eq!(stats.filters[1].usage_percentage, 33.33);
}

#[tokio::test]
async fn storage_backed_catalog_resolves_and_counts_usage() {
    let (ctx, _dir) = setup().await;
    let catalog: &dyn FilterCatalog = &ctx.storage;

    let record = catalog
        .lookup_by_name("forest")
        .await
        .expect("lookup")
        .expect("seeded");
    assert_eq!(record.info().display_name, "Forest");
    assert!(catalog.lookup_by_name("typo").await.expect("lookup").is_none());

    catalog.increment_usage("forest").await.expect("increment");
    catalog
        .increment_usage("typo")
        .await
        .expect("missing filters are ignored");
    assert_eq!(get_filter(&ctx, "forest").await.expect("get").usage_count, 1);
}

#[test]
fn validate_data_url_accepts_supported_formats() {
    let validated =
        validate_data_url("data:image/jpeg;base64,AAAA", MediaKind::Photo).expect("valid");
    assert_eq!(validated.mime_type, "image/jpeg");
    assert_eq!(validated.extension, "jpg");
    assert_eq!(validated.payload_b64, "AAAA");

    let validated =
        validate_data_url("data:video/webm;base64,AAAA", MediaKind::Video).expect("valid");
    assert_eq!(validated.extension, "webm");
}

#[test]
fn validate_data_url_rejects_wrong_kind_missing_and_oversized() {
    assert!(matches!(
        validate_data_url("", MediaKind::Photo),
        Err(MediaError::Missing("photo"))
    ));
    assert!(matches!(
        validate_data_url("data:video/mp4;base64,AAAA", MediaKind::Photo),
        Err(MediaError::UnsupportedFormat { .. })
    ));
    assert!(matches!(
        validate_data_url("data:image/gif;base64,AAAA", MediaKind::Photo),
        Err(MediaError::UnsupportedFormat { .. })
    ));

    let oversized = format!("data:image/png;base64,{}", "A".repeat(14 * 1024 * 1024));
    assert!(matches!(
        validate_data_url(&oversized, MediaKind::Photo),
        Err(MediaError::TooLarge { .. })
    ));
}

#[tokio::test]
async fn store_photo_writes_decoded_bytes() {
    let (ctx, _dir) = setup().await;
    let bytes = b"\x89PNG fake image bytes";
    let response = store_photo(
        &ctx,
        PhotoUploadRequest {
            photo_data: format!("data:image/png;base64,{}", STANDARD.encode(bytes)),
            filter_used: "flower".into(),
            timestamp: None,
            metadata: Default::default(),
        },
    )
    .await
    .expect("store");

    assert!(response.saved);
    let info = response.photo_info;
    assert!(info.id.starts_with("photo_"));
    assert!(info.file_name.ends_with(".png"));
    assert_eq!(info.actual_file_size, bytes.len() as u64);
    assert_eq!(info.filter_used.as_str(), "flower");
    assert!(info.metadata.contains_key("originalSizeMb"));

    let written = std::fs::read(ctx.media_dir.join(&info.file_name)).expect("file written");
    assert_eq!(written, bytes);
}

#[tokio::test]
async fn store_photo_rejects_corrupt_base64() {
    let (ctx, _dir) = setup().await;
    let err = store_photo(
        &ctx,
        PhotoUploadRequest {
            photo_data: "data:image/png;base64,@@not-base64@@".to_string(),
            filter_used: "none".into(),
            timestamp: None,
            metadata: Default::default(),
        },
    )
    .await
    .expect_err("should fail");
    assert_eq!(err.code, ErrorCode::Validation);
}

#[tokio::test]
async fn receive_video_acknowledges_without_writing() {
    let (ctx, _dir) = setup().await;
    let response = receive_video(VideoUploadRequest {
        video_data: "data:video/mp4;base64,AAAA".to_string(),
        filter_used: "space".into(),
        duration: Some(3.5),
        timestamp: None,
        metadata: Default::default(),
    })
    .await
    .expect("video");
    assert!(response.received);
    assert_eq!(response.video_info.extension, "mp4");
    assert_eq!(response.video_info.duration, Some(3.5));
    assert!(!ctx.media_dir.exists());
}
