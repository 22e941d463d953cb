use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use shared::{
    error::{ApiError, ErrorCode},
    protocol::{
        CreateFilterRequest, DeletedFilter, FilterRecord, FilterUsage, FilterUsageStats,
        PhotoUploadRequest, PhotoUploadResponse, VideoUploadRequest, VideoUploadResponse,
    },
};

use crate::app_state::AppState;

pub(crate) type HttpError = (StatusCode, Json<ApiError>);

pub(crate) fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> HttpError {
    (status_for(err.code), Json(err))
}

pub(crate) async fn list_filters(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<FilterRecord>>, HttpError> {
    let filters = server_api::list_filters(&state.api).await.map_err(reject)?;
    Ok(Json(filters))
}

pub(crate) async fn get_filter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<FilterRecord>, HttpError> {
    let filter = server_api::get_filter(&state.api, &name)
        .await
        .map_err(reject)?;
    Ok(Json(filter))
}

pub(crate) async fn create_filter(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateFilterRequest>,
) -> Result<(StatusCode, Json<FilterRecord>), HttpError> {
    let filter = server_api::create_filter(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(filter)))
}

pub(crate) async fn record_filter_use(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<FilterUsage>, HttpError> {
    let usage = server_api::record_filter_use(&state.api, &name)
        .await
        .map_err(reject)?;
    Ok(Json(usage))
}

pub(crate) async fn delete_filter(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<DeletedFilter>, HttpError> {
    let deleted = server_api::delete_filter(&state.api, &name)
        .await
        .map_err(reject)?;
    Ok(Json(deleted))
}

pub(crate) async fn filter_usage_stats(
    State(state): State<Arc<AppState>>,
) -> Result<Json<FilterUsageStats>, HttpError> {
    let stats = server_api::filter_usage_stats(&state.api)
        .await
        .map_err(reject)?;
    Ok(Json(stats))
}

pub(crate) async fn upload_photo(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PhotoUploadRequest>,
) -> Result<Json<PhotoUploadResponse>, HttpError> {
    let stored = server_api::store_photo(&state.api, req)
        .await
        .map_err(reject)?;
    Ok(Json(stored))
}

pub(crate) async fn upload_video(
    Json(req): Json<VideoUploadRequest>,
) -> Result<Json<VideoUploadResponse>, HttpError> {
    let received = server_api::receive_video(req).await.map_err(reject)?;
    Ok(Json(received))
}
