use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::Utc;
use shared::{
    domain::MediaKind,
    error::{ApiError, ErrorCode},
    protocol::{
        PhotoInfo, PhotoUploadRequest, PhotoUploadResponse, VideoInfo, VideoUploadRequest,
        VideoUploadResponse,
    },
};
use thiserror::Error;
use tracing::{error, info};
use uuid::Uuid;

use crate::ApiContext;

pub const MAX_PHOTO_MB: f64 = 10.0;
pub const MAX_VIDEO_MB: f64 = 100.0;

const PHOTO_FORMATS: &[(&str, &str)] = &[
    ("image/png", "png"),
    ("image/jpeg", "jpg"),
    ("image/jpg", "jpg"),
    ("image/webp", "webp"),
];
const VIDEO_FORMATS: &[(&str, &str)] = &[
    ("video/mp4", "mp4"),
    ("video/webm", "webm"),
    ("video/mov", "mov"),
];

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("{0} data is required")]
    Missing(&'static str),
    #[error("unsupported {kind} format; supported: {supported}")]
    UnsupportedFormat {
        kind: &'static str,
        supported: String,
    },
    #[error("{kind} is too large: {actual_mb:.2}MB exceeds the {max_mb}MB limit")]
    TooLarge {
        kind: &'static str,
        max_mb: f64,
        actual_mb: f64,
    },
    #[error("{0} payload is not valid base64")]
    InvalidBase64(&'static str),
    #[error("failed to store media file: {0}")]
    Io(#[from] std::io::Error),
}

impl From<MediaError> for ApiError {
    fn from(value: MediaError) -> Self {
        let code = match value {
            MediaError::Io(_) => ErrorCode::Internal,
            _ => ErrorCode::Validation,
        };
        ApiError::new(code, value.to_string())
    }
}

/// A data URL that passed format and size checks.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedMedia<'a> {
    pub mime_type: &'static str,
    pub extension: &'static str,
    pub estimated_size_mb: f64,
    pub payload_b64: &'a str,
}

pub fn validate_data_url(data: &str, kind: MediaKind) -> Result<ValidatedMedia<'_>, MediaError> {
    let (formats, max_mb) = match kind {
        MediaKind::Photo => (PHOTO_FORMATS, MAX_PHOTO_MB),
        MediaKind::Video => (VIDEO_FORMATS, MAX_VIDEO_MB),
    };
    if data.is_empty() {
        return Err(MediaError::Missing(kind.as_str()));
    }

    let matched = formats.iter().find_map(|(mime, ext)| {
        data.strip_prefix("data:")
            .and_then(|rest| rest.strip_prefix(mime))
            .and_then(|rest| rest.strip_prefix(";base64,"))
            .map(|payload| (*mime, *ext, payload))
    });
    let Some((mime_type, extension, payload_b64)) = matched else {
        return Err(MediaError::UnsupportedFormat {
            kind: kind.as_str(),
            supported: formats
                .iter()
                .map(|(mime, _)| format!("data:{mime};base64,"))
                .collect::<Vec<_>>()
                .join(", "),
        });
    };

    let estimated_size_mb = (data.len() as f64 * 3.0 / 4.0) / (1024.0 * 1024.0);
    if estimated_size_mb > max_mb {
        return Err(MediaError::TooLarge {
            kind: kind.as_str(),
            max_mb,
            actual_mb: estimated_size_mb,
        });
    }

    Ok(ValidatedMedia {
        mime_type,
        extension,
        estimated_size_mb,
        payload_b64,
    })
}

fn media_id(kind: MediaKind) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{}_{}_{}",
        kind.as_str(),
        Utc::now().timestamp_millis(),
        &suffix[..9]
    )
}

pub async fn store_photo(
    ctx: &ApiContext,
    req: PhotoUploadRequest,
) -> Result<PhotoUploadResponse, ApiError> {
    info!(filter = %req.filter_used, "photo upload received");
    let validated = validate_data_url(&req.photo_data, MediaKind::Photo)?;
    let bytes = STANDARD
        .decode(validated.payload_b64)
        .map_err(|_| MediaError::InvalidBase64("photo"))?;

    let id = media_id(MediaKind::Photo);
    let file_name = format!("{id}.{}", validated.extension);
    let path = ctx.media_dir.join(&file_name);
    let write = async {
        tokio::fs::create_dir_all(&ctx.media_dir).await?;
        tokio::fs::write(&path, &bytes).await
    };
    if let Err(err) = write.await {
        error!(path = %path.display(), %err, "failed to write photo");
        return Err(MediaError::Io(err).into());
    }

    let now = Utc::now();
    let mut metadata = req.metadata;
    metadata.insert(
        "originalSizeMb".to_string(),
        serde_json::json!(validated.estimated_size_mb),
    );
    let photo_info = PhotoInfo {
        id,
        kind: MediaKind::Photo,
        file_path: path.to_string_lossy().into_owned(),
        file_name,
        filter_used: req.filter_used,
        estimated_size_mb: validated.estimated_size_mb,
        actual_file_size: bytes.len() as u64,
        mime_type: validated.mime_type.to_string(),
        extension: validated.extension.to_string(),
        timestamp: req.timestamp.unwrap_or(now),
        received_at: now,
        metadata,
    };
    info!(
        id = %photo_info.id,
        file = %photo_info.file_name,
        bytes = photo_info.actual_file_size,
        "photo stored"
    );

    Ok(PhotoUploadResponse {
        received: true,
        saved: true,
        photo_info,
    })
}

/// Videos are validated and acknowledged but not persisted.
pub async fn receive_video(req: VideoUploadRequest) -> Result<VideoUploadResponse, ApiError> {
    info!(
        filter = %req.filter_used,
        duration = ?req.duration,
        "video upload received"
    );
    let validated = validate_data_url(&req.video_data, MediaKind::Video)?;

    let now = Utc::now();
    let mut metadata = req.metadata;
    metadata.insert(
        "originalSizeMb".to_string(),
        serde_json::json!(validated.estimated_size_mb),
    );
    let video_info = VideoInfo {
        id: media_id(MediaKind::Video),
        kind: MediaKind::Video,
        filter_used: req.filter_used,
        duration: req.duration,
        estimated_size_mb: validated.estimated_size_mb,
        mime_type: validated.mime_type.to_string(),
        extension: validated.extension.to_string(),
        timestamp: req.timestamp.unwrap_or(now),
        received_at: now,
        data_length: req.video_data.len(),
        metadata,
    };
    info!(id = %video_info.id, size_mb = video_info.estimated_size_mb, "video acknowledged");

    Ok(VideoUploadResponse {
        received: true,
        video_info,
    })
}
