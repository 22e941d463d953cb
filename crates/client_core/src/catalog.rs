use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use shared::{
    domain::FilterId,
    error::{ApiError, ApiException},
    protocol::{FilterRecord, HealthResponse, PhotoUploadRequest, PhotoUploadResponse},
};
use tracing::info;

use crate::display::CaptureAction;

/// HTTP access to the relay's filter catalog and media endpoints.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: Client,
    base_url: String,
}

impl CatalogClient {
    pub fn new(server_url: impl Into<String>) -> Self {
        let base_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http: Client::new(),
            base_url,
        }
    }

    pub async fn list_filters(&self) -> Result<Vec<FilterRecord>> {
        let response = self
            .http
            .get(format!("{}/api/filters", self.base_url))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn health(&self) -> Result<HealthResponse> {
        let response = self
            .http
            .get(format!("{}/health", self.base_url))
            .send()
            .await?;
        decode(response).await
    }

    pub async fn upload_photo(&self, request: &PhotoUploadRequest) -> Result<PhotoUploadResponse> {
        let response = self
            .http
            .post(format!("{}/api/media/photo", self.base_url))
            .json(request)
            .send()
            .await?;
        decode(response).await
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
    let status = response.status();
    if status.is_success() {
        return response
            .json()
            .await
            .context("server returned an unexpected body");
    }
    match response.json::<ApiError>().await {
        Ok(err) => Err(ApiException::from(err).into()),
        Err(_) => Err(anyhow!("server returned {status}")),
    }
}

pub fn photo_data_url(mime_type: &str, bytes: &[u8]) -> String {
    format!("data:{mime_type};base64,{}", STANDARD.encode(bytes))
}

fn photo_mime_type(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

/// Capture action that uploads an image file from disk as the captured photo.
pub struct MediaUploader {
    catalog: CatalogClient,
    source: PathBuf,
    uploads: usize,
}

impl MediaUploader {
    pub fn new(catalog: CatalogClient, source: impl Into<PathBuf>) -> Self {
        Self {
            catalog,
            source: source.into(),
            uploads: 0,
        }
    }

    pub fn uploads(&self) -> usize {
        self.uploads
    }
}

#[async_trait]
impl CaptureAction for MediaUploader {
    async fn capture(&mut self, filter: &FilterId) -> Result<()> {
        let mime_type = photo_mime_type(&self.source).ok_or_else(|| {
            anyhow!(
                "unsupported photo file '{}'; expected png, jpg or webp",
                self.source.display()
            )
        })?;
        let bytes = tokio::fs::read(&self.source)
            .await
            .with_context(|| format!("failed to read photo '{}'", self.source.display()))?;

        let request = PhotoUploadRequest {
            photo_data: photo_data_url(mime_type, &bytes),
            filter_used: filter.clone(),
            timestamp: None,
            metadata: serde_json::Map::new(),
        };
        let response = self.catalog.upload_photo(&request).await?;
        self.uploads += 1;
        info!(
            id = %response.photo_info.id,
            file = %response.photo_info.file_name,
            %filter,
            "photo uploaded"
        );
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/catalog_tests.rs"]
mod tests;
