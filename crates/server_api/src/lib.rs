use std::path::PathBuf;

use async_trait::async_trait;
use shared::{
    error::{ApiError, ErrorCode},
    protocol::FilterRecord,
};
use storage::Storage;
use tracing::debug;

mod filters;
mod media;

pub use filters::{
    create_filter, delete_filter, filter_record, filter_usage_stats, get_filter, list_filters,
    record_filter_use,
};
pub use media::{
    receive_video, store_photo, validate_data_url, MediaError, ValidatedMedia, MAX_PHOTO_MB,
    MAX_VIDEO_MB,
};

#[derive(Clone)]
pub struct ApiContext {
    pub storage: Storage,
    pub media_dir: PathBuf,
}

/// Read/usage access to the filter catalog as seen by the realtime relay.
#[async_trait]
pub trait FilterCatalog: Send + Sync {
    async fn lookup_by_name(&self, name: &str) -> anyhow::Result<Option<FilterRecord>>;
    async fn increment_usage(&self, name: &str) -> anyhow::Result<()>;
}

#[async_trait]
impl FilterCatalog for Storage {
    async fn lookup_by_name(&self, name: &str) -> anyhow::Result<Option<FilterRecord>> {
        Ok(self.find_by_name(name).await?.map(filter_record))
    }

    async fn increment_usage(&self, name: &str) -> anyhow::Result<()> {
        if Storage::increment_usage(self, name).await?.is_none() {
            debug!(filter = name, "usage not recorded: filter is not in the catalog");
        }
        Ok(())
    }
}

/// Catalog used when the relay runs without a database.
pub struct MissingFilterCatalog;

#[async_trait]
impl FilterCatalog for MissingFilterCatalog {
    async fn lookup_by_name(&self, _name: &str) -> anyhow::Result<Option<FilterRecord>> {
        Ok(None)
    }

    async fn increment_usage(&self, _name: &str) -> anyhow::Result<()> {
        Ok(())
    }
}

fn internal(err: anyhow::Error) -> ApiError {
    ApiError::new(ErrorCode::Internal, err.to_string())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
