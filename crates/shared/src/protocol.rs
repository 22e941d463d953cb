use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{ClientRole, FilterId, FilterRecordId, MediaKind};

/// Frames sent by a kiosk client to the relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ClientMessage {
    Register { role: ClientRole },
    ChangeFilter { filter: FilterId },
    StartCapture,
    CountdownTick { count: u32 },
    CaptureComplete,
}

impl ClientMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::ChangeFilter { .. } => "changeFilter",
            Self::StartCapture => "startCapture",
            Self::CountdownTick { .. } => "countdownTick",
            Self::CaptureComplete => "captureComplete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceStatus {
    pub display_connected: bool,
    pub control_connected: bool,
}

/// Catalog metadata attached to a `filterUpdate` when the relay could resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterInfo {
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
}

/// Frames sent by the relay to kiosk clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum ServerEvent {
    ConnectionStatus(PresenceStatus),
    FilterUpdate {
        filter: FilterId,
        #[serde(
            rename = "filterInfo",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        filter_info: Option<FilterInfo>,
    },
    StartCountdown,
    CaptureStarted,
    CountdownUpdate {
        count: u32,
    },
    CaptureFinished,
    RoleSuperseded {
        role: ClientRole,
    },
}

impl ServerEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionStatus(_) => "connectionStatus",
            Self::FilterUpdate { .. } => "filterUpdate",
            Self::StartCountdown => "startCountdown",
            Self::CaptureStarted => "captureStarted",
            Self::CountdownUpdate { .. } => "countdownUpdate",
            Self::CaptureFinished => "captureFinished",
            Self::RoleSuperseded { .. } => "roleSuperseded",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRecord {
    pub id: FilterRecordId,
    pub name: String,
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    pub is_active: bool,
    pub sort_order: i64,
    pub usage_count: i64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FilterRecord {
    pub fn info(&self) -> FilterInfo {
        FilterInfo {
            name: self.name.clone(),
            display_name: self.display_name.clone(),
            icon: self.icon.clone(),
            background_image: self.background_image.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFilterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub background_image: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub sort_order: i64,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterUsage {
    pub name: String,
    pub usage_count: i64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletedFilter {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterUsageEntry {
    pub name: String,
    pub display_name: String,
    pub usage_count: i64,
    pub usage_percentage: f64,
    #[serde(default)]
    pub last_used_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterUsageStats {
    pub total_filters: usize,
    pub total_usage: i64,
    pub filters: Vec<FilterUsageEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadRequest {
    #[serde(default)]
    pub photo_data: String,
    #[serde(default = "default_filter_used")]
    pub filter_used: FilterId,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadRequest {
    #[serde(default)]
    pub video_data: String,
    #[serde(default = "default_filter_used")]
    pub filter_used: FilterId,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

fn default_filter_used() -> FilterId {
    FilterId::none()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoInfo {
    pub id: String,
    pub kind: MediaKind,
    pub file_name: String,
    pub file_path: String,
    pub filter_used: FilterId,
    pub estimated_size_mb: f64,
    pub actual_file_size: u64,
    pub mime_type: String,
    pub extension: String,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoInfo {
    pub id: String,
    pub kind: MediaKind,
    pub filter_used: FilterId,
    #[serde(default)]
    pub duration: Option<f64>,
    pub estimated_size_mb: f64,
    pub mime_type: String,
    pub extension: String,
    pub timestamp: DateTime<Utc>,
    pub received_at: DateTime<Utc>,
    pub data_length: usize,
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoUploadResponse {
    pub received: bool,
    pub saved: bool,
    pub photo_info: PhotoInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoUploadResponse {
    pub received: bool,
    pub video_info: VideoInfo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectedClients {
    pub display: bool,
    pub control: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub connected_clients: ConnectedClients,
    pub current_filter: FilterId,
    pub capture_in_progress: bool,
    pub open_connections: usize,
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
