use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VersionDescriptor {
    pub version: String,
    pub download_url: String,
    #[serde(default)]
    pub release_notes: String,
}

/// Envelope returned by `GET /version/check`.
#[derive(Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct VersionCheckResponse {
    pub code: i64,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Option<Vec<VersionDescriptor>>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub percent: Option<f64>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    pub bytes_per_second: f64,
}

#[derive(Serialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct DownloadSession {
    pub version: String,
    pub target_path: PathBuf,
    pub total_bytes: Option<u64>,
    pub downloaded_bytes: u64,
    pub started_at: DateTime<Utc>,
}

#[derive(Serialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "state")]
pub enum UpdateState {
    Idle,
    Checking,
    NoUpdate,
    UpdateAvailable { version: String },
    Downloading { version: String },
    Downloaded { version: String, file_path: PathBuf },
    Installing { file_path: PathBuf },
    Installed,
    ManualInstallRequired { file_path: PathBuf },
    Error { message: String },
}

impl UpdateState {
    /// A download or install is underway and must not be disturbed by checks.
    pub fn is_busy(&self) -> bool {
        matches!(self, Self::Downloading { .. } | Self::Installing { .. })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Installed | Self::ManualInstallRequired { .. })
    }
}
