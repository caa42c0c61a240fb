//! Download state machine and the view handed to observers (§3, §4.E).

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub type DownloadId = String;

/// Status of a download, matching the state machine in the specification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Queued,
    Downloading,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl DownloadStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DownloadStatus::Queued => "queued",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "queued" => DownloadStatus::Queued,
            "downloading" => DownloadStatus::Downloading,
            "paused" => DownloadStatus::Paused,
            "completed" => DownloadStatus::Completed,
            "failed" => DownloadStatus::Failed,
            "cancelled" => DownloadStatus::Cancelled,
            _ => DownloadStatus::Failed,
        }
    }
}

/// Mutable progress fields, written only by the download's own worker while
/// it is active. Read under a short lock by the snapshot publisher.
#[derive(Debug, Clone)]
pub struct Progress {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
    pub speed_bps: u64,
    pub eta_seconds: u64,
    pub completed_at: Option<i64>,
}

impl Default for Progress {
    fn default() -> Self {
        Progress {
            downloaded_bytes: 0,
            total_bytes: 0,
            status: DownloadStatus::Queued,
            error_message: None,
            speed_bps: 0,
            eta_seconds: 0,
            completed_at: None,
        }
    }
}

/// Immutable facts about a download, fixed for its lifetime (§3: "filename/folder
/// never change after creation").
#[derive(Debug, Clone)]
pub struct DownloadMeta {
    pub id: DownloadId,
    pub url: String,
    pub folder: String,
    pub filename: String,
    pub created_at: i64,
}

/// Progress sub-object in the snapshot view (§4.E).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressView {
    pub downloaded_bytes: u64,
    pub total_bytes: u64,
    pub percentage: f64,
    pub speed_bps: u64,
    pub eta_seconds: u64,
}

/// One row of the snapshot array returned by `get-snapshot` (§4.E, §6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadView {
    pub id: DownloadId,
    pub url: String,
    pub folder: String,
    pub filename: String,
    pub status: DownloadStatus,
    pub error_message: Option<String>,
    pub progress: ProgressView,
}

impl DownloadView {
    pub fn new(meta: &DownloadMeta, progress: &Progress) -> Self {
        let percentage = if progress.total_bytes > 0 {
            let pct = progress.downloaded_bytes as f64 / progress.total_bytes as f64 * 100.0;
            (pct * 100.0).round() / 100.0
        } else {
            0.0
        };
        DownloadView {
            id: meta.id.clone(),
            url: meta.url.clone(),
            folder: meta.folder.clone(),
            filename: meta.filename.clone(),
            status: progress.status,
            error_message: progress.error_message.clone(),
            progress: ProgressView {
                downloaded_bytes: progress.downloaded_bytes,
                total_bytes: progress.total_bytes,
                percentage,
                speed_bps: progress.speed_bps,
                eta_seconds: progress.eta_seconds,
            },
        }
    }
}

pub fn unix_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
