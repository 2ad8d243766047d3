//! Data models for the synchronized record kinds.
//!
//! Defines download records, search history entries, settings and the
//! progress events emitted by download engines.

use serde::{Deserialize, Serialize};

/// Status of a download record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed, // terminal
    Failed,    // terminal
    Cancelled, // terminal
}

impl DownloadStatus {
    /// Returns true if this is a terminal state (Completed, Failed or Cancelled).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed | DownloadStatus::Failed | DownloadStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::Downloading => "downloading",
            DownloadStatus::Paused => "paused",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
            DownloadStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DownloadStatus::Pending),
            "downloading" => Some(DownloadStatus::Downloading),
            "paused" => Some(DownloadStatus::Paused),
            "completed" => Some(DownloadStatus::Completed),
            "failed" => Some(DownloadStatus::Failed),
            "cancelled" => Some(DownloadStatus::Cancelled),
            _ => None,
        }
    }
}

/// Transfer phase reported by a download engine for an in-flight item.
///
/// Subset of [`DownloadStatus`] relevant while bytes are moving, plus the
/// engine-side warm-up states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStatus {
    Starting,
    Pending,
    Downloading,
    Completed, // terminal
    Failed,    // terminal
    Cancelled, // terminal
}

impl ProgressStatus {
    /// Returns true while the transfer is still considered active.
    ///
    /// Monotonic progress enforcement only applies in these states.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProgressStatus::Starting | ProgressStatus::Pending | ProgressStatus::Downloading
        )
    }

    /// Returns true if this is a terminal transition.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Map to the download record status this phase corresponds to.
    pub fn as_download_status(&self) -> DownloadStatus {
        match self {
            ProgressStatus::Starting | ProgressStatus::Pending => DownloadStatus::Pending,
            ProgressStatus::Downloading => DownloadStatus::Downloading,
            ProgressStatus::Completed => DownloadStatus::Completed,
            ProgressStatus::Failed => DownloadStatus::Failed,
            ProgressStatus::Cancelled => DownloadStatus::Cancelled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Starting => "starting",
            ProgressStatus::Pending => "pending",
            ProgressStatus::Downloading => "downloading",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Failed => "failed",
            ProgressStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "starting" => Some(ProgressStatus::Starting),
            "pending" => Some(ProgressStatus::Pending),
            "downloading" => Some(ProgressStatus::Downloading),
            "completed" => Some(ProgressStatus::Completed),
            "failed" => Some(ProgressStatus::Failed),
            "cancelled" => Some(ProgressStatus::Cancelled),
            _ => None,
        }
    }
}

/// A single tracked download.
///
/// Ids are client-generated UUIDs, stable across the local and remote
/// copies of the same logical download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRecord {
    /// Unique identifier (UUID)
    pub id: String,
    /// Display title of the media item
    pub title: String,
    /// Source URL the download was started from
    pub url: String,
    /// Requested output format (e.g. "mp4", "mp3")
    pub format: String,
    /// Destination path on disk
    pub path: String,
    /// Creation instant (Unix timestamp), used for merge ordering
    pub timestamp: i64,
    /// Current status in the download lifecycle
    pub status: DownloadStatus,
    /// Source platform (e.g. "youtube", "soundcloud")
    pub platform: String,
    /// Thumbnail URL, if the source provided one
    pub thumbnail: Option<String>,
    /// Total size in bytes, once known
    pub size_bytes: Option<u64>,
}

impl DownloadRecord {
    /// Create a new pending download with a fresh id and creation timestamp.
    pub fn new(title: String, url: String, format: String, path: String, platform: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title,
            url,
            format,
            path,
            timestamp: chrono::Utc::now().timestamp(),
            status: DownloadStatus::Pending,
            platform,
            thumbnail: None,
            size_bytes: None,
        }
    }

    pub fn with_thumbnail(mut self, thumbnail: Option<String>) -> Self {
        self.thumbnail = thumbnail;
        self
    }

    pub fn with_size(mut self, size_bytes: Option<u64>) -> Self {
        self.size_bytes = size_bytes;
        self
    }
}

/// One entry in the bounded, most-recent-first search history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHistoryEntry {
    /// Unique identifier (UUID)
    pub id: String,
    /// The query or URL the user looked up
    pub query: String,
    /// When the lookup happened (Unix timestamp)
    pub timestamp: i64,
    /// Resolved media title, if the lookup succeeded
    pub title: Option<String>,
    /// Resolved thumbnail URL, if any
    pub thumbnail: Option<String>,
}

impl SearchHistoryEntry {
    /// Create a new entry with a fresh id and current timestamp.
    pub fn new(query: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            query,
            timestamp: chrono::Utc::now().timestamp(),
            title: None,
            thumbnail: None,
        }
    }

    pub fn with_media(mut self, title: Option<String>, thumbnail: Option<String>) -> Self {
        self.title = title;
        self.thumbnail = thumbnail;
        self
    }
}

/// A key/value user setting.
///
/// Settings carry no timestamp; conflict resolution across stores is
/// processing-order based, which is a weaker guarantee than the
/// timestamped merge used for the other kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingEntry {
    pub key: String,
    pub value: String,
}

impl SettingEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Well-known setting keys with typed accessors.
///
/// The stores only see raw key/value pairs; these helpers keep the
/// callers honest about the keys the application actually uses.
pub mod setting_keys {
    pub const DOWNLOAD_PATH: &str = "download_path";
    pub const PREFERRED_FORMAT: &str = "preferred_format";
}

/// Progress telemetry for one download, as emitted by an engine.
///
/// Events arrive already normalized from the engine's own wire format;
/// the reconciler is the only consumer allowed to expose them further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    /// Id of the download this event belongs to
    pub id: String,
    /// Completion percentage, semantically 0-100
    pub progress: f64,
    /// Human-readable transfer speed, if the engine reports one
    pub speed: Option<String>,
    /// Human-readable time remaining, if the engine reports one
    pub eta: Option<String>,
    /// Transfer phase
    pub status: ProgressStatus,
}

/// The three record kinds kept in sync between the stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Downloads,
    SearchHistory,
    Settings,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Downloads => "downloads",
            RecordKind::SearchHistory => "search_history",
            RecordKind::Settings => "settings",
        }
    }
}
