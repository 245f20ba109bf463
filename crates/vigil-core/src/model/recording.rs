// ── Recording session domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Requested output quality for a recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum VideoQuality {
    Low,
    Medium,
    High,
}

/// Lifecycle status of a recording session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RecordingStatus {
    Recording,
    Paused,
    Stopped,
}

impl RecordingStatus {
    /// A live session occupies the per-installation session slot.
    pub fn is_live(self) -> bool {
        !matches!(self, Self::Stopped)
    }
}

/// Fully-defaulted recording parameters. Immutable once embedded in a
/// session; free-text fields arrive pre-sanitized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingConfig {
    pub video_quality: VideoQuality,
    pub codec: String,
    pub lidar_point_density: f64,
    pub output_path: String,
    pub naming: String,
}

/// One recording run on an installation.
///
/// At most one live (non-stopped) session exists per installation at any
/// time -- the central concurrency invariant of the control plane.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingSession {
    pub id: String,
    pub system_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Elapsed milliseconds. Derived -- recomputed from the wall clock at
    /// read/broadcast time, never accumulated tick over tick.
    #[serde(rename = "duration")]
    pub duration_ms: u64,
    pub status: RecordingStatus,
    pub config: RecordingConfig,
}

impl RecordingSession {
    /// Elapsed time at `now`, saturating at zero for clock skew.
    pub fn duration_at(&self, now: DateTime<Utc>) -> u64 {
        (now - self.start_time).num_milliseconds().max(0) as u64
    }
}
