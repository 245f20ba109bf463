//! Wire protocol shared by the REST surface and the persistent channel.
//!
//! Channel frames are JSON text envelopes `{"event": <name>, "data": <payload>}`.
//! Inbound payloads stay raw [`Value`]s until the validation gateway has
//! passed them; outbound events are a typed enum so the server can never
//! emit a malformed frame.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::CoreError;
use crate::model::{Camera, CameraSettings, RecordingConfig, RecordingSession, System, VideoQuality};
use crate::validate::{sanitize_text, validate_camera_settings, validate_recording_config};

// ── Event names ──────────────────────────────────────────────────────

/// Inbound (client → server) channel events.
pub mod inbound {
    pub const CAMERA_UPDATE_SETTINGS: &str = "camera:updateSettings";
    pub const RECORDING_START: &str = "recording:start";
    pub const RECORDING_STOP: &str = "recording:stop";
    pub const RECORDING_PAUSE: &str = "recording:pause";
    pub const RECORDING_RESUME: &str = "recording:resume";
    pub const LIDAR_UPDATE_VIEW: &str = "lidar:updateView";
}

/// Outbound (server → client) channel events.
pub mod outbound {
    pub const SYSTEM_STATUS: &str = "system:status";
    pub const RECORDING_UPDATE: &str = "recording:update";
    pub const CAMERA_SETTINGS_UPDATED: &str = "camera:settingsUpdated";
    pub const LIDAR_VIEW_UPDATED: &str = "lidar:viewUpdated";
    pub const ERROR: &str = "error";
}

// ── Channel envelope ─────────────────────────────────────────────────

/// Raw channel frame as it crosses the trust boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelEnvelope {
    pub event: String,
    #[serde(default)]
    pub data: Value,
}

impl ChannelEnvelope {
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }
}

// ── Outbound events ──────────────────────────────────────────────────

/// Full-state push of all systems and cameras, sent every broadcast tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub systems: Vec<System>,
    pub cameras: Vec<Camera>,
}

/// Every event the server can emit on the channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum ServerEvent {
    #[serde(rename = "system:status")]
    SystemStatus(StatusSnapshot),

    #[serde(rename = "recording:update")]
    RecordingUpdate(RecordingSession),

    #[serde(rename = "camera:settingsUpdated")]
    CameraSettingsUpdated {
        #[serde(rename = "cameraId")]
        camera_id: String,
        settings: CameraSettings,
    },

    #[serde(rename = "lidar:viewUpdated")]
    LidarViewUpdated(Value),

    #[serde(rename = "error")]
    Error { message: String },
}

impl ServerEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire name of this event, for per-event subscription dispatch.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SystemStatus(_) => outbound::SYSTEM_STATUS,
            Self::RecordingUpdate(_) => outbound::RECORDING_UPDATE,
            Self::CameraSettingsUpdated { .. } => outbound::CAMERA_SETTINGS_UPDATED,
            Self::LidarViewUpdated(_) => outbound::LIDAR_VIEW_UPDATED,
            Self::Error { .. } => outbound::ERROR,
        }
    }
}

// ── REST response envelope ───────────────────────────────────────────

/// Uniform `{success, data?, error?}` wrapper for every REST response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            retry_after: None,
        }
    }

    /// Success with no payload (mutations that only acknowledge).
    pub fn ok() -> Self {
        Self {
            success: true,
            data: None,
            error: None,
            retry_after: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            retry_after: None,
        }
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
            retry_after: Some(retry_after_secs),
        }
    }
}

// ── Typed inbound payloads ───────────────────────────────────────────

/// Partial camera-settings update. Parsed only after the validation
/// gateway has passed the raw payload, so construction cannot observe
/// unknown keys or non-numeric values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exposure: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gain: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub white_balance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub focus: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zoom: Option<f64>,
}

impl SettingsPatch {
    /// Validate and parse a raw settings payload.
    pub fn from_value(payload: &Value) -> Result<Self, CoreError> {
        if !validate_camera_settings(payload) {
            return Err(CoreError::validation("Invalid camera settings format"));
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| CoreError::Internal(format!("settings payload re-parse failed: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Recording-start request with explicit optional fields.
///
/// Unrecognized keys are tolerated (ignored); recognized ones are
/// type-checked by the gateway before this struct exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_quality: Option<VideoQuality>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub codec: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lidar_point_density: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub naming: Option<String>,
}

impl RecordingRequest {
    /// Validate and parse a raw recording-config payload.
    pub fn from_value(payload: &Value) -> Result<Self, CoreError> {
        if !validate_recording_config(payload) {
            return Err(CoreError::validation("Invalid recording configuration"));
        }
        serde_json::from_value(payload.clone())
            .map_err(|e| CoreError::Internal(format!("recording payload re-parse failed: {e}")))
    }

    /// Apply defaults and sanitize free-text fields into a final config.
    pub fn into_config(self) -> RecordingConfig {
        RecordingConfig {
            video_quality: self.video_quality.unwrap_or(VideoQuality::High),
            codec: sanitize_text(self.codec.as_deref().unwrap_or("h264")),
            lidar_point_density: self.lidar_point_density.unwrap_or(0.0).max(0.0),
            output_path: sanitize_text(self.output_path.as_deref().unwrap_or("")),
            naming: sanitize_text(self.naming.as_deref().unwrap_or("")),
        }
    }
}
