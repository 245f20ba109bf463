// ── Camera domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::protocol::SettingsPatch;
use crate::validate::{SETTING_MAX, SETTING_MIN};

/// Connection status of a single camera.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CameraStatus {
    Connected,
    Disconnected,
    Error,
}

/// Tunable camera parameters. Every field is always within
/// `[SETTING_MIN, SETTING_MAX]` -- writes clamp, they never reject.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraSettings {
    pub exposure: f64,
    pub gain: f64,
    pub white_balance: f64,
    pub focus: f64,
    pub zoom: f64,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            exposure: 50.0,
            gain: 50.0,
            white_balance: 50.0,
            focus: 50.0,
            zoom: 1.0,
        }
    }
}

impl CameraSettings {
    /// Apply a validated patch, clamping every written value into range.
    ///
    /// Absent fields are left untouched; the mutation is total per field
    /// (a plain assignment), so a failure can never leave a torn value.
    pub fn apply(&mut self, patch: &SettingsPatch) {
        if let Some(value) = patch.exposure {
            self.exposure = clamp_setting(value);
        }
        if let Some(value) = patch.gain {
            self.gain = clamp_setting(value);
        }
        if let Some(value) = patch.white_balance {
            self.white_balance = clamp_setting(value);
        }
        if let Some(value) = patch.focus {
            self.focus = clamp_setting(value);
        }
        if let Some(value) = patch.zoom {
            self.zoom = clamp_setting(value);
        }
    }
}

fn clamp_setting(value: f64) -> f64 {
    value.clamp(SETTING_MIN, SETTING_MAX)
}

/// Synthetic per-camera metrics.
///
/// Frame rate and temperature are resampled on every broadcast tick;
/// resolution and the error list are static as far as the core is
/// concerned.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CameraMetrics {
    pub fps: f64,
    pub resolution: String,
    pub temperature: f64,
    pub errors: Vec<String>,
}

/// A camera owned by the device registry.
///
/// `system_id` is a weak reference -- lookup only, no ownership.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Camera {
    pub id: String,
    pub name: String,
    pub system_id: String,
    pub url: String,
    pub status: CameraStatus,
    pub settings: CameraSettings,
    pub metrics: CameraMetrics,
    pub last_update: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn apply_clamps_high_values_to_max() {
        let mut settings = CameraSettings::default();
        settings.apply(&SettingsPatch {
            exposure: Some(2000.0),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.exposure, 1000.0);
    }

    #[test]
    fn apply_clamps_low_values_to_min() {
        let mut settings = CameraSettings::default();
        settings.apply(&SettingsPatch {
            exposure: Some(-5.0),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.exposure, 0.0);
    }

    #[test]
    fn apply_leaves_absent_fields_untouched() {
        let mut settings = CameraSettings::default();
        settings.apply(&SettingsPatch {
            gain: Some(75.0),
            ..SettingsPatch::default()
        });
        assert_eq!(settings.gain, 75.0);
        assert_eq!(settings.exposure, 50.0);
        assert_eq!(settings.zoom, 1.0);
    }

    #[test]
    fn settings_wire_names_are_camel_case() {
        let value = serde_json::to_value(CameraSettings::default()).unwrap();
        assert!(value.get("whiteBalance").is_some());
        assert!(value.get("white_balance").is_none());
    }
}
