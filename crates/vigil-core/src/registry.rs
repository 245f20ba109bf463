//! In-memory device registry.
//!
//! Single source of truth for systems and cameras. Mutated only through
//! validated commands and the telemetry broadcaster; every mutation is a
//! narrow, total assignment behind a `DashMap` entry, so a bad input can
//! reject a command but never tear registry state.
//!
//! No module-level singleton: the registry is owned by the server's
//! context object, which makes multi-tenant and test-isolated instances
//! trivial.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;

use crate::error::CoreError;
use crate::model::{
    Camera, CameraMetrics, CameraSettings, CameraStatus, System, SystemStatus,
};
use crate::protocol::SettingsPatch;

/// Registry of all systems and cameras known to this deployment.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    systems: DashMap<String, System>,
    cameras: DashMap<String, Camera>,
}

impl DeviceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the demo fleet: two installations,
    /// four cameras on the primary one. State resets on process restart.
    pub fn seeded() -> Self {
        let registry = Self::new();
        let now = Utc::now();

        registry.insert_system(System {
            id: "system_1".into(),
            name: "Primary Monitoring System".into(),
            status: SystemStatus::Online,
            last_heartbeat: now,
            location: Some("Building A - Floor 3".into()),
        });
        registry.insert_system(System {
            id: "system_2".into(),
            name: "Secondary Monitoring System".into(),
            status: SystemStatus::Online,
            last_heartbeat: now - Duration::seconds(5),
            location: Some("Building B - Floor 1".into()),
        });

        let seed_cameras = [
            ("camera_1", "Front Camera", "rtsp://192.168.10.11/main", 45.0),
            ("camera_2", "Rear Camera", "rtsp://192.168.10.12/main", 43.0),
            ("camera_3", "Side Camera", "rtsp://192.168.10.13/main", 47.0),
            ("camera_4", "Top Camera", "rtsp://192.168.10.14/main", 44.0),
        ];
        for (id, name, url, temperature) in seed_cameras {
            registry.insert_camera(Camera {
                id: id.into(),
                name: name.into(),
                system_id: "system_1".into(),
                url: url.into(),
                status: CameraStatus::Connected,
                settings: CameraSettings::default(),
                metrics: CameraMetrics {
                    fps: 30.0,
                    resolution: "1920x1080".into(),
                    temperature,
                    errors: Vec::new(),
                },
                last_update: now,
            });
        }

        registry
    }

    // ── Population ───────────────────────────────────────────────────

    pub fn insert_system(&self, system: System) {
        self.systems.insert(system.id.clone(), system);
    }

    pub fn insert_camera(&self, camera: Camera) {
        self.cameras.insert(camera.id.clone(), camera);
    }

    // ── Lookups & snapshots ──────────────────────────────────────────

    pub fn system(&self, id: &str) -> Option<System> {
        self.systems.get(id).map(|entry| entry.value().clone())
    }

    pub fn camera(&self, id: &str) -> Option<Camera> {
        self.cameras.get(id).map(|entry| entry.value().clone())
    }

    /// All systems, ordered by id for stable output.
    pub fn systems(&self) -> Vec<System> {
        let mut systems: Vec<System> = self.systems.iter().map(|e| e.value().clone()).collect();
        systems.sort_by(|a, b| a.id.cmp(&b.id));
        systems
    }

    /// All cameras, ordered by id for stable output.
    pub fn cameras(&self) -> Vec<Camera> {
        let mut cameras: Vec<Camera> = self.cameras.iter().map(|e| e.value().clone()).collect();
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        cameras
    }

    /// Cameras attached to one installation, ordered by id.
    pub fn cameras_for_system(&self, system_id: &str) -> Vec<Camera> {
        let mut cameras: Vec<Camera> = self
            .cameras
            .iter()
            .filter(|e| e.system_id == system_id)
            .map(|e| e.value().clone())
            .collect();
        cameras.sort_by(|a, b| a.id.cmp(&b.id));
        cameras
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    pub fn camera_count(&self) -> usize {
        self.cameras.len()
    }

    // ── Validated mutations ──────────────────────────────────────────

    /// Apply a validated settings patch to one camera, clamping every
    /// written value. Returns the stored settings after the update.
    pub fn apply_camera_settings(
        &self,
        camera_id: &str,
        patch: &SettingsPatch,
        now: DateTime<Utc>,
    ) -> Result<CameraSettings, CoreError> {
        let mut entry = self
            .cameras
            .get_mut(camera_id)
            .ok_or_else(|| CoreError::not_found("Camera"))?;
        entry.settings.apply(patch);
        entry.last_update = now;
        Ok(entry.settings.clone())
    }

    // ── Broadcaster refresh ──────────────────────────────────────────

    /// Refresh the heartbeat of every online system to `now`. Offline
    /// and warning systems keep their stale heartbeat.
    pub fn refresh_heartbeats(&self, now: DateTime<Utc>) {
        for mut entry in self.systems.iter_mut() {
            if entry.status.is_online() {
                entry.last_heartbeat = now;
            }
        }
    }

    /// Overwrite one camera's sampled telemetry. Returns `false` for an
    /// unknown camera (broadcaster races with removal are benign).
    pub fn update_camera_telemetry(
        &self,
        camera_id: &str,
        fps: f64,
        temperature: f64,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(mut entry) = self.cameras.get_mut(camera_id) else {
            return false;
        };
        entry.metrics.fps = fps;
        entry.metrics.temperature = temperature;
        entry.last_update = now;
        true
    }

    /// Ids of all cameras, for per-camera telemetry resampling.
    pub fn camera_ids(&self) -> Vec<String> {
        self.cameras.iter().map(|e| e.id.clone()).collect()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn seeded_registry_matches_demo_fleet() {
        let registry = DeviceRegistry::seeded();
        assert_eq!(registry.system_count(), 2);
        assert_eq!(registry.camera_count(), 4);
        assert_eq!(registry.cameras_for_system("system_1").len(), 4);
        assert!(registry.cameras_for_system("system_2").is_empty());
    }

    #[test]
    fn snapshots_are_ordered_by_id() {
        let registry = DeviceRegistry::seeded();
        let ids: Vec<String> = registry.cameras().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["camera_1", "camera_2", "camera_3", "camera_4"]);
    }

    #[test]
    fn apply_settings_clamps_out_of_range_values() {
        let registry = DeviceRegistry::seeded();
        let patch = SettingsPatch::from_value(&json!({ "gain": 900 })).unwrap();
        let now = Utc::now();

        let stored = registry.apply_camera_settings("camera_1", &patch, now).unwrap();
        assert_eq!(stored.gain, 900.0);

        // Clamping is a registry-level guarantee independent of the
        // gateway's range validation.
        let wild = SettingsPatch {
            exposure: Some(2000.0),
            focus: Some(-5.0),
            ..SettingsPatch::default()
        };
        let stored = registry.apply_camera_settings("camera_1", &wild, now).unwrap();
        assert_eq!(stored.exposure, 1000.0);
        assert_eq!(stored.focus, 0.0);

        let camera = registry.camera("camera_1").unwrap();
        assert_eq!(camera.settings, stored);
        assert_eq!(camera.last_update, now);
    }

    #[test]
    fn apply_settings_to_unknown_camera_is_not_found() {
        let registry = DeviceRegistry::seeded();
        let err = registry
            .apply_camera_settings("camera_99", &SettingsPatch::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound { .. }));
    }

    #[test]
    fn heartbeat_refresh_skips_offline_systems() {
        let registry = DeviceRegistry::seeded();
        let stale = Utc::now() - Duration::hours(1);
        registry.insert_system(System {
            id: "system_3".into(),
            name: "Decommissioned".into(),
            status: SystemStatus::Offline,
            last_heartbeat: stale,
            location: None,
        });

        let now = Utc::now();
        registry.refresh_heartbeats(now);

        assert_eq!(registry.system("system_1").unwrap().last_heartbeat, now);
        assert_eq!(registry.system("system_3").unwrap().last_heartbeat, stale);
    }

    #[test]
    fn telemetry_update_overwrites_sampled_fields_only() {
        let registry = DeviceRegistry::seeded();
        let now = Utc::now();

        assert!(registry.update_camera_telemetry("camera_2", 29.4, 46.2, now));
        let camera = registry.camera("camera_2").unwrap();
        assert_eq!(camera.metrics.fps, 29.4);
        assert_eq!(camera.metrics.temperature, 46.2);
        assert_eq!(camera.metrics.resolution, "1920x1080");
        assert_eq!(camera.last_update, now);

        assert!(!registry.update_camera_telemetry("camera_99", 30.0, 40.0, now));
    }
}
