// ── Installation (system) domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a monitored installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum SystemStatus {
    Online,
    Offline,
    Warning,
}

impl SystemStatus {
    pub fn is_online(self) -> bool {
        matches!(self, Self::Online)
    }
}

/// A camera/LiDAR-equipped installation.
///
/// Mutated only by the telemetry broadcaster (heartbeat refresh) and
/// status transitions -- never directly by inbound commands.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct System {
    pub id: String,
    pub name: String,
    pub status: SystemStatus,
    pub last_heartbeat: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}
