// ── Synthesized status-report types ──
//
// Shape of `GET /api/status`: a point-in-time network and health
// snapshot for one installation, sampled per request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkStatus {
    pub bandwidth_usage: f64,
    pub latency: f64,
    pub packet_loss: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemHealth {
    pub cpu_usage: f64,
    pub memory_usage: f64,
    pub disk_usage: f64,
    pub temperature: f64,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub system_id: String,
    pub network: NetworkStatus,
    pub health: SystemHealth,
    pub timestamp: DateTime<Utc>,
}
