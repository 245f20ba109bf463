//! Core of the vigil fleet control plane.
//!
//! This crate owns everything with durable design value in the system:
//!
//! - **[`validate`]** — the validation gateway: pure predicates applied to
//!   every inbound command before it may touch shared state, plus the
//!   free-text sanitizer.
//! - **[`RateLimiter`]** — per-client fixed-window admission control for
//!   the request/response surface, with eviction of expired windows.
//! - **[`DeviceRegistry`]** — in-memory source of truth for systems and
//!   cameras, mutated only through validated commands and the telemetry
//!   broadcaster.
//! - **[`SessionTracker`]** — the recording-session state machine: one
//!   live session per installation, duration derived from the wall clock
//!   at read time.
//! - **[`protocol`]** — the wire contract shared by the REST surface, the
//!   channel gateway, and the consumer-side channel manager.
//!
//! Transports live elsewhere (`vigil-server`, `vigil-client`); nothing in
//! this crate performs I/O on the validation/mutation/broadcast path.

pub mod error;
pub mod model;
pub mod protocol;
pub mod ratelimit;
pub mod registry;
pub mod session;
pub mod validate;

// ── Primary re-exports ──────────────────────────────────────────────
pub use error::CoreError;
pub use protocol::{
    ApiResponse, ChannelEnvelope, RecordingRequest, ServerEvent, SettingsPatch, StatusSnapshot,
};
pub use ratelimit::{RateLimitConfig, RateLimiter};
pub use registry::DeviceRegistry;
pub use session::{SESSION_HISTORY_LIMIT, SessionTracker};

// Re-export model types at the crate root for ergonomics.
pub use model::{
    Alert, AlertSeverity, Camera, CameraMetrics, CameraSettings, CameraStatus, NetworkStatus,
    RecordingConfig, RecordingSession, RecordingStatus, StatusReport, System, SystemHealth,
    SystemStatus, VideoQuality,
};
