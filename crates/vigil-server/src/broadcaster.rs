//! Telemetry broadcaster.
//!
//! One fixed-interval tick for the whole deployment. Each tick refreshes
//! heartbeats and synthetic camera telemetry, pushes a full snapshot to
//! every observer, and recomputes the live session's duration. Fan-out
//! goes through the broadcast channel, so a slow observer can lag and
//! drop but can never stall the tick.

use chrono::Utc;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use vigil_core::protocol::{ServerEvent, StatusSnapshot};

use crate::state::AppState;

/// Nominal frame rate band sampled per camera per tick.
const FPS_BAND: std::ops::Range<f64> = 28.0..32.0;
/// Nominal temperature band, degrees Celsius.
const TEMPERATURE_BAND: std::ops::Range<f64> = 40.0..50.0;

/// Spawn the broadcast loop. Runs until `cancel` fires at teardown;
/// there is no per-tick cancellation.
pub fn spawn(state: AppState, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(run(state, cancel))
}

async fn run(state: AppState, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(state.config().broadcast_interval());
    interval.tick().await; // consume the immediate first tick

    tracing::info!(
        interval_ms = state.config().broadcast_interval_ms,
        "telemetry broadcaster started"
    );

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => tick(&state).await,
        }
    }

    tracing::debug!("telemetry broadcaster stopped");
}

/// One tick: refresh, snapshot, fan out.
async fn tick(state: &AppState) {
    let now = Utc::now();
    let registry = state.registry();

    registry.refresh_heartbeats(now);

    {
        let mut rng = rand::thread_rng();
        for camera_id in registry.camera_ids() {
            let fps = rng.gen_range(FPS_BAND);
            let temperature = rng.gen_range(TEMPERATURE_BAND);
            registry.update_camera_telemetry(&camera_id, fps, temperature, now);
        }
    }

    state.publish(ServerEvent::SystemStatus(StatusSnapshot {
        systems: registry.systems(),
        cameras: registry.cameras(),
    }));

    if let Some(session) = state.sessions().refresh_at(now).await {
        state.publish(ServerEvent::RecordingUpdate(session));
    }

    // Piggyback rate-limit housekeeping on the tick cadence.
    let evicted = state.limiter().sweep_expired();
    if evicted > 0 {
        tracing::debug!(evicted, "expired rate-limit windows evicted");
    }
}
