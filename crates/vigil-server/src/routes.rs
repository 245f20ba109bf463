//! REST surface.
//!
//! Every `/api/*` route passes the origin gate and the per-client rate
//! limiter before its handler runs; the channel endpoint skips the
//! limiter (the window budget guards the request/response surface only).
//! All bodies are wrapped as `{success, data?, error?}`.

use std::net::SocketAddr;

use axum::{
    Json, Router,
    extract::{ConnectInfo, Path, Query, Request, State},
    http::{StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
};
use chrono::Utc;
use rand::Rng;
use serde::Deserialize;
use serde_json::Value;

use vigil_core::error::CoreError;
use vigil_core::model::{NetworkStatus, StatusReport, SystemHealth};
use vigil_core::protocol::{ApiResponse, RecordingRequest, SettingsPatch};
use vigil_core::validate::validate_id;

use crate::gateway;
use crate::state::AppState;

/// Build the full application router: REST surface plus channel endpoint.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/systems", get(list_systems))
        .route("/api/systems/:id", get(get_system))
        .route("/api/systems/:id/cameras", get(system_cameras))
        .route("/api/cameras/:id/settings", put(update_camera_settings))
        .route("/api/recording/start", post(start_recording))
        .route("/api/recording/stop", post(stop_recording))
        .route("/api/recording/pause", post(pause_recording))
        .route("/api/recording/resume", post(resume_recording))
        .route("/api/recording/sessions", get(list_sessions))
        .route("/api/status", get(status_report))
        .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
        .layer(middleware::from_fn_with_state(state.clone(), origin_gate))
        .route("/ws", get(gateway::ws_handler))
        .with_state(state)
}

// ── Middleware ───────────────────────────────────────────────────────

/// Refuse requests from origins outside the configured allow-list.
async fn origin_gate(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let origin = req
        .headers()
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());

    if !state.config().origin_allowed(origin) {
        tracing::warn!(origin = origin.unwrap_or("<none>"), "origin refused");
        return (
            StatusCode::FORBIDDEN,
            Json(ApiResponse::<()>::error("Not allowed by CORS")),
        )
            .into_response();
    }
    next.run(req).await
}

/// Per-client fixed-window admission, keyed by remote address.
async fn rate_limit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    req: Request,
    next: Next,
) -> Response {
    match state.limiter().check(&addr.ip().to_string()) {
        Ok(()) => next.run(req).await,
        Err(err) => {
            tracing::warn!(client = %addr.ip(), "request rate limited");
            error_response(&err)
        }
    }
}

// ── Handlers ─────────────────────────────────────────────────────────

async fn list_systems(State(state): State<AppState>) -> Response {
    Json(ApiResponse::success(state.registry().systems())).into_response()
}

async fn get_system(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !validate_id(&id) {
        return error_response(&CoreError::validation("Invalid system ID format"));
    }
    match state.registry().system(&id) {
        Some(system) => Json(ApiResponse::success(system)).into_response(),
        None => error_response(&CoreError::not_found("System")),
    }
}

async fn system_cameras(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    if !validate_id(&id) {
        return error_response(&CoreError::validation("Invalid system ID format"));
    }
    Json(ApiResponse::success(state.registry().cameras_for_system(&id))).into_response()
}

async fn update_camera_settings(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Option<Json<Value>>,
) -> Response {
    if !validate_id(&id) {
        return error_response(&CoreError::validation("Invalid camera ID format"));
    }
    let Some(Json(payload)) = body else {
        return error_response(&CoreError::validation("Invalid camera settings format"));
    };
    let patch = match SettingsPatch::from_value(&payload) {
        Ok(patch) => patch,
        Err(err) => return error_response(&err),
    };
    match state.registry().apply_camera_settings(&id, &patch, Utc::now()) {
        Ok(_) => {
            tracing::info!(camera = %id, "camera settings updated");
            Json(ApiResponse::<()>::ok()).into_response()
        }
        Err(err) => error_response(&err),
    }
}

async fn start_recording(State(state): State<AppState>, body: Option<Json<Value>>) -> Response {
    // Guard check first so a busy slot reports the conflict even when the
    // submitted config is also malformed.
    if state.sessions().is_active().await {
        return error_response(&CoreError::conflict("Recording already in progress"));
    }

    let payload = body.map_or(Value::Object(serde_json::Map::new()), |Json(value)| value);
    let request = match RecordingRequest::from_value(&payload) {
        Ok(request) => request,
        Err(err) => return error_response(&err),
    };

    match state
        .sessions()
        .start(&state.config().default_system_id, request)
        .await
    {
        Ok(session) => Json(ApiResponse::success(session)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn stop_recording(State(state): State<AppState>) -> Response {
    match state.sessions().stop().await {
        Ok(_) => Json(ApiResponse::<()>::ok()).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn pause_recording(State(state): State<AppState>) -> Response {
    match state.sessions().pause().await {
        Ok(session) => Json(ApiResponse::success(session)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn resume_recording(State(state): State<AppState>) -> Response {
    match state.sessions().resume().await {
        Ok(session) => Json(ApiResponse::success(session)).into_response(),
        Err(err) => error_response(&err),
    }
}

async fn list_sessions(State(state): State<AppState>) -> Response {
    Json(ApiResponse::success(state.sessions().history().await)).into_response()
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(rename = "systemId")]
    system_id: Option<String>,
}

/// Synthesized network + health snapshot. An absent or malformed
/// `systemId` falls back to the configured default installation.
async fn status_report(State(state): State<AppState>, Query(query): Query<StatusQuery>) -> Response {
    let system_id = match query.system_id {
        Some(id) if validate_id(&id) => id,
        _ => state.config().default_system_id.clone(),
    };

    let mut rng = rand::thread_rng();
    let report = StatusReport {
        system_id,
        network: NetworkStatus {
            bandwidth_usage: rng.gen_range(0.0..100.0),
            latency: rng.gen_range(0.0..50.0),
            packet_loss: rng.gen_range(0.0..5.0),
        },
        health: SystemHealth {
            cpu_usage: rng.gen_range(0.0..100.0),
            memory_usage: rng.gen_range(0.0..100.0),
            disk_usage: rng.gen_range(0.0..100.0),
            temperature: rng.gen_range(40.0..60.0),
            warnings: Vec::new(),
        },
        timestamp: Utc::now(),
    };

    Json(ApiResponse::success(report)).into_response()
}

// ── Error mapping ────────────────────────────────────────────────────

/// Map a [`CoreError`] onto the REST envelope. Only the public message
/// crosses the wire; rate-limit rejections carry their retry hint.
fn error_response(err: &CoreError) -> Response {
    let status = StatusCode::from_u16(err.status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    let body = match err {
        CoreError::RateLimited { retry_after_secs } => {
            ApiResponse::<()>::rate_limited(err.public_message(), *retry_after_secs)
        }
        _ => ApiResponse::<()>::error(err.public_message()),
    };
    (status, Json(body)).into_response()
}
