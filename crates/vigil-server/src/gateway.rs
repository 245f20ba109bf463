//! Channel gateway.
//!
//! Accepts persistent WebSocket connections, runs the injected admission
//! check before a connection may subscribe, and demultiplexes named
//! inbound events to the validation gateway and the state containers.
//!
//! Acknowledgments go to the originating connection only; global
//! consistency rides on the broadcaster's next tick (≤ one interval).
//! Close frames and transport errors are logged, never re-raised, and
//! every `error` event carries a short machine-readable message.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{broadcast, mpsc};

use vigil_core::protocol::{ChannelEnvelope, RecordingRequest, ServerEvent, SettingsPatch, inbound};
use vigil_core::validate::validate_id;

use crate::state::AppState;

/// Outbound frames buffered per connection before the writer applies
/// backpressure to the connection task (never to the broadcaster).
const WRITE_QUEUE_CAPACITY: usize = 64;

#[derive(Debug, Deserialize)]
pub struct ChannelParams {
    token: Option<String>,
}

/// Upgrade handler for `GET /ws`.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ChannelParams>,
    headers: HeaderMap,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !state.config().origin_allowed(origin) {
        tracing::warn!(remote = %addr, origin = origin.unwrap_or("<none>"), "channel origin refused");
        return StatusCode::FORBIDDEN.into_response();
    }

    // Admission runs before the connection may subscribe to anything.
    if !state.admission().admit(params.token.as_deref()) {
        tracing::warn!(remote = %addr, "channel admission refused");
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_channel(state, socket, addr))
}

async fn handle_channel(state: AppState, socket: WebSocket, remote: SocketAddr) {
    let (mut sink, mut stream) = socket.split();

    // Dedicated writer so a slow socket stalls only this connection's
    // queue, never the shared fan-out.
    let (tx, mut rx) = mpsc::channel::<Message>(WRITE_QUEUE_CAPACITY);
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            if sink.send(message).await.is_err() {
                break;
            }
        }
    });

    let mut events = state.subscribe_events();
    tracing::info!(remote = %remote, observers = state.observer_count(), "channel connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if send_event(&tx, &event).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    tracing::warn!(remote = %remote, missed, "slow observer, snapshots dropped");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let reply = handle_frame(&state, text.as_str()).await;
                    if send_event(&tx, &reply).await.is_err() {
                        break;
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(frame) => tracing::info!(
                            remote = %remote,
                            code = frame.code,
                            reason = %frame.reason,
                            "channel close frame"
                        ),
                        None => tracing::info!(remote = %remote, "channel close frame"),
                    }
                    break;
                }
                Some(Ok(_)) => {
                    // Ping/pong are answered by the transport; binary is
                    // not part of the protocol.
                }
                Some(Err(err)) => {
                    tracing::warn!(remote = %remote, error = %err, "channel read error");
                    break;
                }
                None => break,
            },
        }
    }

    drop(tx);
    let _ = writer.await;
    tracing::info!(remote = %remote, "channel disconnected");
}

/// Serialize and queue one event for this connection.
async fn send_event(tx: &mpsc::Sender<Message>, event: &ServerEvent) -> Result<(), ()> {
    match serde_json::to_string(event) {
        Ok(json) => tx.send(Message::Text(json)).await.map_err(|_| ()),
        Err(err) => {
            tracing::error!(error = %err, "event serialization failed");
            Ok(())
        }
    }
}

/// Parse one inbound text frame and produce the private reply.
async fn handle_frame(state: &AppState, text: &str) -> Arc<ServerEvent> {
    let envelope: ChannelEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::debug!(error = %err, "unparseable channel frame");
            return Arc::new(ServerEvent::error("Invalid data format"));
        }
    };
    Arc::new(handle_command(state, envelope).await)
}

/// Demultiplex a named inbound event to its handler.
pub async fn handle_command(state: &AppState, envelope: ChannelEnvelope) -> ServerEvent {
    match envelope.event.as_str() {
        inbound::CAMERA_UPDATE_SETTINGS => update_camera_settings(state, &envelope.data),
        inbound::RECORDING_START => start_recording(state, &envelope.data).await,
        inbound::RECORDING_STOP => stop_recording(state).await,
        inbound::RECORDING_PAUSE => pause_recording(state).await,
        inbound::RECORDING_RESUME => resume_recording(state).await,
        inbound::LIDAR_UPDATE_VIEW => update_lidar_view(&envelope.data),
        other => {
            tracing::warn!(event = other, "unknown channel event");
            ServerEvent::error("Unknown event")
        }
    }
}

fn update_camera_settings(state: &AppState, data: &Value) -> ServerEvent {
    let Some(payload) = data.as_object() else {
        return ServerEvent::error("Invalid data format");
    };
    let Some(camera_id) = payload.get("cameraId").and_then(Value::as_str) else {
        return ServerEvent::error("Invalid camera ID");
    };
    if !validate_id(camera_id) {
        return ServerEvent::error("Invalid camera ID");
    }

    let settings = payload.get("settings").cloned().unwrap_or(Value::Null);
    let Ok(patch) = SettingsPatch::from_value(&settings) else {
        return ServerEvent::error("Invalid camera settings");
    };

    match state
        .registry()
        .apply_camera_settings(camera_id, &patch, Utc::now())
    {
        Ok(settings) => {
            tracing::info!(camera = camera_id, "camera settings updated");
            ServerEvent::CameraSettingsUpdated {
                camera_id: camera_id.to_owned(),
                settings,
            }
        }
        Err(_) => ServerEvent::error("Camera not found"),
    }
}

async fn start_recording(state: &AppState, data: &Value) -> ServerEvent {
    let Ok(request) = RecordingRequest::from_value(data) else {
        return ServerEvent::error("Invalid recording configuration");
    };
    match state
        .sessions()
        .start(&state.config().default_system_id, request)
        .await
    {
        Ok(session) => ServerEvent::RecordingUpdate(session),
        Err(_) => ServerEvent::error("Recording already in progress"),
    }
}

async fn stop_recording(state: &AppState) -> ServerEvent {
    // The inbound payload may carry a sessionId; the slot is singular per
    // installation, so the id adds nothing and is not consulted.
    match state.sessions().stop().await {
        Ok(session) => ServerEvent::RecordingUpdate(session),
        Err(_) => ServerEvent::error("No active recording"),
    }
}

async fn pause_recording(state: &AppState) -> ServerEvent {
    match state.sessions().pause().await {
        Ok(session) => ServerEvent::RecordingUpdate(session),
        Err(_) => ServerEvent::error("No active recording"),
    }
}

async fn resume_recording(state: &AppState) -> ServerEvent {
    match state.sessions().resume().await {
        Ok(session) => ServerEvent::RecordingUpdate(session),
        Err(_) => ServerEvent::error("No active recording"),
    }
}

/// Opaque view-state passthrough: shallow type check, then echo. The
/// gateway makes no claim about the payload's semantics.
fn update_lidar_view(data: &Value) -> ServerEvent {
    if !data.is_object() {
        return ServerEvent::error("Invalid data format");
    }
    ServerEvent::LidarViewUpdated(data.clone())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::auth::AllowAll;
    use serde_json::json;
    use vigil_core::model::RecordingStatus;

    fn test_state() -> AppState {
        AppState::new(vigil_config::Config::default(), Arc::new(AllowAll))
    }

    fn envelope(event: &str, data: Value) -> ChannelEnvelope {
        ChannelEnvelope::new(event, data)
    }

    #[tokio::test]
    async fn settings_update_acks_to_originator() {
        let state = test_state();
        let reply = handle_command(
            &state,
            envelope(
                inbound::CAMERA_UPDATE_SETTINGS,
                json!({ "cameraId": "camera_1", "settings": { "gain": 80 } }),
            ),
        )
        .await;

        match reply {
            ServerEvent::CameraSettingsUpdated { camera_id, settings } => {
                assert_eq!(camera_id, "camera_1");
                assert_eq!(settings.gain, 80.0);
            }
            other => panic!("expected settings ack, got {other:?}"),
        }

        let stored = state.registry().camera("camera_1").unwrap();
        assert_eq!(stored.settings.gain, 80.0);
    }

    #[tokio::test]
    async fn settings_update_with_unknown_camera_errors() {
        let state = test_state();
        let reply = handle_command(
            &state,
            envelope(
                inbound::CAMERA_UPDATE_SETTINGS,
                json!({ "cameraId": "camera_99", "settings": { "gain": 80 } }),
            ),
        )
        .await;
        assert!(matches!(reply, ServerEvent::Error { message } if message == "Camera not found"));
    }

    #[tokio::test]
    async fn settings_update_validates_before_mutation() {
        let state = test_state();
        let before = state.registry().camera("camera_1").unwrap().settings;

        let reply = handle_command(
            &state,
            envelope(
                inbound::CAMERA_UPDATE_SETTINGS,
                json!({ "cameraId": "camera_1", "settings": { "gain": 50, "foo": 1 } }),
            ),
        )
        .await;
        assert!(
            matches!(reply, ServerEvent::Error { message } if message == "Invalid camera settings")
        );

        // Fail-closed: nothing was applied.
        let after = state.registry().camera("camera_1").unwrap().settings;
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn settings_update_rejects_malformed_camera_id() {
        let state = test_state();
        for data in [
            json!(null),
            json!({ "settings": { "gain": 1 } }),
            json!({ "cameraId": "cam;1", "settings": { "gain": 1 } }),
        ] {
            let reply =
                handle_command(&state, envelope(inbound::CAMERA_UPDATE_SETTINGS, data)).await;
            assert!(matches!(reply, ServerEvent::Error { .. }));
        }
    }

    #[tokio::test]
    async fn recording_start_acks_privately_and_double_start_conflicts() {
        let state = test_state();

        let reply = handle_command(
            &state,
            envelope(inbound::RECORDING_START, json!({ "videoQuality": "low" })),
        )
        .await;
        match reply {
            ServerEvent::RecordingUpdate(session) => {
                assert_eq!(session.status, RecordingStatus::Recording);
            }
            other => panic!("expected recording update, got {other:?}"),
        }

        let reply =
            handle_command(&state, envelope(inbound::RECORDING_START, json!({}))).await;
        assert!(
            matches!(reply, ServerEvent::Error { message } if message == "Recording already in progress")
        );
    }

    #[tokio::test]
    async fn recording_stop_reports_the_finished_session() {
        let state = test_state();
        handle_command(&state, envelope(inbound::RECORDING_START, json!({}))).await;

        let reply = handle_command(
            &state,
            envelope(inbound::RECORDING_STOP, json!({ "sessionId": "whatever" })),
        )
        .await;
        match reply {
            ServerEvent::RecordingUpdate(session) => {
                assert_eq!(session.status, RecordingStatus::Stopped);
                assert!(session.end_time.is_some());
            }
            other => panic!("expected recording update, got {other:?}"),
        }

        let reply = handle_command(&state, envelope(inbound::RECORDING_STOP, json!({}))).await;
        assert!(matches!(reply, ServerEvent::Error { message } if message == "No active recording"));
    }

    #[tokio::test]
    async fn lidar_view_is_echoed_without_interpretation() {
        let state = test_state();
        let view = json!({ "rotation": [0.1, 0.2, 0.3], "zoom": 2.5, "anything": { "goes": true } });

        let reply =
            handle_command(&state, envelope(inbound::LIDAR_UPDATE_VIEW, view.clone())).await;
        assert!(matches!(reply, ServerEvent::LidarViewUpdated(echoed) if echoed == view));

        let reply =
            handle_command(&state, envelope(inbound::LIDAR_UPDATE_VIEW, json!(42))).await;
        assert!(matches!(reply, ServerEvent::Error { message } if message == "Invalid data format"));
    }

    #[tokio::test]
    async fn unknown_events_report_a_machine_readable_error() {
        let state = test_state();
        let reply = handle_command(&state, envelope("camera:reboot", json!({}))).await;
        assert!(matches!(reply, ServerEvent::Error { message } if message == "Unknown event"));
    }
}
