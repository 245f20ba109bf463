//! Reconnecting channel manager.
//!
//! One logical connection: connect → read → on error, backoff →
//! reconnect, up to a bounded attempt count, then a terminal
//! connection-failed state. Subscriptions are registered against the
//! manager, not the socket, so subscribing before any connection exists
//! is natural and replay across reconnects is idempotent by
//! construction -- a server emission is dispatched to each subscriber
//! exactly once regardless of how many reconnects preceded it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use thiserror::Error;
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_util::sync::CancellationToken;
use url::Url;

use vigil_core::protocol::{ChannelEnvelope, RecordingRequest, SettingsPatch, inbound};

// ── Constants ────────────────────────────────────────────────────────

const TOPIC_CHANNEL_CAPACITY: usize = 64;
const OUTBOUND_QUEUE_CAPACITY: usize = 32;

/// Synthetic events emitted by the manager itself, alongside
/// server-originated events.
pub mod lifecycle {
    /// A (re)connection was established; state containers should resync.
    pub const CONNECTED: &str = "connected";
    /// The current connection dropped; reconnection may follow.
    pub const DISCONNECTED: &str = "disconnected";
    /// A connection attempt failed; reconnection may follow.
    pub const ERROR: &str = "error";
    /// Terminal: the attempt budget is exhausted and the loop gave up.
    pub const CONNECTION_FAILED: &str = "connectionFailed";
}

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel is not connected")]
    NotConnected,

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

// ── Configuration ────────────────────────────────────────────────────

/// Backoff policy for reconnection.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Floor delay before the first retry. Default: 1s.
    pub initial_delay: Duration,

    /// Ceiling on the backoff delay. Default: 5s.
    pub max_delay: Duration,

    /// Attempts before giving up with a terminal failure.
    /// `None` retries forever. Default: 5.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            max_attempts: Some(5),
        }
    }
}

// ── Connection state ─────────────────────────────────────────────────

/// Observable state of the logical connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Terminal: the reconnect budget is exhausted.
    Failed,
}

// ── Manager ──────────────────────────────────────────────────────────

/// Handle to the channel manager. Cheaply cloneable.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    url: Url,
    reconnect: ReconnectConfig,
    /// Per-event broadcast senders; created on first subscription and
    /// independent of any socket, so pre-connect registration works.
    topics: DashMap<String, broadcast::Sender<Arc<Value>>>,
    state_tx: watch::Sender<ConnectionState>,
    /// Writer handle for the live connection, if any.
    outbound: Mutex<Option<mpsc::Sender<Message>>>,
    /// Running loop: cancel handle + join handle.
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl ChannelManager {
    /// Create a manager for `url`. Does NOT connect -- subscriptions may
    /// be registered first, then [`connect()`](Self::connect) starts the
    /// connection loop.
    pub fn new(url: Url) -> Self {
        Self::with_config(url, ReconnectConfig::default())
    }

    pub fn with_config(url: Url, reconnect: ReconnectConfig) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            inner: Arc::new(ManagerInner {
                url,
                reconnect,
                topics: DashMap::new(),
                state_tx,
                outbound: Mutex::new(None),
                task: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to a named event: server-originated or one of the
    /// [`lifecycle`] names. Valid at any time, including before the
    /// first connection; delivery starts with the next emission.
    pub fn subscribe(&self, event: &str) -> broadcast::Receiver<Arc<Value>> {
        self.inner
            .topics
            .entry(event.to_owned())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Observe connection-state transitions.
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        *self.inner.state_tx.borrow() == ConnectionState::Connected
    }

    /// Start the connection loop. A second call while the loop is
    /// running is a no-op -- there is exactly one logical connection.
    pub async fn connect(&self) {
        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            tracing::debug!("channel already running, ignoring connect");
            return;
        }
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_loop(Arc::clone(&self.inner), cancel.clone()));
        *task = Some((cancel, handle));
    }

    /// Stop the connection loop: cancels any in-flight reconnection
    /// backoff and pending replay, closes the connection, and settles
    /// the state at [`ConnectionState::Disconnected`].
    pub async fn disconnect(&self) {
        let Some((cancel, handle)) = self.inner.task.lock().await.take() else {
            return;
        };
        cancel.cancel();
        let _ = handle.await;
        *self.inner.outbound.lock().await = None;
        let _ = self.inner.state_tx.send(ConnectionState::Disconnected);
        tracing::debug!("channel manager stopped");
    }

    /// Send a named event to the server. Fails fast while disconnected;
    /// the caller decides whether to queue or drop.
    pub async fn emit(&self, event: &str, data: Value) -> Result<(), ChannelError> {
        let frame = serde_json::to_string(&ChannelEnvelope::new(event, data))?;
        let outbound = self.inner.outbound.lock().await;
        let Some(tx) = outbound.as_ref() else {
            tracing::warn!(event, "channel not connected, command dropped");
            return Err(ChannelError::NotConnected);
        };
        tx.send(Message::Text(frame.into()))
            .await
            .map_err(|_| ChannelError::NotConnected)
    }

    // ── Typed command helpers ────────────────────────────────────────

    pub async fn update_camera_settings(
        &self,
        camera_id: &str,
        settings: &SettingsPatch,
    ) -> Result<(), ChannelError> {
        self.emit(
            inbound::CAMERA_UPDATE_SETTINGS,
            json!({ "cameraId": camera_id, "settings": settings }),
        )
        .await
    }

    pub async fn start_recording(&self, request: &RecordingRequest) -> Result<(), ChannelError> {
        self.emit(inbound::RECORDING_START, serde_json::to_value(request)?)
            .await
    }

    pub async fn stop_recording(&self, session_id: &str) -> Result<(), ChannelError> {
        self.emit(inbound::RECORDING_STOP, json!({ "sessionId": session_id }))
            .await
    }

    pub async fn pause_recording(&self) -> Result<(), ChannelError> {
        self.emit(inbound::RECORDING_PAUSE, json!({})).await
    }

    pub async fn resume_recording(&self) -> Result<(), ChannelError> {
        self.emit(inbound::RECORDING_RESUME, json!({})).await
    }

    pub async fn update_lidar_view(&self, view: Value) -> Result<(), ChannelError> {
        self.emit(inbound::LIDAR_UPDATE_VIEW, view).await
    }
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// Deliver one event to its topic's subscribers, if any.
fn dispatch(topics: &DashMap<String, broadcast::Sender<Arc<Value>>>, event: &str, data: Value) {
    if let Some(topic) = topics.get(event) {
        // Send errors just mean nobody is listening right now.
        let _ = topic.send(Arc::new(data));
    }
}

fn parse_and_dispatch(topics: &DashMap<String, broadcast::Sender<Arc<Value>>>, text: &str) {
    let envelope: ChannelEnvelope = match serde_json::from_str(text) {
        Ok(envelope) => envelope,
        Err(err) => {
            tracing::debug!(error = %err, "unparseable channel frame");
            return;
        }
    };
    dispatch(topics, &envelope.event, envelope.data);
}

// ── Background reconnection loop ─────────────────────────────────────

/// Main loop: connect → read → on error, backoff → reconnect.
async fn run_loop(inner: Arc<ManagerInner>, cancel: CancellationToken) {
    let mut attempt: u32 = 0;

    loop {
        let _ = inner.state_tx.send(if attempt == 0 {
            ConnectionState::Connecting
        } else {
            ConnectionState::Reconnecting { attempt }
        });

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            result = connect_and_read(&inner, &cancel) => match result {
                // Clean disconnect: reset the counter and reconnect
                // immediately.
                Ok(()) => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    tracing::info!("channel disconnected cleanly, reconnecting");
                    attempt = 0;
                }
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "channel error");
                    dispatch(&inner.topics, lifecycle::ERROR, json!({ "error": err.to_string() }));

                    if let Some(max) = inner.reconnect.max_attempts {
                        if attempt >= max {
                            tracing::error!(attempts = attempt, "reconnection limit reached, giving up");
                            let _ = inner.state_tx.send(ConnectionState::Failed);
                            dispatch(
                                &inner.topics,
                                lifecycle::CONNECTION_FAILED,
                                json!({ "attempts": attempt }),
                            );
                            break;
                        }
                    }

                    let delay = backoff_delay(attempt, &inner.reconnect);
                    tracing::info!(delay_ms = delay.as_millis() as u64, attempt, "waiting before reconnect");
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }

    *inner.outbound.lock().await = None;
    tracing::debug!("channel loop exiting");
}

/// Establish one connection and pump it until it drops.
async fn connect_and_read(
    inner: &ManagerInner,
    cancel: &CancellationToken,
) -> Result<(), ChannelError> {
    tracing::info!(url = %inner.url, "connecting to channel");

    let (stream, _response) = tokio_tungstenite::connect_async(inner.url.as_str())
        .await
        .map_err(transport_error)?;
    let (mut sink, mut read) = stream.split();

    let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_QUEUE_CAPACITY);
    *inner.outbound.lock().await = Some(tx);
    let _ = inner.state_tx.send(ConnectionState::Connected);
    dispatch(&inner.topics, lifecycle::CONNECTED, json!({}));
    tracing::info!("channel connected");

    let result = loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break Ok(()),
            outgoing = rx.recv() => match outgoing {
                Some(message) => {
                    if let Err(err) = sink.send(message).await {
                        break Err(transport_error(err));
                    }
                }
                None => break Ok(()),
            },
            frame = read.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    parse_and_dispatch(&inner.topics, text.as_str());
                }
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(ref close) => tracing::info!(
                            code = %close.code,
                            reason = %close.reason,
                            "channel close frame received"
                        ),
                        None => tracing::info!("channel close frame received"),
                    }
                    break Ok(());
                }
                Some(Ok(_)) => {
                    // Ping/pong handled by the transport; binary ignored.
                }
                Some(Err(err)) => break Err(transport_error(err)),
                None => {
                    tracing::info!("channel stream ended");
                    break Ok(());
                }
            },
        }
    };

    *inner.outbound.lock().await = None;
    let reason = match &result {
        Ok(()) => "closed".to_owned(),
        Err(err) => err.to_string(),
    };
    dispatch(&inner.topics, lifecycle::DISCONNECTED, json!({ "reason": reason }));
    result
}

fn transport_error(err: tungstenite::Error) -> ChannelError {
    // Local surface only needs "not connected" semantics; detail goes to
    // the error lifecycle event and the logs.
    tracing::debug!(error = %err, "channel transport error");
    ChannelError::NotConnected
}

// ── Backoff calculation ──────────────────────────────────────────────

/// Exponential backoff between the floor and ceiling delays.
///
/// `delay = min(initial * 2^(attempt-1), max) * jitter`, with a
/// deterministic ±25% jitter seeded from the attempt number to spread
/// reconnection storms across clients.
fn backoff_delay(attempt: u32, config: &ReconnectConfig) -> Duration {
    let exponent = attempt.saturating_sub(1).min(16);
    let base = config.initial_delay.as_secs_f64() * 2.0_f64.powi(exponent as i32);
    let capped = base.min(config.max_delay.as_secs_f64());

    let jitter = 1.0 + 0.25 * (f64::from(attempt) * 5.7).sin();
    Duration::from_secs_f64((capped * jitter).max(0.0))
}

// ── Tests ────────────────────────────────────────────────────────────
