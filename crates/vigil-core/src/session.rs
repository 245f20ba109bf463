//! Recording-session state machine.
//!
//! Owns the single current-session slot per installation plus a bounded
//! history of finished sessions. Transitions:
//!
//! Idle → Recording (start) → Paused ⇄ Recording (pause/resume)
//!      → Stopped, slot retired back to Idle (stop)
//!
//! At most one live (non-stopped) session exists at any time. Stopped
//! sessions leave the slot immediately; the history list exists only to
//! back the sessions listing -- durable storage is someone else's job.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::CoreError;
use crate::model::{RecordingSession, RecordingStatus};
use crate::protocol::RecordingRequest;

/// Finished sessions retained for the listing endpoint, newest first.
pub const SESSION_HISTORY_LIMIT: usize = 32;

#[derive(Debug, Default)]
struct SessionState {
    current: Option<RecordingSession>,
    history: VecDeque<RecordingSession>,
}

/// Tracker for the per-installation recording lifecycle.
///
/// All transitions run under one async mutex, so every guard check and
/// its mutation are atomic with respect to concurrent commands.
#[derive(Debug, Default)]
pub struct SessionTracker {
    inner: Mutex<SessionState>,
}

impl SessionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new session. Legal only from Idle.
    pub async fn start(
        &self,
        system_id: &str,
        request: RecordingRequest,
    ) -> Result<RecordingSession, CoreError> {
        let mut state = self.inner.lock().await;
        if state.current.is_some() {
            return Err(CoreError::conflict("Recording already in progress"));
        }

        let now = Utc::now();
        let session = RecordingSession {
            id: format!("session_{}", Uuid::new_v4().simple()),
            system_id: system_id.to_owned(),
            start_time: now,
            end_time: None,
            duration_ms: 0,
            status: RecordingStatus::Recording,
            config: request.into_config(),
        };

        tracing::info!(session = %session.id, system = system_id, "recording started");
        state.current = Some(session.clone());
        Ok(session)
    }

    /// Stop the live session: record the end time, mark it stopped, and
    /// retire the slot back to Idle. Returns the finished session.
    pub async fn stop(&self) -> Result<RecordingSession, CoreError> {
        let mut state = self.inner.lock().await;
        let Some(mut session) = state.current.take() else {
            return Err(CoreError::conflict("No active recording"));
        };

        let now = Utc::now();
        session.status = RecordingStatus::Stopped;
        session.end_time = Some(now);
        session.duration_ms = session.duration_at(now);

        tracing::info!(
            session = %session.id,
            duration_ms = session.duration_ms,
            "recording stopped"
        );

        state.history.push_front(session.clone());
        state.history.truncate(SESSION_HISTORY_LIMIT);
        Ok(session)
    }

    /// Pause the live session in place. No guard beyond existence.
    pub async fn pause(&self) -> Result<RecordingSession, CoreError> {
        self.set_status(RecordingStatus::Paused).await
    }

    /// Resume a paused session in place. No guard beyond existence.
    pub async fn resume(&self) -> Result<RecordingSession, CoreError> {
        self.set_status(RecordingStatus::Recording).await
    }

    async fn set_status(&self, status: RecordingStatus) -> Result<RecordingSession, CoreError> {
        let mut state = self.inner.lock().await;
        let Some(session) = state.current.as_mut() else {
            return Err(CoreError::conflict("No active recording"));
        };
        session.status = status;
        session.duration_ms = session.duration_at(Utc::now());
        tracing::debug!(session = %session.id, status = %status, "recording status changed");
        Ok(session.clone())
    }

    /// Whether a session currently occupies the slot.
    pub async fn is_active(&self) -> bool {
        self.inner.lock().await.current.is_some()
    }

    /// Recompute the live session's duration at `now` and return it.
    ///
    /// This is the broadcaster's per-tick refresh: duration is always
    /// derived from the wall clock, never accumulated.
    pub async fn refresh_at(&self, now: DateTime<Utc>) -> Option<RecordingSession> {
        let mut state = self.inner.lock().await;
        let session = state.current.as_mut()?;
        session.duration_ms = session.duration_at(now);
        Some(session.clone())
    }

    /// Snapshot of the current session, if any, with a fresh duration.
    pub async fn current(&self) -> Option<RecordingSession> {
        self.refresh_at(Utc::now()).await
    }

    /// Finished sessions, newest first.
    pub async fn history(&self) -> Vec<RecordingSession> {
        self.inner.lock().await.history.iter().cloned().collect()
    }
}
