// ── Core error taxonomy ──
//
// Every failure a caller can observe from the control plane. These are
// NOT transport-specific -- the server maps them onto HTTP statuses and
// channel `error` events, and the mapping never leaks internal detail.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Input errors ─────────────────────────────────────────────────
    /// Malformed or out-of-range input. Reported to the caller, never
    /// retried, never fatal.
    #[error("{message}")]
    Validation { message: String },

    // ── State-machine errors ─────────────────────────────────────────
    /// A state-machine guard rejected the transition (e.g. double-start).
    #[error("{message}")]
    Conflict { message: String },

    /// Unknown entity identifier.
    #[error("{entity} not found")]
    NotFound { entity: String },

    // ── Admission errors ─────────────────────────────────────────────
    /// Fixed-window budget exhausted; caller is responsible for backoff.
    #[error("too many requests, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    // ── Transport errors ─────────────────────────────────────────────
    /// Connection-level failure. Recovered by reconnection policy,
    /// surfaced only as a lifecycle event.
    #[error("transport error: {message}")]
    Transport { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
        }
    }

    /// HTTP status the server surface should report for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Conflict { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::RateLimited { .. } => 429,
            Self::Transport { .. } | Self::Config { .. } | Self::Internal(_) => 500,
        }
    }

    /// Short, machine-readable message safe to hand to untrusted callers.
    ///
    /// Internal variants collapse to a generic message -- raw detail stays
    /// in the logs.
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation { message } | Self::Conflict { message } => message.clone(),
            Self::NotFound { entity } => format!("{entity} not found"),
            Self::RateLimited { .. } => "Too many requests, please try again later".into(),
            Self::Transport { .. } | Self::Config { .. } | Self::Internal(_) => {
                "Internal server error".into()
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(CoreError::validation("bad").status_code(), 400);
        assert_eq!(CoreError::conflict("busy").status_code(), 400);
        assert_eq!(CoreError::not_found("Camera").status_code(), 404);
        assert_eq!(
            CoreError::RateLimited {
                retry_after_secs: 30
            }
            .status_code(),
            429
        );
    }

    #[test]
    fn internal_detail_never_leaks() {
        let err = CoreError::Internal("dashmap shard poisoned at registry.rs:42".into());
        assert_eq!(err.public_message(), "Internal server error");
    }
}
