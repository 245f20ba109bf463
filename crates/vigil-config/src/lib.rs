//! Deployment configuration for the vigil control plane.
//!
//! Layered loading: built-in defaults, then an optional TOML file, then
//! `VIGIL_`-prefixed environment variables. Values are validated once at
//! startup into the same struct the server threads through its context
//! object -- nothing reads the environment after boot.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use vigil_core::ratelimit::RateLimitConfig;
use vigil_core::validate::validate_id;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Runtime configuration for the server binary.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Socket address the REST + channel surface binds to.
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,

    /// Origins allowed to reach the control plane. Requests that carry
    /// an `Origin` header outside this list are refused.
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,

    /// Production mode: requests without an `Origin` header (curl, native
    /// apps) are refused; development mode admits them.
    #[serde(default)]
    pub production: bool,

    /// Telemetry broadcast cadence in milliseconds. One global tick for
    /// the whole deployment.
    #[serde(default = "default_broadcast_interval_ms")]
    pub broadcast_interval_ms: u64,

    /// Rate-limit window length in seconds.
    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    /// Requests admitted per client per window.
    #[serde(default = "default_rate_limit_max_requests")]
    pub rate_limit_max_requests: u32,

    /// Installation that owns recordings started over REST and anchors
    /// the status-report fallback.
    #[serde(default = "default_system_id")]
    pub default_system_id: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            allowed_origins: default_allowed_origins(),
            production: false,
            broadcast_interval_ms: default_broadcast_interval_ms(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            rate_limit_max_requests: default_rate_limit_max_requests(),
            default_system_id: default_system_id(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:3001".into()
}
fn default_allowed_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".into(),
        "http://localhost:5173".into(),
    ]
}
fn default_broadcast_interval_ms() -> u64 {
    2000
}
fn default_rate_limit_window_secs() -> u64 {
    15 * 60
}
fn default_rate_limit_max_requests() -> u32 {
    100
}
fn default_system_id() -> String {
    "system_1".into()
}

impl Config {
    /// Load configuration: defaults → optional TOML file → `VIGIL_*` env.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        let config: Self = figment.merge(Env::prefixed("VIGIL_")).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.listen_addr
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Validation {
                field: "listen_addr".into(),
                reason: e.to_string(),
            })?;

        if self.broadcast_interval_ms == 0 {
            return Err(ConfigError::Validation {
                field: "broadcast_interval_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.rate_limit_window_secs == 0 || self.rate_limit_max_requests == 0 {
            return Err(ConfigError::Validation {
                field: "rate_limit".into(),
                reason: "window and budget must be greater than zero".into(),
            });
        }
        if !validate_id(&self.default_system_id) {
            return Err(ConfigError::Validation {
                field: "default_system_id".into(),
                reason: "must match the fleet id format".into(),
            });
        }
        Ok(())
    }

    // ── Derived views ────────────────────────────────────────────────

    pub fn listen_addr(&self) -> SocketAddr {
        // Checked in validate(); unreachable fallback keeps this total.
        self.listen_addr
            .parse()
            .unwrap_or_else(|_| SocketAddr::from(([127, 0, 0, 1], 3001)))
    }

    pub fn broadcast_interval(&self) -> Duration {
        Duration::from_millis(self.broadcast_interval_ms)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig {
            window: Duration::from_secs(self.rate_limit_window_secs),
            max_requests: self.rate_limit_max_requests,
        }
    }

    /// Origin gate for the REST/WS surface. A missing `Origin` header is
    /// admitted only outside production; a present one must be listed.
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        match origin {
            None => !self.production,
            Some(origin) => self.allowed_origins.iter().any(|allowed| allowed == origin),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.listen_addr().port(), 3001);
        assert_eq!(config.broadcast_interval(), Duration::from_secs(2));
        assert_eq!(config.rate_limit().max_requests, 100);
        assert_eq!(config.rate_limit().window, Duration::from_secs(900));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            r#"
listen_addr = "0.0.0.0:4500"
production = true
broadcast_interval_ms = 500
allowed_origins = ["https://ops.example.com"]
"#
        )
        .unwrap();

        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.listen_addr().port(), 4500);
        assert!(config.production);
        assert_eq!(config.broadcast_interval(), Duration::from_millis(500));
        assert_eq!(config.allowed_origins, vec!["https://ops.example.com"]);
    }

    #[test]
    fn invalid_listen_addr_is_rejected() {
        let config = Config {
            listen_addr: "not-an-addr".into(),
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { .. })
        ));
    }

    #[test]
    fn zero_intervals_are_rejected() {
        let config = Config {
            broadcast_interval_ms: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            rate_limit_max_requests: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn default_system_id_must_match_id_format() {
        let config = Config {
            default_system_id: "system;1".into(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn origin_gate_follows_mode() {
        let dev = Config::default();
        assert!(dev.origin_allowed(None));
        assert!(dev.origin_allowed(Some("http://localhost:3000")));
        assert!(!dev.origin_allowed(Some("https://evil.example.com")));

        let prod = Config {
            production: true,
            allowed_origins: vec!["https://ops.example.com".into()],
            ..Config::default()
        };
        assert!(!prod.origin_allowed(None));
        assert!(prod.origin_allowed(Some("https://ops.example.com")));
        assert!(!prod.origin_allowed(Some("http://localhost:3000")));
    }
}
