//! Control-plane server for the vigil fleet monitor.
//!
//! Three cooperating pieces share one [`state::AppState`] context object:
//!
//! - **[`routes`]** — the rate-limited REST surface
//!   (`{success, data?, error?}` envelopes).
//! - **[`gateway`]** — the persistent channel: WebSocket connections,
//!   admission check, inbound command demux, private acknowledgments.
//! - **[`broadcaster`]** — the fixed-interval telemetry tick fanning full
//!   state snapshots out to every connected observer.
//!
//! Library and binary are split so the integration suite can drive a real
//! server on an ephemeral port.

pub mod auth;
pub mod broadcaster;
pub mod gateway;
pub mod routes;
pub mod state;
