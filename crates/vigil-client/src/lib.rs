//! Consumer-side channel manager for the vigil control plane.
//!
//! Maintains one logical connection to the server's persistent channel
//! with automatic reconnection and backoff, multiplexes named event
//! subscriptions, and emits synthetic lifecycle events so downstream
//! state containers can distinguish "the channel works" from "this
//! logical session is fresh" after a reconnect.

pub mod channel;

pub use channel::{
    ChannelError, ChannelManager, ConnectionState, ReconnectConfig, lifecycle,
};
