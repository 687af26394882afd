//! Gateway WebSocket connection.
//!
//! This module handles the persistent socket to the gateway: endpoint
//! discovery, the Hello/Identify handshake, heartbeats and liveness,
//! frame routing to one-shot waiters and the event bus.

mod client;
mod connection;
pub mod events;
mod heartbeat;
mod waiters;

pub use client::Gateway;
pub use connection::{ConnectionState, DEFAULT_CLOSE_CODE, READY_EVENT};
pub use events::{EventBus, GatewayEvent, Subscription};
