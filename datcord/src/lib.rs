//! Datcord - gateway connection manager and REST client.
//!
//! [`Gateway`] owns one persistent socket and drives the Hello, heartbeat and
//! Identify handshake; [`RestClient`] issues authenticated one-shot API calls.

pub mod config;
pub mod error;
pub mod gateway;
pub mod rest;

pub use config::{ApiConfig, ClientConfig};
pub use error::{Error, Result};
pub use gateway::{ConnectionState, Gateway, GatewayEvent, Subscription, DEFAULT_CLOSE_CODE};
pub use rest::{ResponseBody, RestClient};

pub use datcord_common::{Envelope, OpCode, Presence};
