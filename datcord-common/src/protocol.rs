//! Gateway frame types.
//!
//! Every frame in both directions is a JSON text message with the same four
//! fields: `op` (opcode), `d` (payload), `s` (sequence number) and `t` (event
//! name). Only `op` is guaranteed; `s` and `t` are set by the server on
//! dispatch frames and are always null in frames the client sends.
//!
//! ## Connection Flow
//!
//! 1. Client discovers the socket URL over REST and connects with
//!    `?v=9&encoding=json`
//! 2. Server sends `Hello` (op 10) with `heartbeat_interval` in milliseconds
//! 3. Client sends a `Heartbeat` (op 1) right away and then once per interval
//! 4. Client sends `Identify` (op 2)
//! 5. Server answers each heartbeat with `Heartbeat ACK` (op 11) and delivers
//!    events as `Dispatch` (op 0) frames, starting with `READY`

use serde::{Deserialize, Serialize};

use crate::{OpCode, Presence};

/// Gateway protocol version appended to the discovered URL.
pub const GATEWAY_VERSION: u8 = 9;

/// Payload encoding requested from the gateway.
pub const GATEWAY_ENCODING: &str = "json";

/// Intents requested when none are configured.
pub const DEFAULT_INTENTS: u64 = 32641;

/// A single gateway frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "op")]
    pub opcode: OpCode,
    /// Opcode-dependent payload. Null when the frame has none.
    #[serde(rename = "d", default)]
    pub data: serde_json::Value,
    #[serde(rename = "s", default)]
    pub sequence: Option<u64>,
    /// Event name, only present on dispatch frames.
    #[serde(rename = "t", default)]
    pub event: Option<String>,
}

impl Envelope {
    /// Build a client-originated frame. Sequence and event name stay null;
    /// only the server assigns them.
    pub fn outbound(opcode: OpCode, data: serde_json::Value) -> Self {
        Self {
            opcode,
            data,
            sequence: None,
            event: None,
        }
    }

    pub fn is_dispatch(&self) -> bool {
        self.opcode == OpCode::DISPATCH
    }
}

/// Payload of the `Hello` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hello {
    /// Heartbeat period in milliseconds.
    pub heartbeat_interval: u64,
}

/// Payload of the `Identify` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identify {
    pub token: String,
    pub properties: ConnectionProperties,
    pub presence: Presence,
    pub intents: u64,
}

/// Static description of the connecting client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionProperties {
    pub os: String,
    pub browser: String,
    pub device: String,
}

impl Default for ConnectionProperties {
    fn default() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            browser: "datcord".to_string(),
            device: "datcord".to_string(),
        }
    }
}

impl Identify {
    pub fn new(token: String, presence: Presence, intents: u64) -> Self {
        Self {
            token,
            properties: ConnectionProperties::default(),
            presence,
            intents,
        }
    }
}
