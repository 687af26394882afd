//! Gateway operation codes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation code tagging the purpose of a gateway frame.
///
/// Kept as a transparent integer rather than a closed enum so that frames
/// carrying opcodes this client does not know about still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OpCode(pub u8);

impl OpCode {
    /// Named application event (`t`) with its payload (`d`).
    pub const DISPATCH: OpCode = OpCode(0);
    /// Liveness beat. Sent by the client, or requested by the server.
    pub const HEARTBEAT: OpCode = OpCode(1);
    /// Session start with token, properties, presence and intents.
    pub const IDENTIFY: OpCode = OpCode(2);
    pub const PRESENCE_UPDATE: OpCode = OpCode(3);
    pub const VOICE_STATE_UPDATE: OpCode = OpCode(4);
    pub const RESUME: OpCode = OpCode(6);
    /// Server asks the client to reconnect.
    pub const RECONNECT: OpCode = OpCode(7);
    pub const REQUEST_GUILD_MEMBERS: OpCode = OpCode(8);
    /// Server rejected the session.
    pub const INVALID_SESSION: OpCode = OpCode(9);
    /// First frame after connecting; carries `heartbeat_interval`.
    pub const HELLO: OpCode = OpCode(10);
    /// Server acknowledged a heartbeat.
    pub const HEARTBEAT_ACK: OpCode = OpCode(11);

    /// Human-readable name for known opcodes.
    pub fn name(self) -> Option<&'static str> {
        match self.0 {
            0 => Some("Dispatch"),
            1 => Some("Heartbeat"),
            2 => Some("Identify"),
            3 => Some("Presence Update"),
            4 => Some("Voice State Update"),
            6 => Some("Resume"),
            7 => Some("Reconnect"),
            8 => Some("Request Guild Members"),
            9 => Some("Invalid Session"),
            10 => Some("Hello"),
            11 => Some("Heartbeat ACK"),
            _ => None,
        }
    }
}

impl From<u8> for OpCode {
    fn from(value: u8) -> Self {
        OpCode(value)
    }
}

impl From<OpCode> for u8 {
    fn from(value: OpCode) -> Self {
        value.0
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({})", self.0, name),
            None => write!(f, "{}", self.0),
        }
    }
}
