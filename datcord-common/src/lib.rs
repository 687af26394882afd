//! Datcord Common Types
//!
//! Wire types shared by the gateway client and anything else that speaks the
//! gateway protocol.

pub mod opcode;
pub mod presence;
pub mod protocol;

pub use opcode::OpCode;
pub use presence::{Presence, DEFAULT_STATUS};
pub use protocol::{
    ConnectionProperties, Envelope, Hello, Identify, DEFAULT_INTENTS, GATEWAY_ENCODING,
    GATEWAY_VERSION,
};
