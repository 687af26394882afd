//! Presence descriptor sent with Identify.

use serde::{Deserialize, Serialize};

/// Status used when none is configured.
pub const DEFAULT_STATUS: &str = "online";

/// Presence announced when the session is identified.
///
/// Every field has a default, so a partially specified presence (for example
/// only `status = "idle"` in a config file) still produces a complete payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    /// Unix time in milliseconds since the client went idle, or null.
    #[serde(default)]
    pub since: Option<u64>,
    /// Activity objects, passed through as-is.
    #[serde(default)]
    pub activities: Vec<serde_json::Value>,
    /// One of "online", "dnd", "idle", "invisible", "offline".
    #[serde(default = "default_status")]
    pub status: String,
    #[serde(default)]
    pub afk: bool,
}

impl Default for Presence {
    fn default() -> Self {
        Self {
            since: None,
            activities: vec![],
            status: default_status(),
            afk: false,
        }
    }
}

fn default_status() -> String {
    DEFAULT_STATUS.to_string()
}
