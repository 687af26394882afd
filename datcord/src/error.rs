//! Error types for the datcord clients.

/// Errors surfaced by the REST client and the gateway connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Gateway discovery failed: {0}")]
    Discovery(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Not connected to the gateway")]
    NotConnected,

    #[error("Gateway connection already started")]
    AlreadyConnected,

    #[error("Gateway connection closed")]
    ConnectionClosed,

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
