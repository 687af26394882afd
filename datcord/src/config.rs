//! Configuration for the gateway and REST clients.

use config::{Config as ConfigLoader, ConfigError, Environment, File, FileFormat, Source};
use datcord_common::{Presence, DEFAULT_INTENTS};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Client configuration, resolved once when a client is created.
///
/// Any field left out of a config file or environment falls back to its
/// default, so a partial configuration never leaves a field undefined.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub api: ApiConfig,
    /// REST path that returns the gateway socket URL.
    #[serde(default = "default_gateway_query")]
    pub gateway_query: String,
    /// Presence announced in Identify.
    #[serde(default)]
    pub default_presence: Presence,
    /// Bitmask of event categories the gateway should deliver.
    #[serde(default = "default_intents")]
    pub intents: u64,
    /// Reserved for caching collaborators; the gateway itself ignores it.
    #[serde(default = "default_true")]
    pub cache: bool,
    /// Emit `gateway.open` on the READY dispatch instead of right after
    /// Identify is sent.
    #[serde(default)]
    pub open_on_ready: bool,
    /// How long to wait for the server to answer our close frame before
    /// dropping the socket.
    #[serde(default = "default_close_timeout_ms")]
    pub close_timeout_ms: u64,
}

/// REST API endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_base_path")]
    pub base_path: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            gateway_query: default_gateway_query(),
            default_presence: Presence::default(),
            intents: default_intents(),
            cache: default_true(),
            open_on_ready: false,
            close_timeout_ms: default_close_timeout_ms(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            host: default_api_host(),
            base_path: default_base_path(),
            port: default_api_port(),
        }
    }
}

impl ApiConfig {
    /// `{scheme}://{host}:{port}{base_path}`, without a trailing slash.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}{}",
            self.scheme,
            self.host,
            self.port,
            self.base_path.trim_end_matches('/')
        )
    }
}

// Default values
fn default_scheme() -> String {
    "https".to_string()
}
fn default_api_host() -> String {
    "discord.com".to_string()
}
fn default_base_path() -> String {
    "/api/v9".to_string()
}
fn default_api_port() -> u16 {
    443
}
fn default_gateway_query() -> String {
    "/gateway".to_string()
}
fn default_intents() -> u64 {
    DEFAULT_INTENTS
}
fn default_true() -> bool {
    true
}
fn default_close_timeout_ms() -> u64 {
    30_000
}

impl ClientConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration sources (in order of precedence):
    /// 1. Environment variables (DATCORD__SECTION__KEY format)
    /// 2. datcord.toml file (if present)
    /// 3. Built-in defaults
    pub fn load() -> Result<Self, ConfigError> {
        load_layered(File::with_name("datcord").required(false))
    }

    /// Parse configuration from a TOML string, still applying environment
    /// overrides and defaults.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        load_layered(File::from_str(toml, FileFormat::Toml))
    }
}

/// Deserialize any config type from `file` with `DATCORD__` environment
/// variables layered on top. Missing fields fall back to their serde
/// defaults.
pub fn load_layered<T, S>(file: S) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
    S: Source + Send + Sync + 'static,
{
    let config = ConfigLoader::builder()
        .add_source(file)
        .add_source(
            Environment::with_prefix("DATCORD")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    config.try_deserialize()
}
