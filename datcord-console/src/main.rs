//! Datcord console client - read one channel and post stdin lines to it.

use std::env;
use std::io::Write;

use config::{ConfigError, File};
use datcord::{ClientConfig, Gateway, GatewayEvent, RestClient};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const PROMPT: &str = "You : ";

#[derive(Debug, Clone, Deserialize)]
struct Config {
    /// Bot or bearer token, sent verbatim as the Authorization header.
    token: String,
    channel_id: String,
    #[serde(default)]
    client: ClientConfig,
}

impl Config {
    /// Load configuration from console.toml and DATCORD__KEY environment
    /// variables (environment wins).
    fn load() -> Result<Self, ConfigError> {
        datcord::config::load_layered(File::with_name("console").required(false))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle --version / -V
    let args: Vec<String> = env::args().collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("datcord-console {}", VERSION);
        return Ok(());
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = Config::load().map_err(|e| {
        format!(
            "Failed to load configuration: {}. \
             Make sure console.toml exists or set DATCORD__TOKEN and DATCORD__CHANNEL_ID environment variables.",
            e
        )
    })?;

    let mut gateway = Gateway::new(config.token.clone(), config.client.clone());
    let mut events = gateway.subscribe_all();
    gateway.connect().await?;

    let mut input_started = false;
    while let Some(event) = events.recv().await {
        match event {
            GatewayEvent::GatewayOpen => {
                println!("Connected to the gateway.");
                if !input_started {
                    input_started = true;
                    tokio::spawn(forward_input(
                        gateway.rest().clone(),
                        config.channel_id.clone(),
                    ));
                }
                prompt();
            }
            GatewayEvent::GatewayClose { code, reason } => {
                println!("Gateway closed: {} - {}", code, reason);
            }
            GatewayEvent::GatewayError { error } => {
                println!("Gateway error: {}", error);
            }
            GatewayEvent::Dispatch { name, payload } if name == "MESSAGE_CREATE" => {
                if let Some(line) = format_message(&payload, &config.channel_id) {
                    // Clear the pending prompt before printing
                    println!("\r\x1b[2K{}", line);
                    prompt();
                }
            }
            GatewayEvent::SocketClose { .. } | GatewayEvent::SocketError { .. } => break,
            _ => {}
        }
    }

    gateway.closed().await;
    Ok(())
}

/// Post every stdin line to the channel.
async fn forward_input(rest: RestClient, channel_id: String) {
    let path = format!("/channels/{}/messages", channel_id);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if let Err(e) = rest.post(&path, &json!({ "content": line })).await {
                    tracing::error!("Failed to send message: {}", e);
                }
                prompt();
            }
            Ok(None) => break,
            Err(e) => {
                tracing::error!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}

/// `"{username} : {content}"` for human messages in `channel_id`.
fn format_message(message: &Value, channel_id: &str) -> Option<String> {
    if message.get("channel_id").and_then(Value::as_str) != Some(channel_id) {
        return None;
    }
    if message.get("webhook_id").is_some_and(|id| !id.is_null()) {
        return None;
    }
    let author = message.get("author")?;
    if author.get("bot").and_then(Value::as_bool).unwrap_or(false) {
        return None;
    }

    let username = author.get("username").and_then(Value::as_str)?;
    let content = message.get("content").and_then(Value::as_str).unwrap_or("");
    Some(format!("{} : {}", username, content))
}

fn prompt() {
    print!("{}", PROMPT);
    let _ = std::io::stdout().flush();
}
