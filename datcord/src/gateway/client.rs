//! Public handle to a gateway connection.

use std::future::Future;
use std::sync::Arc;

use datcord_common::{Envelope, OpCode, GATEWAY_ENCODING, GATEWAY_VERSION};
use futures_util::StreamExt;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::rest::RestClient;

use super::connection::{Command, Connection, ConnectionState, WsStream, DEFAULT_CLOSE_CODE};
use super::events::{EventBus, Subscription};

/// Gateway client.
///
/// Create it with [`Gateway::new`], subscribe to the channels you care about,
/// then call [`Gateway::connect`]. The socket itself is owned by a background
/// task; this handle talks to it over a channel.
pub struct Gateway {
    token: String,
    config: ClientConfig,
    rest: RestClient,
    events: Arc<EventBus>,
    state: watch::Receiver<ConnectionState>,
    state_tx: Option<watch::Sender<ConnectionState>>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    task: Option<JoinHandle<()>>,
}

impl Gateway {
    pub fn new(token: impl Into<String>, config: ClientConfig) -> Self {
        let token = token.into();
        let rest = RestClient::new(token.clone(), &config.api);
        let (state_tx, state) = watch::channel(ConnectionState::Idle);

        Self {
            token,
            config,
            rest,
            events: Arc::new(EventBus::new()),
            state,
            state_tx: Some(state_tx),
            commands: None,
            task: None,
        }
    }

    /// REST client sharing this gateway's token and API endpoint.
    pub fn rest(&self) -> &RestClient {
        &self.rest
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Subscribe to one event channel, e.g. `gateway.open` or
    /// `gateway.event.MESSAGE_CREATE`.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        self.events.subscribe(channel)
    }

    pub fn subscribe_all(&self) -> Subscription {
        self.events.subscribe_all()
    }

    /// Discover the socket URL, open the socket and start the connection
    /// task. Returns once the socket is open; the handshake continues in the
    /// background and completes with `gateway.open`.
    pub async fn connect(&mut self) -> Result<()> {
        let state = self.state_tx.take().ok_or(Error::AlreadyConnected)?;
        state.send_replace(ConnectionState::Connecting);

        let ws_stream = match self.open_socket().await {
            Ok(ws_stream) => ws_stream,
            Err(e) => {
                tracing::error!("Failed to connect to gateway: {}", e);
                state.send_replace(ConnectionState::Errored);
                return Err(e);
            }
        };
        let (write, read) = ws_stream.split();

        let (tx, rx) = mpsc::unbounded_channel();
        let connection = Connection::new(
            self.token.clone(),
            self.config.clone(),
            write,
            self.events.clone(),
            state,
        );
        self.task = Some(tokio::spawn(connection.run(read, rx)));
        self.commands = Some(tx);
        Ok(())
    }

    async fn open_socket(&self) -> Result<WsStream> {
        let url = discover_gateway_url(&self.rest, &self.config.gateway_query).await?;
        tracing::info!("Connecting to gateway at {}", url);
        let (ws_stream, _) = connect_async(url.as_str()).await?;
        Ok(ws_stream)
    }

    /// Send a frame `{op, d, s: null, t: null}`.
    pub async fn send(&self, opcode: OpCode, data: serde_json::Value) -> Result<()> {
        let (reply, result) = oneshot::channel();
        self.command(Command::Send {
            opcode,
            data,
            reply,
        })?;
        result.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Close with the default code 4000 and no reason.
    pub fn close(&self) -> Result<()> {
        self.close_with(DEFAULT_CLOSE_CODE, None)
    }

    pub fn close_with(&self, code: u16, reason: Option<String>) -> Result<()> {
        self.command(Command::Close { code, reason })
    }

    /// Resolve with the first frame carrying `opcode` that arrives after
    /// this call.
    ///
    /// The wait is registered immediately, before the returned future is
    /// polled. A frame claimed by a wait skips normal routing. There is no
    /// timeout; wrap the future in `tokio::time::timeout` if needed. Dropping
    /// the future abandons the wait.
    pub fn wait_for(
        &self,
        opcode: OpCode,
    ) -> impl Future<Output = Result<Envelope>> + Send + 'static {
        let (reply, result) = oneshot::channel();
        let queued = self.command(Command::Wait { opcode, reply });
        async move {
            queued?;
            result.await.map_err(|_| Error::ConnectionClosed)
        }
    }

    /// Wait until the connection task has finished.
    pub async fn closed(&mut self) {
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::error!("Gateway connection task failed: {}", e);
            }
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        self.commands
            .as_ref()
            .ok_or(Error::NotConnected)?
            .send(command)
            .map_err(|_| Error::ConnectionClosed)
    }
}

/// Ask the REST API for the socket URL and append the version and encoding.
async fn discover_gateway_url(rest: &RestClient, query: &str) -> Result<String> {
    let body = rest.get(query).await?;
    let url = body
        .as_json()
        .and_then(|json| json.get("url"))
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| Error::Discovery(format!("response has no url: {:?}", body)))?;

    Ok(format!(
        "{}?v={}&encoding={}",
        url, GATEWAY_VERSION, GATEWAY_ENCODING
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gateway_starts_idle() {
        let gateway = Gateway::new("Bot token", ClientConfig::default());
        assert_eq!(gateway.state(), ConnectionState::Idle);
        assert_eq!(gateway.config().intents, 32641);
        assert_eq!(
            gateway.rest().url("/gateway"),
            "https://discord.com:443/api/v9/gateway"
        );
    }

    #[tokio::test]
    async fn test_send_before_connect_fails() {
        let gateway = Gateway::new("Bot token", ClientConfig::default());
        let result = gateway.send(OpCode::HEARTBEAT, serde_json::Value::Null).await;
        assert!(matches!(result, Err(Error::NotConnected)));
        assert!(matches!(gateway.close(), Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_wait_before_connect_fails() {
        let gateway = Gateway::new("Bot token", ClientConfig::default());
        let result = gateway.wait_for(OpCode::HELLO).await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }
}
