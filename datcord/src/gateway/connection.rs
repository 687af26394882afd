//! Connection task: owns the socket and the protocol state for its lifetime.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use datcord_common::{Envelope, Hello, Identify, OpCode};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{sleep, Sleep};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

use super::events::{EventBus, GatewayEvent};
use super::heartbeat::{Beat, Heartbeat};
use super::waiters::{WaitRegistry, Waiter};

pub(super) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Close code used for every client-initiated close, liveness failures
/// included.
pub const DEFAULT_CLOSE_CODE: u16 = 4000;

/// Dispatch event that completes the session handshake.
pub const READY_EVENT: &str = "READY";

// Reported when the socket ends without a close frame, or the close frame
// carries no status.
const ABNORMAL_CLOSE_CODE: u16 = 1006;
const NO_STATUS_CODE: u16 = 1005;

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Created, `connect` not called yet.
    Idle,
    /// Discovering the endpoint and opening the socket.
    Connecting,
    /// Socket open, waiting for Hello.
    AwaitingHello,
    /// Heartbeat timer running, Identify not sent yet.
    HeartbeatActive,
    /// Identify sent.
    Identified,
    /// Close frame sent, waiting for the server's reply.
    Closing,
    Closed,
    Errored,
}

impl ConnectionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ConnectionState::Closed | ConnectionState::Errored)
    }
}

/// Requests from `Gateway` handles to the connection task.
#[derive(Debug)]
pub(crate) enum Command {
    Send {
        opcode: OpCode,
        data: serde_json::Value,
        reply: oneshot::Sender<Result<()>>,
    },
    Close {
        code: u16,
        reason: Option<String>,
    },
    Wait {
        opcode: OpCode,
        reply: oneshot::Sender<Envelope>,
    },
}

/// State owned by the connection task.
///
/// Socket frames, caller commands and heartbeat ticks are all handled from
/// one select loop, so nothing here needs locking.
pub(crate) struct Connection {
    token: String,
    config: ClientConfig,
    write: WsWrite,
    events: Arc<EventBus>,
    state: watch::Sender<ConnectionState>,
    heartbeat: Heartbeat,
    waiters: WaitRegistry,
    opened: bool,
    /// Code and reason of the close frame we sent, reported if the server
    /// never answers it.
    sent_close: Option<(u16, String)>,
    close_deadline: Option<Pin<Box<Sleep>>>,
}

impl Connection {
    pub(crate) fn new(
        token: String,
        config: ClientConfig,
        write: WsWrite,
        events: Arc<EventBus>,
        state: watch::Sender<ConnectionState>,
    ) -> Self {
        Self {
            token,
            config,
            write,
            events,
            state,
            heartbeat: Heartbeat::new(),
            waiters: WaitRegistry::new(),
            opened: false,
            sent_close: None,
            close_deadline: None,
        }
    }

    /// Drive the connection until the socket closes or fails.
    pub(crate) async fn run(
        mut self,
        mut read: WsRead,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        self.on_open();

        let mut commands_open = true;
        loop {
            tokio::select! {
                // Commands first, so a wait registered before a frame arrives
                // always sees that frame.
                biased;

                command = commands.recv(), if commands_open => match command {
                    Some(command) => self.on_command(command).await,
                    None => {
                        commands_open = false;
                        tracing::debug!("All gateway handles dropped, closing connection");
                        self.close(DEFAULT_CLOSE_CODE, None).await;
                    }
                },

                frame = read.next() => match frame {
                    Some(Ok(Message::Text(text))) => self.on_message(&text).await,
                    Some(Ok(Message::Ping(data))) => {
                        if !self.is_closing() {
                            if let Err(e) = self.write.send(Message::Pong(data)).await {
                                self.on_error(e.into());
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.into_owned()))
                            .unwrap_or((NO_STATUS_CODE, String::new()));
                        self.on_close(code, reason);
                    }
                    Some(Ok(_)) => {} // Binary and pong frames are not part of the protocol
                    Some(Err(e)) => self.on_error(e.into()),
                    None => self.on_close(ABNORMAL_CLOSE_CODE, String::new()),
                },

                () = self.heartbeat.tick() => self.on_heartbeat_tick().await,

                () = expired(&mut self.close_deadline) => self.on_close_timeout(),
            }

            if self.state().is_terminal() {
                break;
            }
        }

        // Flushes the reply to a server-initiated close
        let flush = Duration::from_millis(self.config.close_timeout_ms);
        let _ = tokio::time::timeout(flush, self.write.close()).await;
        tracing::debug!(
            pending_waits = self.waiters.len(),
            "Gateway connection task finished"
        );
    }

    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Close frame sent; no further writes are possible.
    fn is_closing(&self) -> bool {
        self.state() == ConnectionState::Closing
    }

    fn on_open(&mut self) {
        tracing::info!("Gateway socket opened");
        self.events.emit(GatewayEvent::SocketOpen);
        self.waiters.register(OpCode::HELLO, Waiter::Handshake);
        self.set_state(ConnectionState::AwaitingHello);
    }

    async fn on_command(&mut self, command: Command) {
        match command {
            Command::Send {
                opcode,
                data,
                reply,
            } => {
                let result = if self.is_closing() {
                    Err(Error::ConnectionClosed)
                } else {
                    self.send(opcode, data).await
                };
                let _ = reply.send(result);
            }
            Command::Close { code, reason } => self.close(code, reason).await,
            Command::Wait { opcode, reply } => {
                self.waiters.register(opcode, Waiter::Caller(reply));
            }
        }
    }

    async fn on_message(&mut self, text: &str) {
        let envelope: Envelope = match serde_json::from_str(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!("Discarding malformed gateway frame: {}", e);
                self.events.emit(GatewayEvent::GatewayError {
                    error: Arc::new(Error::Protocol(format!("malformed frame: {}", e))),
                });
                return;
            }
        };
        tracing::debug!(
            opcode = %envelope.opcode,
            sequence = ?envelope.sequence,
            event = ?envelope.event,
            "Received gateway frame"
        );

        self.events
            .emit(GatewayEvent::GatewayMessage(envelope.clone()));
        self.heartbeat.observe(envelope.sequence);

        if let Some(waiter) = self.waiters.take(envelope.opcode) {
            match waiter {
                Waiter::Handshake => self.on_hello(envelope).await,
                Waiter::Caller(reply) => {
                    let _ = reply.send(envelope);
                }
            }
            return;
        }

        if envelope.is_dispatch() {
            self.on_dispatch(envelope);
            return;
        }

        match envelope.opcode {
            OpCode::HEARTBEAT => {
                tracing::debug!("Gateway requested a heartbeat");
                self.beat().await;
            }
            OpCode::HEARTBEAT_ACK => self.heartbeat.acknowledge(),
            OpCode::RECONNECT => {
                tracing::warn!("Gateway requested reconnect, closing connection");
                self.close(DEFAULT_CLOSE_CODE, None).await;
            }
            OpCode::INVALID_SESSION => {
                tracing::warn!("Gateway reported an invalid session, closing connection");
                self.close(DEFAULT_CLOSE_CODE, None).await;
            }
            other => tracing::debug!("Ignoring gateway frame with opcode {}", other),
        }
    }

    async fn on_hello(&mut self, envelope: Envelope) {
        if self.is_closing() {
            tracing::debug!("Ignoring hello received while closing");
            return;
        }
        match self.handshake(envelope).await {
            Ok(()) => {}
            Err(Error::Protocol(message)) => {
                tracing::warn!("Invalid hello from gateway: {}", message);
                self.events.emit(GatewayEvent::GatewayError {
                    error: Arc::new(Error::Protocol(message)),
                });
                self.close(DEFAULT_CLOSE_CODE, None).await;
            }
            Err(e) => self.on_error(e),
        }
    }

    /// Hello → first heartbeat → timer → Identify → open.
    async fn handshake(&mut self, envelope: Envelope) -> Result<()> {
        let hello: Hello = serde_json::from_value(envelope.data)
            .map_err(|e| Error::Protocol(format!("hello payload: {}", e)))?;
        if hello.heartbeat_interval == 0 {
            return Err(Error::Protocol("heartbeat interval is zero".to_string()));
        }
        tracing::info!(
            "Gateway hello received, heartbeat interval {}ms",
            hello.heartbeat_interval
        );

        self.send_heartbeat().await?;
        self.heartbeat
            .start(Duration::from_millis(hello.heartbeat_interval));
        self.set_state(ConnectionState::HeartbeatActive);

        let identify = Identify::new(
            self.token.clone(),
            self.config.default_presence.clone(),
            self.config.intents,
        );
        self.send(OpCode::IDENTIFY, serde_json::to_value(&identify)?)
            .await?;
        self.set_state(ConnectionState::Identified);
        tracing::info!("Sent identify to gateway");

        if !self.config.open_on_ready {
            self.open();
        }
        Ok(())
    }

    fn on_dispatch(&mut self, envelope: Envelope) {
        let Some(name) = envelope.event else {
            tracing::warn!("Dispatch frame without an event name");
            return;
        };
        let is_ready = name == READY_EVENT;

        self.events.emit(GatewayEvent::Dispatch {
            name,
            payload: envelope.data,
        });

        if is_ready && self.config.open_on_ready {
            self.open();
        }
    }

    fn open(&mut self) {
        if self.opened {
            return;
        }
        self.opened = true;
        tracing::info!("Gateway open");
        self.events.emit(GatewayEvent::GatewayOpen);
    }

    async fn on_heartbeat_tick(&mut self) {
        if self.is_closing() {
            return;
        }
        match self.heartbeat.on_tick() {
            Beat::Due => self.beat().await,
            Beat::Missed => {
                tracing::warn!("Heartbeat not acknowledged, closing connection");
                self.close(DEFAULT_CLOSE_CODE, None).await;
            }
        }
    }

    /// Send a heartbeat, treating a write failure as a socket error.
    async fn beat(&mut self) {
        if self.is_closing() {
            tracing::debug!("Skipping heartbeat while closing");
            return;
        }
        if let Err(e) = self.send_heartbeat().await {
            self.on_error(e);
        }
    }

    async fn send_heartbeat(&mut self) -> Result<()> {
        let sequence = self
            .heartbeat
            .last_sequence()
            .map_or(serde_json::Value::Null, serde_json::Value::from);
        self.send(OpCode::HEARTBEAT, sequence).await
    }

    async fn send(&mut self, opcode: OpCode, data: serde_json::Value) -> Result<()> {
        let frame = Envelope::outbound(opcode, data);
        let text = serde_json::to_string(&frame)?;
        self.write.send(Message::Text(text)).await?;
        tracing::debug!(opcode = %opcode, "Sent gateway frame");

        self.events.emit(GatewayEvent::GatewaySend {
            opcode,
            data: frame.data,
        });
        Ok(())
    }

    async fn close(&mut self, code: u16, reason: Option<String>) {
        if matches!(
            self.state(),
            ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Errored
        ) {
            return;
        }
        tracing::info!(code, reason = ?reason, "Closing gateway connection");
        self.set_state(ConnectionState::Closing);

        let reason = reason.unwrap_or_default();
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: reason.clone().into(),
        };
        if let Err(e) = self.write.send(Message::Close(Some(frame))).await {
            self.on_error(e.into());
            return;
        }

        self.sent_close = Some((code, reason));
        let timeout = Duration::from_millis(self.config.close_timeout_ms);
        self.close_deadline = Some(Box::pin(sleep(timeout)));
    }

    /// The server never answered our close frame. Finish the close locally
    /// with the code we sent.
    fn on_close_timeout(&mut self) {
        let (code, reason) = self
            .sent_close
            .take()
            .unwrap_or((DEFAULT_CLOSE_CODE, String::new()));
        tracing::warn!(
            "No close reply within {}ms, dropping the socket",
            self.config.close_timeout_ms
        );
        self.on_close(code, reason);
    }

    fn on_close(&mut self, code: u16, reason: String) {
        if self.state().is_terminal() {
            return;
        }
        self.stop_timers();
        tracing::info!("Gateway closed: {} {}", code, reason);

        self.events.emit(GatewayEvent::GatewayClose {
            code,
            reason: reason.clone(),
        });
        self.events.emit(GatewayEvent::SocketClose { code, reason });
        self.set_state(ConnectionState::Closed);
    }

    fn on_error(&mut self, error: Error) {
        if self.state().is_terminal() {
            return;
        }
        self.stop_timers();
        tracing::error!("Gateway socket error: {}", error);

        let error = Arc::new(error);
        self.events.emit(GatewayEvent::GatewayError {
            error: error.clone(),
        });
        self.events.emit(GatewayEvent::SocketError { error });
        self.set_state(ConnectionState::Errored);
    }

    fn stop_timers(&mut self) {
        if self.heartbeat.stop() {
            tracing::debug!("Heartbeat timer cancelled");
        }
        self.close_deadline = None;
    }
}

/// Completes when the close deadline passes. Never completes while none is
/// armed.
async fn expired(deadline: &mut Option<Pin<Box<Sleep>>>) {
    match deadline.as_mut() {
        Some(deadline) => deadline.as_mut().await,
        None => std::future::pending::<()>().await,
    }
}
