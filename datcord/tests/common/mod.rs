//! Mock gateway server and discovery endpoint shared by the integration tests.

#![allow(dead_code)]

use std::time::Duration;

use datcord::{ApiConfig, ClientConfig, Gateway, GatewayEvent, Subscription};
use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TOKEN: &str = "Bot test-token";
const STEP_TIMEOUT: Duration = Duration::from_secs(5);

/// Server side of one accepted gateway socket.
pub struct GatewayPeer {
    ws: WebSocketStream<TcpStream>,
    /// Query string of the upgrade request.
    pub query: Option<String>,
}

impl GatewayPeer {
    pub async fn send_json(&mut self, value: Value) {
        self.send_text(&value.to_string()).await;
    }

    pub async fn send_text(&mut self, text: &str) {
        self.ws
            .send(Message::Text(text.to_string()))
            .await
            .expect("Failed to send frame to client");
    }

    pub async fn send_ping(&mut self, payload: &[u8]) {
        self.ws
            .send(Message::Ping(payload.to_vec()))
            .await
            .expect("Failed to send ping to client");
    }

    pub async fn hello(&mut self, heartbeat_interval: u64) {
        self.send_json(json!({
            "op": 10,
            "d": {"heartbeat_interval": heartbeat_interval},
            "s": null,
            "t": null
        }))
        .await;
    }

    pub async fn next_message(&mut self) -> Message {
        timeout(STEP_TIMEOUT, self.ws.next())
            .await
            .expect("Timed out waiting for a client frame")
            .expect("Client disconnected")
            .expect("WebSocket error")
    }

    /// Next text frame from the client, decoded.
    pub async fn next_frame(&mut self) -> Value {
        loop {
            match self.next_message().await {
                Message::Text(text) => {
                    return serde_json::from_str(&text).expect("Client sent invalid JSON")
                }
                Message::Close(frame) => panic!("Expected a frame, client closed: {:?}", frame),
                _ => continue,
            }
        }
    }

    /// Wait for the client's close frame, answer it, and return its code and
    /// reason.
    pub async fn expect_close(&mut self) -> (u16, String) {
        loop {
            match self.next_message().await {
                Message::Close(frame) => {
                    let _ = self.ws.close(None).await;
                    return frame
                        .map(|f| (u16::from(f.code), f.reason.into_owned()))
                        .unwrap_or((1005, String::new()));
                }
                Message::Text(text) => panic!("Expected close, client sent {}", text),
                _ => continue,
            }
        }
    }
}

/// Bind a mock gateway on a free port. Returns its URL and a handle that
/// resolves once the client has connected.
pub async fn spawn_gateway() -> (String, JoinHandle<GatewayPeer>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let accept = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut query = None;
        let ws = accept_hdr_async(
            stream,
            |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
                query = request.uri().query().map(str::to_string);
                Ok(response)
            },
        )
        .await
        .expect("WebSocket handshake failed");
        GatewayPeer { ws, query }
    });

    (format!("ws://{}/", addr), accept)
}

/// Discovery endpoint answering `GET /api/v9/gateway` with `ws_url`.
pub async fn spawn_discovery(ws_url: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v9/gateway"))
        .and(header("Authorization", TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "url": ws_url })))
        .mount(&server)
        .await;
    server
}

pub fn client_config(server: &MockServer) -> ClientConfig {
    ClientConfig {
        api: ApiConfig {
            scheme: "http".to_string(),
            host: "127.0.0.1".to_string(),
            base_path: "/api/v9".to_string(),
            port: server.address().port(),
        },
        ..ClientConfig::default()
    }
}

/// A connected client, the server side of its socket, and a subscription to
/// every event taken before connecting.
pub struct Harness {
    pub gateway: Gateway,
    pub peer: GatewayPeer,
    pub events: Subscription,
    _discovery: MockServer,
}

pub async fn connect_with(configure: impl FnOnce(&mut ClientConfig)) -> Harness {
    let (ws_url, accept) = spawn_gateway().await;
    let discovery = spawn_discovery(&ws_url).await;

    let mut config = client_config(&discovery);
    configure(&mut config);

    let mut gateway = Gateway::new(TOKEN, config);
    let events = gateway.subscribe_all();
    gateway.connect().await.expect("Failed to connect");
    let peer = accept.await.unwrap();

    Harness {
        gateway,
        peer,
        events,
        _discovery: discovery,
    }
}

pub async fn connect() -> Harness {
    connect_with(|_| {}).await
}

/// Connect, send Hello, and consume the first heartbeat and Identify.
pub async fn identified(heartbeat_interval: u64) -> Harness {
    let mut harness = connect().await;
    harness.peer.hello(heartbeat_interval).await;
    let heartbeat = harness.peer.next_frame().await;
    assert_eq!(heartbeat["op"], 1);
    let identify = harness.peer.next_frame().await;
    assert_eq!(identify["op"], 2);
    wait_for_channel(&mut harness.events, "gateway.open").await;
    harness
}

/// Channel names of every event already delivered, without waiting.
pub fn drain_channels(events: &mut Subscription) -> Vec<String> {
    let mut seen = Vec::new();
    while let Some(event) = events.try_recv() {
        seen.push(event.channel().into_owned());
    }
    seen
}

pub async fn next_event(events: &mut Subscription) -> GatewayEvent {
    timeout(STEP_TIMEOUT, events.recv())
        .await
        .expect("Timed out waiting for an event")
        .expect("Event bus closed")
}

/// Skip events until one arrives on `channel`.
pub async fn wait_for_channel(events: &mut Subscription, channel: &str) -> GatewayEvent {
    loop {
        let event = next_event(events).await;
        if event.channel() == channel {
            return event;
        }
    }
}

/// Channel names of every event up to and including the first on `channel`.
pub async fn channels_until(events: &mut Subscription, channel: &str) -> Vec<String> {
    let mut seen = Vec::new();
    loop {
        let name = next_event(events).await.channel().into_owned();
        let done = name == channel;
        seen.push(name);
        if done {
            return seen;
        }
    }
}
