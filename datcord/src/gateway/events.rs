//! Lifecycle and dispatch events published by the gateway connection.

use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use datcord_common::{Envelope, OpCode};
use tokio::sync::mpsc;

use crate::error::Error;

pub const SOCKET_OPEN: &str = "socket.open";
pub const SOCKET_CLOSE: &str = "socket.close";
pub const SOCKET_ERROR: &str = "socket.error";
pub const GATEWAY_OPEN: &str = "gateway.open";
pub const GATEWAY_CLOSE: &str = "gateway.close";
pub const GATEWAY_ERROR: &str = "gateway.error";
pub const GATEWAY_MESSAGE: &str = "gateway.message";
pub const GATEWAY_SEND: &str = "gateway.send";
/// Prefix of the per-event dispatch channels, e.g. `gateway.event.READY`.
pub const GATEWAY_EVENT_PREFIX: &str = "gateway.event.";

const WILDCARD: &str = "*";

/// Channel name for dispatch events called `name`.
pub fn dispatch_channel(name: &str) -> String {
    format!("{}{}", GATEWAY_EVENT_PREFIX, name)
}

/// Event published on the bus. Each variant belongs to exactly one channel.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    SocketOpen,
    SocketClose { code: u16, reason: String },
    SocketError { error: Arc<Error> },
    GatewayOpen,
    GatewayClose { code: u16, reason: String },
    GatewayError { error: Arc<Error> },
    /// Every inbound frame, before routing.
    GatewayMessage(Envelope),
    /// Every outbound frame, after it was written.
    GatewaySend {
        opcode: OpCode,
        data: serde_json::Value,
    },
    /// Opcode 0 frame, on the channel `gateway.event.<name>`.
    Dispatch {
        name: String,
        payload: serde_json::Value,
    },
}

impl GatewayEvent {
    pub fn channel(&self) -> Cow<'static, str> {
        match self {
            GatewayEvent::SocketOpen => Cow::Borrowed(SOCKET_OPEN),
            GatewayEvent::SocketClose { .. } => Cow::Borrowed(SOCKET_CLOSE),
            GatewayEvent::SocketError { .. } => Cow::Borrowed(SOCKET_ERROR),
            GatewayEvent::GatewayOpen => Cow::Borrowed(GATEWAY_OPEN),
            GatewayEvent::GatewayClose { .. } => Cow::Borrowed(GATEWAY_CLOSE),
            GatewayEvent::GatewayError { .. } => Cow::Borrowed(GATEWAY_ERROR),
            GatewayEvent::GatewayMessage(_) => Cow::Borrowed(GATEWAY_MESSAGE),
            GatewayEvent::GatewaySend { .. } => Cow::Borrowed(GATEWAY_SEND),
            GatewayEvent::Dispatch { name, .. } => Cow::Owned(dispatch_channel(name)),
        }
    }
}

type Subscribers = HashMap<String, Vec<mpsc::UnboundedSender<GatewayEvent>>>;

/// Dispatch table from channel name to subscribers, in subscription order.
///
/// Emission never blocks. Subscribers that were dropped are pruned the next
/// time their channel fires.
#[derive(Debug, Default)]
pub struct EventBus {
    subscribers: Mutex<Subscribers>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a single channel, e.g. `gateway.open` or
    /// `gateway.event.MESSAGE_CREATE`.
    pub fn subscribe(&self, channel: &str) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lock().entry(channel.to_string()).or_default().push(tx);
        Subscription {
            channel: channel.to_string(),
            rx,
        }
    }

    /// Subscribe to every channel, in emission order.
    pub fn subscribe_all(&self) -> Subscription {
        self.subscribe(WILDCARD)
    }

    pub(crate) fn emit(&self, event: GatewayEvent) {
        let channel = event.channel();
        let mut subscribers = self.lock();
        for key in [channel.as_ref(), WILDCARD] {
            if let Some(senders) = subscribers.get_mut(key) {
                senders.retain(|tx| tx.send(event.clone()).is_ok());
            }
        }
    }

    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.lock().get(channel).map_or(0, Vec::len)
    }

    fn lock(&self) -> MutexGuard<'_, Subscribers> {
        // Emission cannot panic while holding the lock, so a poisoned map is
        // still consistent.
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a channel subscription.
#[derive(Debug)]
pub struct Subscription {
    channel: String,
    rx: mpsc::UnboundedReceiver<GatewayEvent>,
}

impl Subscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next event, or `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<GatewayEvent> {
        self.rx.recv().await
    }

    /// Next already-delivered event, without waiting.
    pub fn try_recv(&mut self) -> Option<GatewayEvent> {
        self.rx.try_recv().ok()
    }
}
