//! Pending one-shot waits keyed by opcode.

use datcord_common::{Envelope, OpCode};
use tokio::sync::oneshot;

/// Something waiting for the next frame with a given opcode.
#[derive(Debug)]
pub(crate) enum Waiter {
    /// The connection's own wait for Hello.
    Handshake,
    /// A caller of `Gateway::wait_for`.
    Caller(oneshot::Sender<Envelope>),
}

impl Waiter {
    fn is_live(&self) -> bool {
        match self {
            Waiter::Handshake => true,
            Waiter::Caller(reply) => !reply.is_closed(),
        }
    }
}

/// Ordered registry of pending waits.
#[derive(Debug, Default)]
pub(crate) struct WaitRegistry {
    pending: Vec<(OpCode, Waiter)>,
}

impl WaitRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, opcode: OpCode, waiter: Waiter) {
        self.pending.push((opcode, waiter));
    }

    /// Remove and return the oldest waiter for `opcode`.
    ///
    /// Callers that gave up (dropped their future) are pruned first, so a
    /// frame is never handed to a waiter that can no longer receive it.
    pub(crate) fn take(&mut self, opcode: OpCode) -> Option<Waiter> {
        self.pending.retain(|(_, waiter)| waiter.is_live());
        let index = self.pending.iter().position(|(op, _)| *op == opcode)?;
        Some(self.pending.remove(index).1)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
