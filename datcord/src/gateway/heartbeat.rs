//! Heartbeat timer and liveness tracking for one connection.

use std::time::Duration;

use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// What the connection should do when the timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Beat {
    /// The previous beat was acknowledged; send the next one.
    Due,
    /// No acknowledgement since the previous beat.
    Missed,
}

/// Per-connection heartbeat state.
///
/// The timer exists only between Hello and the end of the connection. There
/// is a single slot for it, so starting a timer can never leave a second one
/// running.
#[derive(Debug, Default)]
pub(crate) struct Heartbeat {
    timer: Option<Interval>,
    ack_received: bool,
    last_sequence: Option<u64>,
}

impl Heartbeat {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start beating every `period`. The first tick fires one full period
    /// from now; the beat sent on Hello is the caller's job.
    pub(crate) fn start(&mut self, period: Duration) {
        let mut timer = interval_at(Instant::now() + period, period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.timer = Some(timer);
    }

    /// Cancel the timer. Returns whether one was running.
    pub(crate) fn stop(&mut self) -> bool {
        self.timer.take().is_some()
    }

    pub(crate) fn acknowledge(&mut self) {
        self.ack_received = true;
    }

    /// Record the sequence number of an inbound frame, if it has one.
    pub(crate) fn observe(&mut self, sequence: Option<u64>) {
        if let Some(sequence) = sequence {
            self.last_sequence = Some(sequence);
        }
    }

    pub(crate) fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    /// Wait for the next tick. Never completes while the timer is stopped.
    pub(crate) async fn tick(&mut self) {
        match self.timer.as_mut() {
            Some(timer) => {
                timer.tick().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    /// Decide the outcome of a tick and reset the acknowledgement flag when
    /// a beat is due.
    pub(crate) fn on_tick(&mut self) -> Beat {
        if !self.ack_received {
            return Beat::Missed;
        }
        self.ack_received = false;
        Beat::Due
    }
}
