//! Status event relay between session tasks and the single consumer.
//!
//! Sessions hold a cloneable [`StatusPublisher`]; publishing is a synchronous
//! push onto an unbounded channel and never waits for the consumer. The consumer
//! owns the [`StatusBus`] and drains it on its own schedule. Events from one
//! publisher are delivered in the order they were published.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::session::SessionStatus;

/// What happened to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEventKind {
    /// The session entered a new status. `message` carries the error text for
    /// `Failed` and the retry counter for `Reconnecting`.
    StatusChanged {
        status: SessionStatus,
        message: Option<String>,
    },
    /// Total recorded seconds so far.
    DurationTick { seconds: u64 },
    /// Current size of the output file.
    SizeTick { megabytes: f64 },
}

/// An immutable status record from one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub session_id: String,
    #[serde(flatten)]
    pub kind: StatusEventKind,
}

impl StatusEvent {
    pub fn status_changed(
        session_id: impl Into<String>,
        status: SessionStatus,
        message: Option<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            kind: StatusEventKind::StatusChanged { status, message },
        }
    }

    pub fn duration_tick(session_id: impl Into<String>, seconds: u64) -> Self {
        Self {
            session_id: session_id.into(),
            kind: StatusEventKind::DurationTick { seconds },
        }
    }

    pub fn size_tick(session_id: impl Into<String>, megabytes: f64) -> Self {
        Self {
            session_id: session_id.into(),
            kind: StatusEventKind::SizeTick { megabytes },
        }
    }

    /// The status carried by a `StatusChanged` event.
    pub fn status(&self) -> Option<SessionStatus> {
        match self.kind {
            StatusEventKind::StatusChanged { status, .. } => Some(status),
            _ => None,
        }
    }
}

/// Producer side of the bus. Cheap to clone; safe to use from any task or thread.
#[derive(Debug, Clone)]
pub struct StatusPublisher {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl StatusPublisher {
    /// Queue an event. Never blocks and never fails; events published after the
    /// consumer is gone are discarded.
    pub fn publish(&self, event: StatusEvent) {
        let _ = self.tx.send(event);
    }
}

/// Consumer side of the bus.
#[derive(Debug)]
pub struct StatusBus {
    tx: mpsc::UnboundedSender<StatusEvent>,
    rx: mpsc::UnboundedReceiver<StatusEvent>,
}

impl StatusBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx }
    }

    /// A new producer handle.
    pub fn publisher(&self) -> StatusPublisher {
        StatusPublisher {
            tx: self.tx.clone(),
        }
    }

    /// Number of queued events.
    pub fn pending(&self) -> usize {
        self.rx.len()
    }

    /// Remove the events queued at the time of the call, in delivery order.
    ///
    /// Events published while draining stay queued for the next drain.
    pub fn drain(&mut self) -> Vec<StatusEvent> {
        let queued = self.rx.len();
        let mut events = Vec::with_capacity(queued);
        for _ in 0..queued {
            match self.rx.try_recv() {
                Ok(event) => events.push(event),
                Err(_) => break,
            }
        }
        events
    }

    /// Drain the queue and hand every event to `handler`. Returns how many
    /// events were dispatched; does nothing when the queue is empty.
    pub fn drain_and_dispatch<F>(&mut self, mut handler: F) -> usize
    where
        F: FnMut(StatusEvent),
    {
        let events = self.drain();
        let count = events.len();
        for event in events {
            handler(event);
        }
        count
    }
}

impl Default for StatusBus {
    fn default() -> Self {
        Self::new()
    }
}
