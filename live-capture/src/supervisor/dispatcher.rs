//! The single consumer of the status bus.
//!
//! The dispatcher owns every piece of consumer-side state: the session views,
//! the telemetry aggregate and the persisted session list. Producers never
//! touch any of it; they only publish events.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::sink::{SessionView, StatusSink};
use crate::bus::{StatusBus, StatusEvent, StatusEventKind, StatusPublisher};
use crate::registry::SessionRegistry;
use crate::session::SessionStatus;
use crate::store::SessionStore;
use crate::telemetry::{TelemetryAggregator, TelemetrySnapshot};

/// Side effects of a drained batch, applied after the batch is dispatched.
#[derive(Debug, Clone, PartialEq)]
enum Effect {
    /// The set of registered sessions changed.
    ListChanged,
    /// A session completed and must be folded into telemetry.
    Completed { seconds: u64, megabytes: f64 },
}

/// Synchronous consumer state, updated once per event.
struct ConsumerState {
    registry: Arc<SessionRegistry>,
    views: HashMap<String, SessionView>,
    sink: Box<dyn StatusSink>,
}

impl ConsumerState {
    fn apply(&mut self, event: StatusEvent) -> Option<Effect> {
        let registry = &self.registry;
        let view = self
            .views
            .entry(event.session_id.clone())
            .or_insert_with(|| {
                let name = registry
                    .get(&event.session_id)
                    .map(|handle| handle.entry().display_name.clone())
                    .unwrap_or_else(|_| event.session_id.clone());
                SessionView::new(name)
            });
        view.apply(&event.kind);
        self.sink.on_event(&event, view);

        let StatusEventKind::StatusChanged { status, .. } = event.kind else {
            return None;
        };

        if status == SessionStatus::Pending {
            return Some(Effect::ListChanged);
        }
        if !status.is_terminal() {
            return None;
        }

        let view = self.views.remove(&event.session_id)?;
        self.registry.remove(&event.session_id);
        debug!(session_id = %event.session_id, status = %status, "Session retired");

        if status == SessionStatus::Completed {
            Some(Effect::Completed {
                seconds: view.seconds,
                megabytes: view.megabytes,
            })
        } else {
            Some(Effect::ListChanged)
        }
    }
}

/// Drains the status bus on a fixed schedule and applies its events.
pub struct Dispatcher {
    bus: StatusBus,
    state: ConsumerState,
    telemetry: TelemetryAggregator,
    store: SessionStore,
    persist_list: bool,
}

impl Dispatcher {
    pub fn new(
        bus: StatusBus,
        registry: Arc<SessionRegistry>,
        telemetry: TelemetryAggregator,
        store: SessionStore,
        sink: Box<dyn StatusSink>,
    ) -> Self {
        Self {
            bus,
            state: ConsumerState {
                registry,
                views: HashMap::new(),
                sink,
            },
            telemetry,
            store,
            persist_list: true,
        }
    }

    /// Producer handle for new sessions.
    pub fn publisher(&self) -> StatusPublisher {
        self.bus.publisher()
    }

    pub fn view(&self, id: &str) -> Option<&SessionView> {
        self.state.views.get(id)
    }

    pub fn views(&self) -> &HashMap<String, SessionView> {
        &self.state.views
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.snapshot()
    }

    /// Drain and apply every queued event. Returns how many were dispatched.
    pub async fn dispatch_pending(&mut self) -> usize {
        let mut effects = Vec::new();
        let state = &mut self.state;
        let count = self.bus.drain_and_dispatch(|event| {
            if let Some(effect) = state.apply(event) {
                effects.push(effect);
            }
        });

        let mut list_changed = false;
        for effect in effects {
            match effect {
                Effect::ListChanged => list_changed = true,
                Effect::Completed { seconds, megabytes } => {
                    list_changed = true;
                    self.telemetry.fold(seconds, megabytes);
                    if let Err(e) = self.telemetry.save().await {
                        error!(kind = e.kind(), error = %e, "Failed to save telemetry");
                    }
                }
            }
        }

        if list_changed && self.persist_list {
            persist_session_list(&self.state.registry, &self.store).await;
        }
        count
    }

    /// Dispatch every `interval` until `shutdown` fires, then shut down.
    pub async fn run(
        mut self,
        interval: Duration,
        shutdown: CancellationToken,
        shutdown_timeout: Duration,
    ) -> TelemetrySnapshot {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.dispatch_pending().await;
                }
            }
        }

        self.shutdown(shutdown_timeout).await
    }

    /// Persist the active list, stop every session and apply what they report.
    ///
    /// The list written here is kept as is so the next start resumes it;
    /// completions observed while stopping still count in telemetry.
    pub async fn shutdown(&mut self, timeout: Duration) -> TelemetrySnapshot {
        self.dispatch_pending().await;

        info!(
            sessions = self.state.registry.len(),
            "Shutting down, saving session list"
        );
        persist_session_list(&self.state.registry, &self.store).await;
        self.persist_list = false;

        let outcomes = self.state.registry.stop_all(timeout).await;
        debug!(stopped = outcomes.len(), "All session loops exited");

        self.dispatch_pending().await;

        let snapshot = self.telemetry.snapshot();
        info!("{}", snapshot.summary());
        snapshot
    }
}

async fn persist_session_list(registry: &SessionRegistry, store: &SessionStore) {
    let entries = registry.entries();
    if let Err(e) = store.save(&entries).await {
        error!(kind = e.kind(), error = %e, "Failed to save session list");
    }
}
