// Stats facade: owns both aggregators behind one lock, start/reset lifecycle

use crate::flow_stats::FlowStatsAggregator;
use crate::global_stats::GlobalStatsAggregator;
use crate::ingest::{self, StatsFeed};
use crate::models::{FlowStatsSample, GlobalSnapshot};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

/// Notification pushed to subscribers after each applied update. Carries no
/// data; consumers poll the accessors for the snapshot they care about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsEvent {
    GlobalUpdated,
    FlowUpdated,
}

/// Channel sizing for one loader.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Bounded capacity of each ingest channel; producers drop on full.
    pub ingest_capacity: usize,
    /// Broadcast capacity for update events (slow subscribers may lag).
    pub events_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ingest_capacity: 64,
            events_capacity: 16,
        }
    }
}

#[derive(Default)]
struct LoaderState {
    global: GlobalStatsAggregator,
    flow: FlowStatsAggregator,
}

struct Inner {
    state: Mutex<LoaderState>,
    events_tx: broadcast::Sender<StatsEvent>,
}

/// The externally-visible aggregation engine. Constructed explicitly with a
/// well-defined owner (no process-wide singleton); cheap to clone, so the
/// same engine is handed to the ingestion wiring and to readers. One coarse
/// lock guards both aggregates, so a reader never observes a
/// partially-updated sample and `reset` never interleaves with an in-flight
/// update.
#[derive(Clone)]
pub struct StatsLoader {
    inner: Arc<Inner>,
    ingest_capacity: usize,
    ingest_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl StatsLoader {
    pub fn new(config: LoaderConfig) -> Self {
        let (events_tx, _) = broadcast::channel(config.events_capacity.max(1));
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(LoaderState::default()),
                events_tx,
            }),
            ingest_capacity: config.ingest_capacity.max(1),
            ingest_task: Arc::new(Mutex::new(None)),
        }
    }

    // A poisoned lock means a panic mid-update on another thread; recover
    // the guard rather than poisoning every reader forever.
    fn state(&self) -> MutexGuard<'_, LoaderState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Clear all state and (re)wire ingestion. Safe to call repeatedly, e.g.
    /// on reconnect: a fresh consumer task replaces the previous one, never
    /// stacks on top of it, and the old feed's channels close.
    pub fn start(&self) -> StatsFeed {
        let mut guard = self
            .ingest_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Replace, never stack: the previous task goes away before the
        // state is cleared so a stale message cannot land in it.
        if let Some(old) = guard.take() {
            old.abort();
        }
        {
            let mut state = self.state();
            state.global.clear();
            state.flow.clear();
        }
        let (feed, task) = ingest::spawn(self.clone(), self.ingest_capacity);
        *guard = Some(task);
        tracing::debug!("stats loader started");
        feed
    }

    /// Detach from ingestion. State stays readable.
    pub fn stop(&self) {
        let mut guard = self
            .ingest_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = guard.take() {
            task.abort();
            tracing::debug!("stats loader stopped");
        }
    }

    /// Re-base every counter: the global shadow snaps to the current
    /// snapshot and each flow stream restarts its visible history from a
    /// zero-copy origin while its shadow absorbs the last sample.
    pub fn reset(&self) {
        let mut state = self.state();
        state.global.rebase();
        state.flow.reset();
    }

    /// Ingest one raw global stats payload (called by the ingest task).
    pub fn handle_global(&self, payload: &str) {
        let applied = self.state().global.ingest(payload);
        if applied {
            // No receivers is fine; readers may just poll.
            let _ = self.inner.events_tx.send(StatsEvent::GlobalUpdated);
        }
    }

    /// Ingest one raw flow stats payload (called by the ingest task).
    pub fn handle_flow(&self, payload: &str) {
        let applied = self.state().flow.ingest(payload);
        if applied {
            let _ = self.inner.events_tx.send(StatsEvent::FlowUpdated);
        }
    }

    /// Update notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<StatsEvent> {
        self.inner.events_tx.subscribe()
    }

    pub fn global_current(&self) -> GlobalSnapshot {
        self.state().global.current().clone()
    }

    pub fn global_previous(&self) -> GlobalSnapshot {
        self.state().global.previous().clone()
    }

    pub fn global_shadow(&self) -> GlobalSnapshot {
        self.state().global.shadow()
    }

    pub fn flow_history(&self) -> HashMap<String, Vec<FlowStatsSample>> {
        self.state().flow.history_snapshot()
    }

    pub fn history_for(&self, key: &str) -> Option<Vec<FlowStatsSample>> {
        self.state().flow.history_for(key).map(|h| h.to_vec())
    }

    pub fn last_flow_stats_time(&self) -> f64 {
        self.state().flow.last_time()
    }
}
