// Global stats snapshot bookkeeping (current / previous / shadow)

use crate::models::{GlobalSnapshot, snapshot_from_object};
use serde_json::Value;

/// Sentinel field a global stats message must carry to be considered
/// complete. Partial messages show up on the wire while the server is
/// warming up and are discarded.
pub const CPU_UTIL_KEY: &str = "m_cpu_util";

/// Keeps the most recent valid global snapshot, the one before it, and a
/// lazily-seeded shadow used as the rebase reference. No numeric work
/// happens here; consumers subtract values themselves when they need a
/// rate of change.
#[derive(Debug, Default)]
pub struct GlobalStatsAggregator {
    current: GlobalSnapshot,
    previous: GlobalSnapshot,
    shadow: Option<GlobalSnapshot>,
}

impl GlobalStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one raw global stats payload. Invalid payloads (unparseable,
    /// no `data` object, empty, or missing the sentinel field) are dropped
    /// without touching any state. Returns whether the snapshot advanced.
    pub fn ingest(&mut self, payload: &str) -> bool {
        let root: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "discarding unparseable global stats payload");
                return false;
            }
        };
        let Some(data) = root.get("data").and_then(Value::as_object) else {
            tracing::debug!("discarding global stats payload without a data object");
            return false;
        };
        if data.is_empty() || !data.contains_key(CPU_UTIL_KEY) {
            tracing::debug!(sentinel = CPU_UTIL_KEY, "discarding incomplete global stats payload");
            return false;
        }

        self.previous = std::mem::replace(&mut self.current, snapshot_from_object(data));
        if self.shadow.is_none() {
            self.shadow = Some(self.current.clone());
        }
        true
    }

    pub fn current(&self) -> &GlobalSnapshot {
        &self.current
    }

    pub fn previous(&self) -> &GlobalSnapshot {
        &self.previous
    }

    /// Shadow snapshot: the first valid snapshot seen since the last clear,
    /// or the snapshot captured by the last rebase. Empty until one exists.
    pub fn shadow(&self) -> GlobalSnapshot {
        self.shadow.clone().unwrap_or_default()
    }

    /// Re-base the shadow to the current snapshot (reset semantics).
    pub fn rebase(&mut self) {
        self.shadow = Some(self.current.clone());
    }

    pub fn clear(&mut self) {
        self.current.clear();
        self.previous.clear();
        self.shadow = None;
    }
}
