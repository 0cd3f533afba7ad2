// Per-stream flow stats aggregation: baseline deltas, rolling history, pruning

use crate::delta::{fold_baseline, subtract_baseline};
use crate::history::BoundedHistory;
use crate::models::{CounterSet, FlowStatsSample};
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// Samples retained per stream before FIFO eviction kicks in.
pub const FLOW_HISTORY_CAPACITY: usize = 1000;

/// Owns the per-stream history rings and shadow baselines. One `ingest`
/// call processes one flow stats message; `reset` re-bases every stream
/// without losing the totals accumulated since the first start.
#[derive(Debug, Default)]
pub struct FlowStatsAggregator {
    history: HashMap<String, BoundedHistory<FlowStatsSample>>,
    shadow: HashMap<String, FlowStatsSample>,
    last_time: f64,
}

impl FlowStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one raw flow stats payload. Returns whether the message was
    /// applied; malformed payloads and duplicate timestamps are dropped
    /// without touching stream state.
    pub fn ingest(&mut self, payload: &str) -> bool {
        let root: Value = match serde_json::from_str(payload) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "discarding unparseable flow stats payload");
                return false;
            }
        };
        let Some(data) = root.get("data").and_then(Value::as_object) else {
            tracing::debug!("discarding flow stats payload without a data object");
            return false;
        };
        let Some(time) = message_time(data) else {
            tracing::debug!("discarding flow stats payload without a usable ts");
            return false;
        };

        // Exact equality: a retransmitted cycle must not double-count, so
        // the whole message is ignored, pruning included.
        if time == self.last_time {
            return false;
        }
        self.last_time = time;

        let mut unvisited: HashSet<String> = self.history.keys().cloned().collect();
        for (key, stream_value) in data {
            if key == "ts" {
                continue;
            }
            unvisited.remove(key);

            let Some(stream) = stream_value.as_object() else {
                tracing::trace!(stream = %key, "skipping non-object stream entry");
                continue;
            };
            if stream.is_empty() {
                continue;
            }

            let mut tx_pkts = counter_group(stream, "tx_pkts");
            let mut tx_bytes = counter_group(stream, "tx_bytes");
            let mut rx_pkts = counter_group(stream, "rx_pkts");
            let mut rx_bytes = counter_group(stream, "rx_bytes");

            let history = self
                .history
                .entry(key.clone())
                .or_insert_with(|| BoundedHistory::new(FLOW_HISTORY_CAPACITY));

            match self.shadow.get(key) {
                None => {
                    // First sighting establishes the zero reference; no
                    // sample is reported for this cycle.
                    self.shadow.insert(
                        key.clone(),
                        FlowStatsSample::with_counters(tx_pkts, tx_bytes, rx_pkts, rx_bytes, time),
                    );
                }
                Some(shadow) => {
                    subtract_baseline(&mut tx_pkts, &shadow.tx_pkts);
                    subtract_baseline(&mut tx_bytes, &shadow.tx_bytes);
                    subtract_baseline(&mut rx_pkts, &shadow.rx_pkts);
                    subtract_baseline(&mut rx_bytes, &shadow.rx_bytes);

                    let prev = match history.last() {
                        Some(p) => p.clone(),
                        None => FlowStatsSample::empty_at(shadow.time),
                    };
                    history.push(FlowStatsSample::next(
                        &prev, tx_pkts, tx_bytes, rx_pkts, rx_bytes, time,
                    ));
                }
            }
        }

        // Streams the server stopped reporting are gone: drop both the
        // visible history and the baseline.
        for key in unvisited {
            tracing::trace!(stream = %key, "pruning unvisited stream");
            self.history.remove(&key);
            self.shadow.remove(&key);
        }
        true
    }

    /// Re-base every stream: visible history restarts from a zero-copy of
    /// its last sample while the shadow absorbs that sample, so deltas keep
    /// measuring total traffic since the very first start.
    pub fn reset(&mut self) {
        for (key, history) in self.history.iter_mut() {
            let Some(last) = history.last().cloned() else {
                continue;
            };
            history.clear();
            history.push(last.zero_copy());

            let Some(old) = self.shadow.get(key) else {
                continue;
            };
            let folded = FlowStatsSample::with_counters(
                fold_baseline(&last.tx_pkts, &old.tx_pkts),
                fold_baseline(&last.tx_bytes, &old.tx_bytes),
                fold_baseline(&last.rx_pkts, &old.rx_pkts),
                fold_baseline(&last.rx_bytes, &old.rx_bytes),
                last.time,
            );
            self.shadow.insert(key.clone(), folded);
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
        self.shadow.clear();
        self.last_time = 0.0;
    }

    pub fn history_for(&self, key: &str) -> Option<&BoundedHistory<FlowStatsSample>> {
        self.history.get(key)
    }

    pub fn shadow_for(&self, key: &str) -> Option<&FlowStatsSample> {
        self.shadow.get(key)
    }

    /// Owned copy of every stream's history, oldest to newest.
    pub fn history_snapshot(&self) -> HashMap<String, Vec<FlowStatsSample>> {
        self.history
            .iter()
            .map(|(key, history)| (key.clone(), history.to_vec()))
            .collect()
    }

    pub fn last_time(&self) -> f64 {
        self.last_time
    }
}

fn message_time(data: &Map<String, Value>) -> Option<f64> {
    let ts = data.get("ts")?.as_object()?;
    let freq = ts.get("freq")?.as_i64()?;
    let value = ts.get("value")?.as_i64()?;
    if freq <= 0 {
        return None;
    }
    Some(value as f64 / freq as f64)
}

/// Parse one of the four counter groups. Missing group means an empty set
/// (ports default to absent, not zero); entries that fail to parse are
/// skipped individually.
fn counter_group(stream: &Map<String, Value>, key: &str) -> CounterSet {
    let mut group = CounterSet::new();
    let Some(entries) = stream.get(key).and_then(Value::as_object) else {
        return group;
    };
    for (port, value) in entries {
        let Ok(port_index) = port.parse::<u32>() else {
            tracing::trace!(group = key, port = %port, "skipping unparseable port index");
            continue;
        };
        let Some(counter) = counter_value(value) else {
            tracing::trace!(group = key, port = %port, "skipping unparseable counter value");
            continue;
        };
        group.insert(port_index, counter);
    }
    group
}

fn counter_value(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
