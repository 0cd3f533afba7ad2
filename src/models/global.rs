// Global counter snapshot: named instantaneous values, kept textual

use serde_json::{Map, Value};
use std::collections::HashMap;

/// Named counter -> textual value, exactly as the server supplied it.
/// These are already rates (bps, pps, CPU utilization), not cumulative
/// counters, so no delta semantics apply.
pub type GlobalSnapshot = HashMap<String, String>;

/// Convert a parsed `data` object into a snapshot. Strings are kept as-is,
/// other scalars are stringified, nested values are skipped.
pub fn snapshot_from_object(data: &Map<String, Value>) -> GlobalSnapshot {
    let mut snapshot = GlobalSnapshot::with_capacity(data.len());
    for (key, value) in data {
        match value {
            Value::String(s) => {
                snapshot.insert(key.clone(), s.clone());
            }
            Value::Number(n) => {
                snapshot.insert(key.clone(), n.to_string());
            }
            Value::Bool(b) => {
                snapshot.insert(key.clone(), b.to_string());
            }
            _ => {}
        }
    }
    snapshot
}
