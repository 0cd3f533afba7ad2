// Shared test helpers: raw message builders

use serde_json::{Value, json};

/// Global stats payload with the given string entries under `data`.
pub fn global_message(entries: &[(&str, &str)]) -> String {
    let mut data = serde_json::Map::new();
    for (key, value) in entries {
        data.insert(key.to_string(), Value::String(value.to_string()));
    }
    json!({ "data": data }).to_string()
}

/// Flow stats payload: `streams` is the stream-keyed part of `data`, e.g.
/// `json!({"s1": {"tx_pkts": {"0": 100}}})`.
pub fn flow_message(freq: i64, value: i64, streams: Value) -> String {
    let mut data = streams.as_object().cloned().unwrap_or_default();
    data.insert("ts".to_string(), json!({ "freq": freq, "value": value }));
    json!({ "data": data }).to_string()
}
