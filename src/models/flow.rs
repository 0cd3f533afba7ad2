// Per-stream flow stats sample: counters since baseline plus derived rates

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Port index -> cumulative 64-bit counter. Signed so that baseline
/// subtraction may go transiently negative without clamping.
pub type CounterSet = BTreeMap<u32, i64>;

/// Port index -> per-second rate derived from two consecutive samples.
pub type RateSet = BTreeMap<u32, f64>;

/// One stream's counters at one point in time, expressed relative to the
/// stream's shadow baseline, plus per-second rates against the previous
/// sample. Immutable once appended to a history ring.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FlowStatsSample {
    pub tx_pkts: CounterSet,
    pub tx_bytes: CounterSet,
    pub rx_pkts: CounterSet,
    pub rx_bytes: CounterSet,
    #[serde(default)]
    pub tx_pps: RateSet,
    #[serde(default)]
    pub tx_bps: RateSet,
    #[serde(default)]
    pub rx_pps: RateSet,
    #[serde(default)]
    pub rx_bps: RateSet,
    /// Seconds, fractional (server tick value / tick frequency).
    pub time: f64,
}

impl FlowStatsSample {
    /// Zero-valued sample at a given time; the delta origin for a stream
    /// whose history is still empty.
    pub fn empty_at(time: f64) -> Self {
        Self {
            time,
            ..Self::default()
        }
    }

    /// Sample carrying raw counters with no rate information (shadow
    /// baselines and reset origins).
    pub fn with_counters(
        tx_pkts: CounterSet,
        tx_bytes: CounterSet,
        rx_pkts: CounterSet,
        rx_bytes: CounterSet,
        time: f64,
    ) -> Self {
        Self {
            tx_pkts,
            tx_bytes,
            rx_pkts,
            rx_bytes,
            time,
            ..Self::default()
        }
    }

    /// Build the next sample in a history from the previous one: stores the
    /// given counter sets and derives per-port per-second rates over the
    /// elapsed interval. A non-positive interval yields empty rate sets.
    pub fn next(
        prev: &FlowStatsSample,
        tx_pkts: CounterSet,
        tx_bytes: CounterSet,
        rx_pkts: CounterSet,
        rx_bytes: CounterSet,
        time: f64,
    ) -> Self {
        let dt = time - prev.time;
        let tx_pps = per_second(&prev.tx_pkts, &tx_pkts, dt);
        let tx_bps = per_second(&prev.tx_bytes, &tx_bytes, dt);
        let rx_pps = per_second(&prev.rx_pkts, &rx_pkts, dt);
        let rx_bps = per_second(&prev.rx_bytes, &rx_bytes, dt);
        Self {
            tx_pkts,
            tx_bytes,
            rx_pkts,
            rx_bytes,
            tx_pps,
            tx_bps,
            rx_pps,
            rx_bps,
            time,
        }
    }

    /// Clone carrying the same counter values and time but zeroed rates: a
    /// fresh interval origin seeded into a cleared history on reset.
    pub fn zero_copy(&self) -> Self {
        Self::with_counters(
            self.tx_pkts.clone(),
            self.tx_bytes.clone(),
            self.rx_pkts.clone(),
            self.rx_bytes.clone(),
            self.time,
        )
    }
}

fn per_second(prev: &CounterSet, curr: &CounterSet, dt: f64) -> RateSet {
    if dt <= 0.0 {
        return RateSet::new();
    }
    curr.iter()
        .map(|(port, value)| {
            let before = prev.get(port).copied().unwrap_or(0);
            (*port, value.wrapping_sub(before) as f64 / dt)
        })
        .collect()
}
