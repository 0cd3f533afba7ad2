// Per-port counter math: baseline subtraction and reset-time folding.

use crate::models::CounterSet;

/// Rewrite `current` in place as `current - baseline`, per port. Ports with
/// no baseline entry pass through unchanged (baseline treated as zero).
/// Wrapping i64: a server-side counter wrap or restart can make a delta
/// transiently negative, and callers must see that rather than a clamp.
pub fn subtract_baseline(current: &mut CounterSet, baseline: &CounterSet) {
    for (port, value) in current.iter_mut() {
        if let Some(shadow) = baseline.get(port) {
            *value = value.wrapping_sub(*shadow);
        }
    }
}

/// Fold a stream's last visible sample into its old shadow baseline:
/// `last + old` for ports present in both, `last` alone for ports the old
/// baseline never saw. Ports only in the old baseline are dropped, matching
/// the stream's current port set.
pub fn fold_baseline(last: &CounterSet, old: &CounterSet) -> CounterSet {
    last.iter()
        .map(|(port, value)| match old.get(port) {
            Some(shadow) => (*port, value.wrapping_add(*shadow)),
            None => (*port, *value),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(entries: &[(u32, i64)]) -> CounterSet {
        entries.iter().copied().collect()
    }

    #[test]
    fn subtract_baseline_per_port() {
        let mut current = counters(&[(0, 150), (1, 40)]);
        let baseline = counters(&[(0, 100), (1, 15)]);
        subtract_baseline(&mut current, &baseline);
        assert_eq!(current, counters(&[(0, 50), (1, 25)]));
    }

    #[test]
    fn ports_without_baseline_pass_through() {
        let mut current = counters(&[(0, 150), (2, 77)]);
        let baseline = counters(&[(0, 100)]);
        subtract_baseline(&mut current, &baseline);
        assert_eq!(current, counters(&[(0, 50), (2, 77)]));
    }

    #[test]
    fn negative_deltas_are_not_clamped() {
        let mut current = counters(&[(0, 200)]);
        let baseline = counters(&[(0, 250)]);
        subtract_baseline(&mut current, &baseline);
        assert_eq!(current, counters(&[(0, -50)]));
    }

    #[test]
    fn subtraction_wraps_instead_of_overflowing() {
        let mut current = counters(&[(0, i64::MIN)]);
        let baseline = counters(&[(0, 1)]);
        subtract_baseline(&mut current, &baseline);
        assert_eq!(current[&0], i64::MAX);
    }

    #[test]
    fn fold_adds_ports_present_in_both() {
        let last = counters(&[(0, 50), (1, 10)]);
        let old = counters(&[(0, 100), (1, 5)]);
        assert_eq!(fold_baseline(&last, &old), counters(&[(0, 150), (1, 15)]));
    }

    #[test]
    fn fold_keeps_new_ports_and_drops_stale_ones() {
        let last = counters(&[(0, 50), (3, 7)]);
        let old = counters(&[(0, 100), (9, 999)]);
        assert_eq!(fold_baseline(&last, &old), counters(&[(0, 150), (3, 7)]));
    }
}
