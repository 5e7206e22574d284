//! Helpers for asserting on metrics recorded during a test.

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// Flattened snapshot entries: metric name, labels and value.
pub type DebugSnapshot = Vec<(String, Vec<(String, String)>, DebugValue)>;

/// Create a debugging recorder and the snapshotter reading it.
#[must_use]
pub fn debugging_recorder() -> (Snapshotter, DebuggingRecorder) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    (snapshotter, recorder)
}

/// Take a snapshot and flatten its keys.
#[must_use]
pub fn snapshot(snapshotter: &Snapshotter) -> DebugSnapshot {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .map(|(key, _, _, value)| {
            let key = key.key();
            let labels = key
                .labels()
                .map(|label| (label.key().to_owned(), label.value().to_owned()))
                .collect();
            (key.name().to_owned(), labels, value)
        })
        .collect()
}

/// Value of counter `name` carrying `label` (if given), or 0 when absent.
#[must_use]
pub fn counter_value(snapshot: &DebugSnapshot, name: &str, label: Option<(&str, &str)>) -> u64 {
    snapshot
        .iter()
        .filter(|(metric, labels, _)| {
            metric == name
                && label.is_none_or(|(k, v)| labels.iter().any(|(lk, lv)| lk == k && lv == v))
        })
        .map(|(_, _, value)| match value {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}
