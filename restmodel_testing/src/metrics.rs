//! Metric capture through `metrics_util`'s debugging recorder.

use metrics_util::{
    CompositeKey,
    debugging::{DebugValue, DebuggingRecorder},
};

/// Snapshot entries as produced by [`metrics_util::debugging::Snapshot`].
pub type Entries = Vec<(CompositeKey, Option<metrics::Unit>, Option<metrics::SharedString>, DebugValue)>;

/// Run `f` with a local debugging recorder installed and return its result
/// together with every metric recorded meanwhile.
///
/// Async work must be driven to completion inside `f`, for example on a
/// current-thread runtime, so that it runs on this thread.
pub fn with_metrics<R>(f: impl FnOnce() -> R) -> (R, Entries) {
    let recorder = DebuggingRecorder::new();
    let snapshotter = recorder.snapshotter();
    let result = metrics::with_local_recorder(&recorder, f);
    (result, snapshotter.snapshot().into_vec())
}

/// Value of the counter `name` whose `label` equals `value`, or zero.
#[must_use]
pub fn counter_value(entries: &Entries, name: &str, label: &str, value: &str) -> u64 {
    entries
        .iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && key
                    .key()
                    .labels()
                    .any(|l| l.key() == label && l.value() == value)
        })
        .map(|(_, _, _, v)| match v {
            DebugValue::Counter(count) => *count,
            _ => 0,
        })
        .sum()
}
