//! Metric helpers for `restmodel`.
//!
//! This module defines metric names and simple helper functions wrapping the
//! [`metrics`](https://docs.rs/metrics) crate. Without the `metrics` feature
//! the helpers compile to nothing.

#[cfg(feature = "metrics")]
use metrics::counter;

use crate::connection::Operation;

/// Name of the counter tracking requests sent to the transport.
pub const REQUESTS_TOTAL: &str = "restmodel_requests_total";
/// Name of the counter tracking reads served by an in-flight request.
pub const DEDUP_HITS_TOTAL: &str = "restmodel_dedup_hits_total";
/// Name of the counter tracking live list changes.
pub const LIST_CHANGES_TOTAL: &str = "restmodel_list_changes_total";
/// Name of the counter tracking failed data operations.
pub const ERRORS_TOTAL: &str = "restmodel_errors_total";

/// How a live list was changed by reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListChange {
    /// A record was inserted.
    Insert,
    /// A record was removed.
    Remove,
    /// A record moved to a new sort position.
    Move,
}

impl ListChange {
    /// Label value for this change.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ListChange::Insert => "insert",
            ListChange::Remove => "remove",
            ListChange::Move => "move",
        }
    }
}

/// Record a request sent for `operation`.
pub fn inc_requests(operation: Operation) {
    #[cfg(feature = "metrics")]
    counter!(REQUESTS_TOTAL, "operation" => operation.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}

/// Record a read that joined an in-flight request.
pub fn inc_dedup_hits(operation: Operation) {
    #[cfg(feature = "metrics")]
    counter!(DEDUP_HITS_TOTAL, "operation" => operation.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}

/// Record a reconciliation change applied to a live list.
pub fn inc_list_changes(change: ListChange) {
    #[cfg(feature = "metrics")]
    counter!(LIST_CHANGES_TOTAL, "change" => change.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = change;
}

/// Record a failed data operation.
pub fn inc_errors(operation: Operation) {
    #[cfg(feature = "metrics")]
    counter!(ERRORS_TOTAL, "operation" => operation.as_str()).increment(1);
    #[cfg(not(feature = "metrics"))]
    let _ = operation;
}
