//! Tests for `restmodel` metrics.
//!
//! Counters are observed through `metrics_util::debugging::DebuggingRecorder`
//! installed as a thread-local recorder around a current-thread runtime.
#![cfg(feature = "metrics")]

use std::future::Future;

use restmodel::{
    DEDUP_HITS_TOTAL,
    ERRORS_TOTAL,
    LIST_CHANGES_TOTAL,
    REQUESTS_TOTAL,
    metrics::{ListChange, inc_list_changes},
    query::Query,
};
use restmodel_testing::{TodoHarness, counter_value, record, with_metrics};
use serde_json::json;

fn block_on<F: Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .expect("runtime")
        .block_on(future)
}

#[test]
fn helper_counts_list_changes() {
    let ((), entries) = with_metrics(|| inc_list_changes(ListChange::Move));
    assert_eq!(counter_value(&entries, LIST_CHANGES_TOTAL, "change", "move"), 1);
}

#[test]
fn requests_and_reconciliation_are_counted() {
    let todos = TodoHarness::new();
    let ((), entries) = with_metrics(|| {
        block_on(async {
            let all = todos.model.get_list(&Query::all()).await.expect("listed");
            let todo = todos
                .model
                .new_instance(record(json!({"name": "lawn"})))
                .expect("valid todo");
            todos.model.save(&todo).await.expect("saved");
            assert_eq!(all.len(), 1);
        });
    });
    assert_eq!(counter_value(&entries, REQUESTS_TOTAL, "operation", "get_list_data"), 1);
    assert_eq!(counter_value(&entries, REQUESTS_TOTAL, "operation", "create_data"), 1);
    assert_eq!(counter_value(&entries, LIST_CHANGES_TOTAL, "change", "insert"), 1);
}

#[test]
fn failures_and_joined_reads_are_counted() {
    let todos = TodoHarness::with_latency(std::time::Duration::from_millis(10));
    todos.seed([json!({"name": "lawn"})]);
    let ((), entries) = with_metrics(|| {
        block_on(async {
            let (a, b) = tokio::join!(todos.model.get_by_id(1), todos.model.get_by_id(1));
            assert!(a.is_ok() && b.is_ok());
            let err = todos.model.get_by_id(8).await.expect_err("missing");
            assert!(err.is_status(404));
        });
    });
    assert_eq!(counter_value(&entries, DEDUP_HITS_TOTAL, "operation", "get_data"), 1);
    assert_eq!(counter_value(&entries, ERRORS_TOTAL, "operation", "get_data"), 1);
}
