//! End-to-end walkthrough of the todo model against the fixture server.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use restmodel::{
    events::EventKind,
    query::{Predicate, Query, Sort},
};
use restmodel_testing::{TodoHarness, ids, record, todos};
use rstest::rstest;
use serde_json::json;

#[rstest]
#[tokio::test]
async fn todo_walkthrough(todos: TodoHarness) {
    let all = todos.model.get_list(&Query::all()).await.expect("list fetched");
    assert!(all.is_empty());
    let changes = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&changes);
    all.on_length(move |_| {
        seen.fetch_add(1, Ordering::SeqCst);
    });

    let lawn = todos
        .model
        .new_instance(record(json!({"name": "lawn", "status": "NEW", "dueDate": "2017-04-30"})))
        .expect("valid todo");
    assert!(todos.model.is_new(&lawn));
    todos.model.save(&lawn).await.expect("lawn saved");
    assert_eq!(lawn.get("status"), Some(json!("new")));
    assert_eq!(lawn.get("_id"), Some(json!(1)));
    assert!(!todos.model.is_new(&lawn));
    assert_eq!(all.len(), 1);

    let pushed = todos.store.create_instance(record(json!({
        "name": "dishes",
        "status": "new",
        "points": 15,
        "dueDate": "2017-05-01"
    })));
    let dishes = todos.model.create_instance(pushed).await.expect("push applied");
    assert_eq!(dishes.get("_id"), Some(json!(2)));
    assert_eq!(all.len(), 2);

    lawn.set("points", 20).expect("points coerce");
    todos.model.save(&lawn).await.expect("lawn updated");

    let trash = todos
        .model
        .new_instance(record(json!({"name": "trash", "points": 30, "dueDate": "2000-01-01"})))
        .expect("valid todo");
    todos.model.save(&trash).await.expect("trash saved");
    assert_eq!(ids(&all), [1, 2, 3]);
    assert_eq!(changes.load(Ordering::SeqCst), 3);

    let query = Query::all()
        .sort(Sort::desc("points"))
        .filter("dueDate", Predicate::gt("2001-04-30"));
    let recent = todos.model.get_list(&query).await.expect("filtered list fetched");
    assert_eq!(ids(&recent), [1, 2]);
    assert!(recent.get(0).expect("first held").ptr_eq(&lawn));
    assert!(recent.get(1).expect("second held").ptr_eq(&dishes));
    assert_eq!(
        recent.serialize()[0],
        record(json!({
            "_id": 1,
            "name": "lawn",
            "status": "new",
            "points": 20,
            "dueDate": "2017-04-30T00:00:00Z"
        }))
    );
    assert_eq!(recent.meta().get("count"), Some(&json!(2)));
}

#[rstest]
#[tokio::test]
async fn saving_publishes_one_event_per_change(todos: TodoHarness) {
    let mut events = todos.model.subscribe().expect("events are installed");
    let todo = todos
        .model
        .new_instance(record(json!({"name": "lawn"})))
        .expect("valid todo");
    todos.model.save(&todo).await.expect("created");
    todo.set("points", 2).expect("points coerce");
    todos.model.save(&todo).await.expect("updated");
    todos.model.destroy(&todo).await.expect("destroyed");

    let mut kinds = Vec::new();
    while let Ok(event) = events.try_recv() {
        assert!(event.instance.ptr_eq(&todo));
        kinds.push(event.kind);
    }
    assert_eq!(kinds, [EventKind::Created, EventKind::Updated, EventKind::Destroyed]);
    assert!(todo.is_destroyed());
    assert!(todos.store.records().is_empty());
}

#[rstest]
#[tokio::test]
async fn refetching_changed_records_publishes_updates(todos: TodoHarness) {
    todos.seed([json!({"name": "lawn", "points": 1})]);
    let todo = todos.model.get_by_id(1).await.expect("fetched");
    let mut events = todos.model.subscribe().expect("events are installed");

    todos.model.get_by_id(1).await.expect("refetched unchanged");
    assert!(events.try_recv().is_err());

    todos
        .store
        .update_instance(record(json!({"_id": 1, "points": 8})))
        .expect("stored on the server");
    let refetched = todos.model.get_by_id(1).await.expect("refetched");
    assert!(refetched.ptr_eq(&todo));
    assert_eq!(todo.get("points"), Some(json!(8)));
    let event = events.try_recv().expect("update published");
    assert_eq!(event.kind, EventKind::Updated);
    assert!(event.instance.ptr_eq(&todo));
}

#[rstest]
#[tokio::test]
async fn unsaved_instances_are_destroyed_locally(todos: TodoHarness) {
    let todo = todos
        .model
        .new_instance(record(json!({"name": "draft"})))
        .expect("valid todo");
    todos.model.destroy(&todo).await.expect("destroyed");
    assert!(todo.is_destroyed());
    assert_eq!(todos.store.request_count(), 0);
}
