//! The todo model shared by the integration suites.

use std::{sync::Arc, time::Duration};

use restmodel::{
    ModelConnection,
    config::ModelConfig,
    fixture::FixtureStore,
    instance::LiveList,
    query::QueryLogic,
    realtime_rest_model,
    record::Record,
    schema::{Field, ListSchema, Schema},
};
use rstest::fixture;
use serde_json::Value;

/// URL template of the todo resource.
pub const TODO_URL: &str = "/api/todos/{_id}";

/// Unwrap a `json!` object literal into a record.
///
/// # Panics
///
/// Panics if `value` is not an object.
#[must_use]
pub fn record(value: Value) -> Record {
    match value {
        Value::Object(record) => record,
        other => panic!("expected a JSON object, got {other}"),
    }
}

fn lowercase(value: Value) -> Result<Value, String> {
    match value {
        Value::String(text) => Ok(Value::String(text.to_lowercase())),
        other => Ok(other),
    }
}

/// Todo items: numeric `_id`, `name`, lowercased `status`, `points`,
/// `dueDate` and `complete`.
#[must_use]
pub fn todo_schema() -> Arc<Schema> {
    Schema::builder("Todo")
        .field(Field::number("_id").identity())
        .field(Field::string("name"))
        .field(Field::string("status").transform(lowercase))
        .field(Field::number("points"))
        .field(Field::date("dueDate"))
        .field(Field::boolean("complete"))
        .build()
}

/// An empty todo server.
///
/// # Panics
///
/// Panics if the todo URL template is rejected.
#[must_use]
pub fn todo_store() -> FixtureStore {
    FixtureStore::new(TODO_URL, QueryLogic::new(todo_schema())).expect("valid todo url")
}

/// Todo configuration talking to `store`.
///
/// # Panics
///
/// Panics if the configuration is rejected.
#[must_use]
pub fn todo_config(store: &Arc<FixtureStore>) -> ModelConfig {
    let todo = todo_schema();
    ModelConfig::builder()
        .model(Arc::clone(&todo))
        .list(ListSchema::of("TodoList", todo))
        .url(TODO_URL)
        .transport(Arc::clone(store))
        .build()
        .expect("valid todo config")
}

/// The standard real-time model over `store`.
///
/// # Panics
///
/// Panics if the model fails to compose.
#[must_use]
pub fn todo_model(store: &Arc<FixtureStore>) -> ModelConnection {
    realtime_rest_model(todo_config(store)).expect("todo model composes")
}

/// Identities of the items held by `list`, in list order.
#[must_use]
pub fn ids(list: &LiveList) -> Vec<i64> {
    list.serialize()
        .iter()
        .filter_map(|item| item.get("_id").and_then(Value::as_i64))
        .collect()
}

/// A todo model composed over its own in-memory server.
pub struct TodoHarness {
    /// The server the model talks to.
    pub store: Arc<FixtureStore>,
    /// The composed model connection.
    pub model: ModelConnection,
}

impl TodoHarness {
    /// Harness with an instant server.
    ///
    /// # Panics
    ///
    /// Panics if the todo configuration fails to compose.
    #[must_use]
    pub fn new() -> Self { Self::with_store(todo_store()) }

    /// Harness whose server answers after `latency`.
    ///
    /// # Panics
    ///
    /// Panics if the todo configuration fails to compose.
    #[must_use]
    pub fn with_latency(latency: Duration) -> Self { Self::with_store(todo_store().with_latency(latency)) }

    fn with_store(store: FixtureStore) -> Self {
        let store = Arc::new(store);
        let model = todo_model(&store);
        Self { store, model }
    }

    /// A second model over the same server, with its own identity store.
    ///
    /// # Panics
    ///
    /// Panics if the todo configuration fails to compose.
    #[must_use]
    pub fn another_client(&self) -> ModelConnection { todo_model(&self.store) }

    /// Seed the server with `records`, bypassing the model.
    pub fn seed(&self, records: impl IntoIterator<Item = Value>) {
        for value in records {
            self.store.create_instance(record(value));
        }
    }
}

impl Default for TodoHarness {
    fn default() -> Self { Self::new() }
}

#[allow(
    unused_braces,
    reason = "rustc false positive for single line rstest fixtures"
)]
#[fixture]
pub fn todos() -> TodoHarness { TodoHarness::new() }
