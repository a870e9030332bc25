//! Shared fixtures for unit tests.

use std::sync::Arc;

use serde_json::Value;

use crate::{
    config::{ModelConfig, ModelConfigBuilder},
    fixture::FixtureStore,
    query::QueryLogic,
    record::Record,
    schema::{Field, ListSchema, Schema},
};

pub(crate) const TODO_URL: &str = "/api/todos/{_id}";

/// Unwrap a `json!` object literal into a record.
pub(crate) fn record(value: Value) -> Record {
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

pub(crate) fn todo_schema() -> Arc<Schema> {
    Schema::builder("Todo")
        .field(Field::number("_id").identity())
        .field(Field::string("name"))
        .field(Field::string("status").transform(lowercase))
        .field(Field::number("points"))
        .field(Field::date("dueDate"))
        .field(Field::boolean("complete"))
        .build()
}

/// Builder for the todo model without a transport.
pub(crate) fn todo_builder() -> ModelConfigBuilder {
    let todo = todo_schema();
    ModelConfig::builder()
        .model(Arc::clone(&todo))
        .list(ListSchema::of("TodoList", todo))
        .url(TODO_URL)
}

pub(crate) fn todo_store() -> FixtureStore {
    FixtureStore::new(TODO_URL, QueryLogic::new(todo_schema())).expect("valid template")
}

pub(crate) fn todo_config() -> ModelConfig {
    todo_builder()
        .transport(Arc::new(todo_store()))
        .build()
        .expect("valid todo config")
}
