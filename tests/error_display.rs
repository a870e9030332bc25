//! Tests for Display implementations on error types.

use std::sync::Arc;

use restmodel::{
    Capability,
    ConfigError,
    ConnectError,
    Operation,
    ParseError,
    TransportError,
    config::ModelConfig,
    schema::ListSchema,
};
use restmodel_testing::{todo_schema, todo_store};
use serde_json::Value;

#[test]
fn config_error_messages() {
    assert_eq!(
        ConfigError::MissingField("url").to_string(),
        "missing required configuration field `url`"
    );
    assert_eq!(
        ConfigError::MissingCapability {
            behavior: "construction",
            missing: Capability::Data,
        }
        .to_string(),
        "behavior `construction` expects Data but no behavior provides it"
    );
}

#[test]
fn connect_error_messages() {
    let status = ConnectError::from(TransportError::Status {
        method: "PUT",
        path: "/api/todos/3".into(),
        status: 409,
        body: Value::Null,
    });
    assert_eq!(status.to_string(), "PUT /api/todos/3 answered 409");
    assert!(status.is_status(409));

    let io = ConnectError::from(TransportError::from(std::io::Error::other("connection reset")));
    assert_eq!(io.to_string(), "transport I/O error: connection reset");

    let parse = ConnectError::from(ParseError::NotAnObject("an array"));
    assert_eq!(parse.to_string(), "expected an object, found an array");

    assert_eq!(
        ConnectError::Unsupported(Operation::Save).to_string(),
        "operation `save` is not supported by this connection"
    );
}

#[test]
fn builder_reports_the_first_missing_field() {
    let err = ModelConfig::builder()
        .model(todo_schema())
        .list(ListSchema::of("TodoList", todo_schema()))
        .transport(Arc::new(todo_store()))
        .build()
        .expect_err("no url");
    assert_eq!(err, ConfigError::MissingField("url"));
}
