//! Utilities for exercising `restmodel` connections in integration tests.
//!
//! The fixtures here build the todo model used throughout the test suites
//! on top of an in-memory [`FixtureStore`](restmodel::fixture::FixtureStore),
//! capture log output, and snapshot metrics.
//!
//! ```rust
//! use restmodel::query::Query;
//! use restmodel_testing::TodoHarness;
//!
//! # async fn example() {
//! let todos = TodoHarness::new();
//! let list = todos.model.get_list(&Query::all()).await.unwrap();
//! assert!(list.is_empty());
//! # }
//! ```

pub mod harness;
pub mod logging;
pub mod metrics;

pub use harness::{
    TodoHarness, ids, record, todo_config, todo_model, todo_schema, todo_store, todos,
};
pub use logging::{Level, LoggerHandle, logger};
pub use metrics::{counter_value, with_metrics};
