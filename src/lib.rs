#![doc(html_root_url = "https://docs.rs/restmodel/latest")]
//! Public API for the `restmodel` library.
//!
//! A model connection is built by stacking behaviors, each of which wraps
//! the connection below it and overrides some of its operations. The
//! standard stack returned by [`realtime_rest_model`] fetches records over a
//! [`Transport`](transport::Transport), hydrates them into shared
//! [`Instance`]s kept unique per identity, and keeps every held
//! [`LiveList`] in sync as records are created, updated and destroyed.

pub mod behavior;
pub mod compose;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod fixture;
pub mod instance;
pub mod metrics;
pub mod model;
pub mod prelude;
pub mod query;
pub mod record;
pub mod schema;
pub mod store;
pub mod transport;
pub mod url;

#[cfg(test)]
mod test_helpers;

pub use behavior::{Behavior, realtime_rest_behaviors};
pub use compose::{ModelConnection, compose};
pub use config::{ModelConfig, RestSettings};
pub use connection::{Capability, Connection, Operation};
pub use error::{ConfigError, ConnectError, ParseError, Result, SchemaError, TransportError};
pub use events::{EventKind, ModelEvent};
pub use instance::{Cid, Instance, LiveList};
pub use metrics::{DEDUP_HITS_TOTAL, ERRORS_TOTAL, LIST_CHANGES_TOTAL, REQUESTS_TOTAL};
pub use model::realtime_rest_model;
pub use record::{IdentityKey, ListData, Record};
