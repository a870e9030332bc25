//! Optional convenience imports for building and using model connections.
//!
//! Prefer importing specialised APIs directly from their owning modules.
//!
//! # Examples
//!
//! ```rust,no_run
//! use restmodel::prelude::*;
//!
//! async fn first(todos: &ModelConnection) -> Result<Option<Instance>> {
//!     let list = todos.get_list(&Query::all()).await?;
//!     Ok(list.get(0))
//! }
//! ```

pub use crate::{
    compose::ModelConnection,
    config::ModelConfig,
    error::{ConnectError, Result},
    instance::{Instance, LiveList},
    model::realtime_rest_model,
    query::{Page, Predicate, Query, QueryLogic, Sort},
    record::Record,
    schema::{Field, ListSchema, Schema},
    transport::{Transport, TransportRequest, TransportResponse},
};
