//! Factory for real-time REST model connections.

use tracing::info;

use crate::{
    behavior::realtime_rest_behaviors,
    compose::{ModelConnection, compose},
    config::ModelConfig,
    error::ConfigError,
};

/// Compose the standard real-time REST pipeline over `config`.
///
/// Behaviors are applied in a fixed order: construction, map-binding,
/// identity-store, data-callbacks, parse, url, real-time, callbacks-once.
///
/// ```
/// use std::sync::Arc;
///
/// use restmodel::{
///     ModelConfig,
///     fixture::FixtureStore,
///     query::QueryLogic,
///     realtime_rest_model,
///     schema::{Field, ListSchema, Schema},
/// };
///
/// let todo = Schema::builder("Todo")
///     .field(Field::number("_id").identity())
///     .field(Field::string("name"))
///     .build();
/// let store = FixtureStore::new("/api/todos/{_id}", QueryLogic::new(Arc::clone(&todo)))
///     .expect("valid template");
/// let config = ModelConfig::builder()
///     .model(Arc::clone(&todo))
///     .list(ListSchema::of("TodoList", todo))
///     .url("/api/todos/{_id}")
///     .transport(Arc::new(store))
///     .build()
///     .expect("valid config");
/// let todos = realtime_rest_model(config).expect("composes");
/// assert_eq!(todos.behaviors().len(), 8);
/// ```
///
/// # Errors
///
/// Returns [`ConfigError`] when the configuration is invalid.
pub fn realtime_rest_model(config: ModelConfig) -> Result<ModelConnection, ConfigError> {
    let name = config.name().to_string();
    let connection = compose(realtime_rest_behaviors(), config)?;
    info!(model = %name, operations = connection.operations().len(), "real-time rest model ready");
    Ok(connection)
}
