//! Model connection configuration.
//!
//! [`ModelConfig`] is assembled with [`ModelConfig::builder`] and validated
//! once, when built. The plain-data part of the configuration can also be
//! loaded from any serde format as [`RestSettings`] and applied to a builder.

use std::{collections::BTreeMap, fmt, sync::Arc};

use serde::{Deserialize, Serialize};

use crate::{
    connection::Operation,
    error::ConfigError,
    events::DEFAULT_EVENT_CAPACITY,
    query::QueryLogic,
    schema::{ListSchema, Schema},
    transport::Transport,
    url::{Method, Route, Routes},
};

/// Default envelope property holding a list response's items.
pub const DEFAULT_LIST_PROP: &str = "data";

/// Where response bodies keep their payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParseOptions {
    /// Envelope property holding list items.
    pub list_prop: String,
    /// Envelope property holding a single record, if responses wrap it.
    pub instance_prop: Option<String>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            list_prop: DEFAULT_LIST_PROP.to_string(),
            instance_prop: None,
        }
    }
}

/// Serializable subset of the configuration.
///
/// ```
/// use restmodel::config::RestSettings;
///
/// let settings: RestSettings = serde_json::from_str(
///     r#"{"url": "/api/todos/{_id}", "updateMethod": "PATCH",
///         "routes": {"destroy_data": "POST /api/todos/{_id}/archive"}}"#,
/// )
/// .expect("valid settings");
/// assert_eq!(settings.list_prop, "data");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RestSettings {
    /// URL template.
    pub url: Option<String>,
    /// Connection name.
    pub name: Option<String>,
    /// Envelope property holding list items.
    pub list_prop: String,
    /// Envelope property holding a single record.
    pub instance_prop: Option<String>,
    /// Method used for updates.
    pub update_method: Method,
    /// Route overrides keyed by data operation name.
    pub routes: BTreeMap<String, String>,
    /// Capacity of the model event channel.
    pub event_capacity: usize,
}

impl Default for RestSettings {
    fn default() -> Self {
        Self {
            url: None,
            name: None,
            list_prop: DEFAULT_LIST_PROP.to_string(),
            instance_prop: None,
            update_method: Method::Put,
            routes: BTreeMap::new(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

/// Validated configuration shared by every behavior layer.
pub struct ModelConfig {
    name: String,
    model: Arc<Schema>,
    list: ListSchema,
    url: String,
    routes: Routes,
    query_logic: Arc<QueryLogic>,
    transport: Arc<dyn Transport>,
    parse: ParseOptions,
    update_method: Method,
    event_capacity: usize,
}

impl ModelConfig {
    /// Start building a configuration.
    #[must_use]
    pub fn builder() -> ModelConfigBuilder { ModelConfigBuilder::default() }

    /// Connection name, defaulting to the model name.
    #[must_use]
    pub fn name(&self) -> &str { &self.name }

    /// Schema of single items.
    #[must_use]
    pub fn model(&self) -> &Arc<Schema> { &self.model }

    /// Schema of lists.
    #[must_use]
    pub fn list(&self) -> &ListSchema { &self.list }

    /// URL template as configured.
    #[must_use]
    pub fn url(&self) -> &str { &self.url }

    /// Routes for the data operations.
    #[must_use]
    pub fn routes(&self) -> &Routes { &self.routes }

    /// Identity and membership rules.
    #[must_use]
    pub fn query_logic(&self) -> &Arc<QueryLogic> { &self.query_logic }

    /// Transport used by the URL layer.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> { &self.transport }

    /// Response envelope options.
    #[must_use]
    pub fn parse(&self) -> &ParseOptions { &self.parse }

    /// Method used for updates.
    #[must_use]
    pub fn update_method(&self) -> Method { self.update_method }

    /// Capacity of the model event channel.
    #[must_use]
    pub fn event_capacity(&self) -> usize { self.event_capacity }

    /// Check the cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the list holds a different type than the
    /// model, the identity is missing or undeclared, or a route uses a
    /// placeholder the model does not declare.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.list.item().name() != self.model.name() {
            return Err(ConfigError::ListItemMismatch {
                model: self.model.name().to_string(),
                list_item: self.list.item().name().to_string(),
            });
        }
        let identity = self.query_logic.identity_fields();
        if identity.is_empty() {
            return Err(ConfigError::MissingIdentity(self.model.name().to_string()));
        }
        if let Some(field) = identity.iter().find(|f| self.model.field(f).is_none()) {
            return Err(ConfigError::UnknownIdentityField(field.clone()));
        }
        for route in self.routes.iter() {
            for placeholder in route.template().placeholders() {
                if self.model.field(placeholder).is_none() {
                    return Err(ConfigError::UnknownPlaceholder(placeholder.to_string()));
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ModelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConfig")
            .field("name", &self.name)
            .field("model", &self.model.name())
            .field("list", &self.list.name())
            .field("url", &self.url)
            .field("identity", &self.query_logic.identity_fields())
            .field("parse", &self.parse)
            .field("update_method", &self.update_method)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ModelConfig`].
pub struct ModelConfigBuilder {
    name: Option<String>,
    model: Option<Arc<Schema>>,
    list: Option<ListSchema>,
    url: Option<String>,
    routes: Vec<(String, String)>,
    query_logic: Option<QueryLogic>,
    transport: Option<Arc<dyn Transport>>,
    parse: ParseOptions,
    update_method: Method,
    event_capacity: usize,
}

impl Default for ModelConfigBuilder {
    fn default() -> Self {
        Self {
            name: None,
            model: None,
            list: None,
            url: None,
            routes: Vec::new(),
            query_logic: None,
            transport: None,
            parse: ParseOptions::default(),
            update_method: Method::Put,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl ModelConfigBuilder {
    /// Name the connection.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Schema of single items.
    #[must_use]
    pub fn model(mut self, model: Arc<Schema>) -> Self {
        self.model = Some(model);
        self
    }

    /// Schema of lists.
    #[must_use]
    pub fn list(mut self, list: ListSchema) -> Self {
        self.list = Some(list);
        self
    }

    /// URL template, e.g. `/api/todos/{_id}`.
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Override the route of one data operation with a `"METHOD /path"`
    /// string.
    #[must_use]
    pub fn route(mut self, operation: Operation, route: impl Into<String>) -> Self {
        self.routes.push((operation.as_str().to_string(), route.into()));
        self
    }

    /// Identity and membership rules; derived from the model when absent.
    #[must_use]
    pub fn query_logic(mut self, logic: QueryLogic) -> Self {
        self.query_logic = Some(logic);
        self
    }

    /// Transport used to reach the server.
    #[must_use]
    pub fn transport<T: Transport + 'static>(mut self, transport: Arc<T>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Envelope property holding list items.
    #[must_use]
    pub fn list_prop(mut self, prop: impl Into<String>) -> Self {
        self.parse.list_prop = prop.into();
        self
    }

    /// Envelope property holding single records.
    #[must_use]
    pub fn instance_prop(mut self, prop: impl Into<String>) -> Self {
        self.parse.instance_prop = Some(prop.into());
        self
    }

    /// Method used for updates.
    #[must_use]
    pub fn update_method(mut self, method: Method) -> Self {
        self.update_method = method;
        self
    }

    /// Capacity of the model event channel.
    #[must_use]
    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Apply deserialized settings. Fields already set on the builder are
    /// replaced only when the settings carry a value.
    #[must_use]
    pub fn settings(mut self, settings: RestSettings) -> Self {
        if settings.url.is_some() {
            self.url = settings.url;
        }
        if settings.name.is_some() {
            self.name = settings.name;
        }
        self.parse.list_prop = settings.list_prop;
        if settings.instance_prop.is_some() {
            self.parse.instance_prop = settings.instance_prop;
        }
        self.update_method = settings.update_method;
        self.routes.extend(settings.routes);
        self.event_capacity = settings.event_capacity;
        self
    }

    /// Validate and build the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when the model, list, url or
    /// transport was not supplied, [`ConfigError::InvalidUrl`] for malformed
    /// templates or routes, and any error reported by
    /// [`ModelConfig::validate`].
    pub fn build(self) -> Result<ModelConfig, ConfigError> {
        let model = self.model.ok_or(ConfigError::MissingField("model"))?;
        let list = self.list.ok_or(ConfigError::MissingField("list"))?;
        let url = self.url.ok_or(ConfigError::MissingField("url"))?;
        let transport = self.transport.ok_or(ConfigError::MissingField("transport"))?;
        let query_logic = self
            .query_logic
            .unwrap_or_else(|| QueryLogic::new(Arc::clone(&model)));
        let mut routes = Routes::from_template(&url, query_logic.identity_fields(), self.update_method)?;
        for (operation, route) in self.routes {
            let operation = Operation::from_name(&operation)
                .filter(|op| routes.route(*op).is_some())
                .ok_or_else(|| ConfigError::InvalidUrl {
                    url: route.clone(),
                    reason: "routes may only override data operations",
                })?;
            routes = routes.with_route(operation, Route::parse(&route)?);
        }
        let config = ModelConfig {
            name: self.name.unwrap_or_else(|| model.name().to_string()),
            model,
            list,
            url,
            routes,
            query_logic: Arc::new(query_logic),
            transport,
            parse: self.parse,
            update_method: self.update_method,
            event_capacity: self.event_capacity,
        };
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use rstest::{fixture, rstest};
    use serde_json::Value;

    use super::*;
    use crate::{
        error::TransportError,
        schema::Field,
        transport::{TransportRequest, TransportResponse},
    };

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _request: TransportRequest) -> Result<TransportResponse, TransportError> {
            Ok(TransportResponse::ok(Value::Null))
        }
    }

    #[fixture]
    fn todo() -> Arc<Schema> {
        Schema::builder("Todo")
            .field(Field::number("_id").identity())
            .field(Field::string("name"))
            .build()
    }

    fn builder(todo: &Arc<Schema>) -> ModelConfigBuilder {
        ModelConfig::builder()
            .model(Arc::clone(todo))
            .list(ListSchema::of("TodoList", Arc::clone(todo)))
            .url("/api/todos/{_id}")
            .transport(Arc::new(NullTransport))
    }

    #[rstest]
    fn defaults_follow_the_model(todo: Arc<Schema>) {
        let config = builder(&todo).build().expect("valid config");
        assert_eq!(config.name(), "Todo");
        assert_eq!(config.parse().list_prop, "data");
        assert_eq!(config.update_method(), Method::Put);
        assert_eq!(config.query_logic().identity_fields(), ["_id"]);
    }

    #[rstest]
    #[case::model("model")]
    #[case::list("list")]
    #[case::url("url")]
    #[case::transport("transport")]
    fn missing_fields_are_named(todo: Arc<Schema>, #[case] field: &'static str) {
        let mut b = builder(&todo);
        match field {
            "model" => b.model = None,
            "list" => b.list = None,
            "url" => b.url = None,
            _ => b.transport = None,
        }
        assert_eq!(b.build().expect_err("incomplete"), ConfigError::MissingField(field));
    }

    #[rstest]
    fn list_must_hold_the_model(todo: Arc<Schema>) {
        let other = Schema::builder("Note").field(Field::number("_id").identity()).build();
        let err = builder(&todo)
            .list(ListSchema::of("NoteList", other))
            .build()
            .expect_err("mismatched list");
        assert!(matches!(err, ConfigError::ListItemMismatch { .. }));
    }

    #[rstest]
    fn identity_and_placeholders_must_be_declared(todo: Arc<Schema>) {
        let err = builder(&todo)
            .query_logic(QueryLogic::with_identity(Arc::clone(&todo), ["uuid"]))
            .build()
            .expect_err("unknown identity");
        assert_eq!(err, ConfigError::UnknownIdentityField("uuid".into()));

        let err = builder(&todo)
            .url("/api/{owner}/todos/{_id}")
            .build()
            .expect_err("unknown placeholder");
        assert_eq!(err, ConfigError::UnknownPlaceholder("owner".into()));

        let anonymous = Schema::builder("Todo").field(Field::string("name")).build();
        let err = builder(&anonymous).build().expect_err("no identity");
        assert_eq!(err, ConfigError::MissingIdentity("Todo".into()));
    }

    #[rstest]
    fn settings_override_routes_and_methods(todo: Arc<Schema>) {
        let settings: RestSettings = serde_json::from_str(
            r#"{"updateMethod": "PATCH", "listProp": "items",
                "routes": {"destroy_data": "POST /api/todos/{_id}/archive"}}"#,
        )
        .expect("settings parse");
        let config = builder(&todo).settings(settings).build().expect("valid config");
        assert_eq!(config.parse().list_prop, "items");
        let update = config.routes().route(Operation::UpdateData).expect("update route");
        assert_eq!(update.method(), Method::Patch);
        let destroy = config.routes().route(Operation::DestroyData).expect("destroy route");
        assert_eq!(destroy.method(), Method::Post);
    }

    #[rstest]
    fn routes_only_override_data_operations(todo: Arc<Schema>) {
        let err = builder(&todo)
            .route(Operation::Save, "POST /api/todos")
            .build()
            .expect_err("save has no route");
        assert!(matches!(err, ConfigError::InvalidUrl { .. }));
    }
}
