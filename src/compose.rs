//! Folding behaviors into one connection.

use std::{
    collections::{BTreeSet, HashSet},
    fmt,
    sync::Arc,
};

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use crate::{
    behavior::Behavior,
    config::ModelConfig,
    connection::{BaseConnection, Capability, Connection, Operation},
    error::{ConfigError, ConnectError, Result},
    events::ModelEvent,
    instance::{Instance, LiveList},
    query::Query,
    record::Record,
    store::{InstanceStore, ListStore},
};

/// Apply `behaviors` left to right on top of an empty connection.
///
/// Every capability a behavior requires must be provided by an earlier
/// behavior, and every capability a behavior expects must be provided by
/// some behavior in the list.
///
/// # Errors
///
/// Returns [`ConfigError::NoBehaviors`] for an empty list,
/// [`ConfigError::BehaviorOrder`] or [`ConfigError::MissingCapability`] for
/// an inconsistent list, and any error from [`ModelConfig::validate`].
pub fn compose<I>(behaviors: I, config: ModelConfig) -> std::result::Result<ModelConnection, ConfigError>
where
    I: IntoIterator<Item = Box<dyn Behavior>>,
{
    let behaviors: Vec<Box<dyn Behavior>> = behaviors.into_iter().collect();
    if behaviors.is_empty() {
        return Err(ConfigError::NoBehaviors);
    }
    config.validate()?;
    let config = Arc::new(config);

    let mut provided: HashSet<Capability> = HashSet::new();
    let mut operations = BTreeSet::new();
    let mut names = Vec::with_capacity(behaviors.len());
    let mut connection: Box<dyn Connection> = Box::new(BaseConnection);
    for behavior in &behaviors {
        if let Some(missing) = behavior.requires().iter().find(|c| !provided.contains(*c)) {
            return Err(ConfigError::BehaviorOrder {
                behavior: behavior.name(),
                missing: *missing,
            });
        }
        connection = behavior.apply(connection, &config);
        provided.extend(behavior.provides().iter().copied());
        operations.extend(behavior.operations().iter().copied());
        names.push(behavior.name());
        debug!(model = %config.name(), behavior = behavior.name(), "applied behavior");
    }
    for behavior in &behaviors {
        if let Some(missing) = behavior.expects().iter().find(|c| !provided.contains(*c)) {
            return Err(ConfigError::MissingCapability {
                behavior: behavior.name(),
                missing: *missing,
            });
        }
    }
    Ok(ModelConnection {
        inner: connection,
        config,
        behaviors: names,
        operations,
    })
}

/// A composed connection for one model type.
///
/// Every call enters at the outermost layer, which is also passed down as
/// the late-bound connection for the whole call.
pub struct ModelConnection {
    inner: Box<dyn Connection>,
    config: Arc<ModelConfig>,
    behaviors: Vec<&'static str>,
    operations: BTreeSet<Operation>,
}

impl ModelConnection {
    fn this(&self) -> &dyn Connection { self.inner.as_ref() }

    /// Names of the applied behaviors, innermost first.
    #[must_use]
    pub fn behaviors(&self) -> &[&'static str] { &self.behaviors }

    /// Operations the composition implements.
    #[must_use]
    pub fn operations(&self) -> &BTreeSet<Operation> { &self.operations }

    /// Configuration shared by every layer.
    #[must_use]
    pub fn config(&self) -> &ModelConfig { &self.config }

    /// The outermost layer, for calling operations directly.
    #[must_use]
    pub fn connection(&self) -> &dyn Connection { self.this() }

    /// Identity store, if one is installed.
    #[must_use]
    pub fn instance_store(&self) -> Option<&InstanceStore> { self.this().instance_store() }

    /// Registry of held lists, if one is installed.
    #[must_use]
    pub fn list_store(&self) -> Option<&ListStore> { self.this().list_store() }

    /// Build an unsaved instance from `record`.
    ///
    /// The instance is not tracked until it is saved.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Schema`] if a field cannot be coerced.
    pub fn new_instance(&self, record: Record) -> Result<Instance> {
        let props = self.config.model().coerce(record)?;
        Ok(Instance::new(Arc::clone(self.config.model()), props))
    }

    /// Whether `instance` has no identity yet.
    #[must_use]
    pub fn is_new(&self, instance: &Instance) -> bool { self.this().id(self.this(), &instance.serialize()).is_none() }

    /// Fetch a live list for `query`.
    ///
    /// # Errors
    ///
    /// Returns the transport, parse or schema error of the request.
    pub async fn get_list(&self, query: &Query) -> Result<LiveList> { self.this().get_list(self.this(), query).await }

    /// Fetch the instance addressed by `params`.
    ///
    /// # Errors
    ///
    /// Returns the transport, parse or schema error of the request.
    pub async fn get(&self, params: &Record) -> Result<Instance> { self.this().get(self.this(), params).await }

    /// Fetch the instance with identity `id`. Only for single-field
    /// identities.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::MissingIdentity`] for composite identities and
    /// the request's error otherwise.
    pub async fn get_by_id(&self, id: impl Into<Value>) -> Result<Instance> {
        let identity = self.config.query_logic().identity_fields();
        let [field] = identity else {
            return Err(ConnectError::MissingIdentity(identity.join(", ")));
        };
        let mut params = Record::new();
        params.insert(field.clone(), id.into());
        self.get(&params).await
    }

    /// Create or update `instance` on the server.
    ///
    /// # Errors
    ///
    /// Returns the request's error; the instance is left unchanged.
    pub async fn save(&self, instance: &Instance) -> Result<Instance> { self.this().save(self.this(), instance).await }

    /// Destroy `instance` on the server.
    ///
    /// # Errors
    ///
    /// Returns the request's error; the instance is left unchanged.
    pub async fn destroy(&self, instance: &Instance) -> Result<Instance> {
        self.this().destroy(self.this(), instance).await
    }

    /// Apply a record the server reports as created.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Schema`] if the record cannot be coerced.
    pub async fn create_instance(&self, record: Record) -> Result<Instance> {
        self.this().create_instance(self.this(), record).await
    }

    /// Apply a record the server reports as updated.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::MissingIdentity`] if the record has no
    /// identity, or [`ConnectError::Schema`] if it cannot be coerced.
    pub async fn update_instance(&self, record: Record) -> Result<Instance> {
        self.this().update_instance(self.this(), record).await
    }

    /// Apply a record the server reports as destroyed.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::MissingIdentity`] if the record has no
    /// identity.
    pub async fn destroy_instance(&self, record: Record) -> Result<Instance> {
        self.this().destroy_instance(self.this(), record).await
    }

    /// Receive model events, if an event channel is installed.
    #[must_use]
    pub fn subscribe(&self) -> Option<broadcast::Receiver<ModelEvent>> {
        self.this().model_events().map(|events| events.subscribe())
    }
}

impl fmt::Debug for ModelConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelConnection")
            .field("name", &self.config.name())
            .field("behaviors", &self.behaviors)
            .finish_non_exhaustive()
    }
}
