//! The connection contract shared by every behavior layer.
//!
//! Each behavior wraps the connection built so far in a new layer that
//! implements [`Connection`] again. A layer overrides the operations it cares
//! about and forwards everything else to [`Connection::base`]; the provided
//! method bodies do that forwarding, so a layer only writes the overrides.
//!
//! Every operation also receives `this`, the outermost layer of the finished
//! composition. Calls made through `this` see every behavior, including ones
//! installed after the caller, while calls made through `base` only see the
//! layers below. Construction, for example, calls `this.create_data` even
//! though the URL layer that implements it sits above construction.

use async_trait::async_trait;

use crate::{
    error::{ConnectError, Result},
    events::ModelEvents,
    instance::{Cid, Instance, LiveList},
    query::Query,
    record::{IdentityKey, ListData, Record},
    store::{InstanceStore, ListStore},
};

/// Named operations a composed connection can expose.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Operation {
    /// Derive a record's identity.
    Id,
    /// Fetch raw list data for a query.
    GetListData,
    /// Fetch one raw record.
    GetData,
    /// Create a record on the server.
    CreateData,
    /// Update a record on the server.
    UpdateData,
    /// Destroy a record on the server.
    DestroyData,
    /// Turn a list response body into list data.
    ParseListData,
    /// Turn an instance response body into a record.
    ParseInstanceData,
    /// Notified after a create settles.
    CreatedData,
    /// Notified after an update settles.
    UpdatedData,
    /// Notified after a destroy settles.
    DestroyedData,
    /// Fetch a live list.
    GetList,
    /// Fetch one instance.
    Get,
    /// Create or update an instance on the server.
    Save,
    /// Destroy an instance on the server.
    Destroy,
    /// Turn a record into an instance.
    HydrateInstance,
    /// Turn list data into a live list.
    HydrateList,
    /// Turn an instance back into a record.
    SerializeInstance,
    /// Apply a created record to its instance.
    CreatedInstance,
    /// Apply an updated record to its instance.
    UpdatedInstance,
    /// Apply a destroyed record to its instance.
    DestroyedInstance,
    /// A record was created elsewhere.
    CreateInstance,
    /// A record was updated elsewhere.
    UpdateInstance,
    /// A record was destroyed elsewhere.
    DestroyInstance,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 24] = [
        Self::Id,
        Self::GetListData,
        Self::GetData,
        Self::CreateData,
        Self::UpdateData,
        Self::DestroyData,
        Self::ParseListData,
        Self::ParseInstanceData,
        Self::CreatedData,
        Self::UpdatedData,
        Self::DestroyedData,
        Self::GetList,
        Self::Get,
        Self::Save,
        Self::Destroy,
        Self::HydrateInstance,
        Self::HydrateList,
        Self::SerializeInstance,
        Self::CreatedInstance,
        Self::UpdatedInstance,
        Self::DestroyedInstance,
        Self::CreateInstance,
        Self::UpdateInstance,
        Self::DestroyInstance,
    ];

    /// Snake-case operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::GetListData => "get_list_data",
            Self::GetData => "get_data",
            Self::CreateData => "create_data",
            Self::UpdateData => "update_data",
            Self::DestroyData => "destroy_data",
            Self::ParseListData => "parse_list_data",
            Self::ParseInstanceData => "parse_instance_data",
            Self::CreatedData => "created_data",
            Self::UpdatedData => "updated_data",
            Self::DestroyedData => "destroyed_data",
            Self::GetList => "get_list",
            Self::Get => "get",
            Self::Save => "save",
            Self::Destroy => "destroy",
            Self::HydrateInstance => "hydrate_instance",
            Self::HydrateList => "hydrate_list",
            Self::SerializeInstance => "serialize_instance",
            Self::CreatedInstance => "created_instance",
            Self::UpdatedInstance => "updated_instance",
            Self::DestroyedInstance => "destroyed_instance",
            Self::CreateInstance => "create_instance",
            Self::UpdateInstance => "update_instance",
            Self::DestroyInstance => "destroy_instance",
        }
    }

    /// Look up an operation by its snake-case name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> { Self::ALL.into_iter().find(|op| op.as_str() == name) }
}

/// Capabilities a behavior can install, used to check composition order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Instance construction and the instance callbacks.
    Instances,
    /// Model-level change events.
    ModelEvents,
    /// Identity store and list registry.
    IdentityStore,
    /// Data-settled callbacks.
    DataCallbacks,
    /// Response parsing.
    Parse,
    /// Data operations over a transport.
    Data,
    /// Reconciliation of held lists.
    RealTime,
    /// Single-fire callbacks and in-flight request sharing.
    RequestDedup,
}

/// One layer of a composed connection.
///
/// All provided methods forward to [`Connection::base`], failing with
/// [`ConnectError::Unsupported`] once the empty base is reached.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Name of the behavior that produced this layer.
    fn behavior(&self) -> &'static str;

    /// The layer this one wraps, or `None` for the empty base.
    fn base(&self) -> Option<&dyn Connection>;

    /// The base layer, or an `Unsupported` error naming `operation`.
    ///
    /// # Errors
    ///
    /// Returns [`ConnectError::Unsupported`] when there is no base.
    fn below(&self, operation: Operation) -> Result<&dyn Connection> {
        self.base().ok_or(ConnectError::Unsupported(operation))
    }

    /// Identity store installed in the composition, if any.
    fn instance_store(&self) -> Option<&InstanceStore> { self.base()?.instance_store() }

    /// Registry of held lists, if any.
    fn list_store(&self) -> Option<&ListStore> { self.base()?.list_store() }

    /// Model event channel, if any.
    fn model_events(&self) -> Option<&ModelEvents> { self.base()?.model_events() }

    /// Identity of `record`, or `None` for records not yet saved.
    fn id(&self, this: &dyn Connection, record: &Record) -> Option<IdentityKey> {
        self.base()?.id(this, record)
    }

    /// Fetch the raw records matching `query`.
    async fn get_list_data(&self, this: &dyn Connection, query: &Query) -> Result<ListData> {
        self.below(Operation::GetListData)?
            .get_list_data(this, query)
            .await
    }

    /// Fetch the raw record identified by `params`.
    async fn get_data(&self, this: &dyn Connection, params: &Record) -> Result<Record> {
        self.below(Operation::GetData)?.get_data(this, params).await
    }

    /// Create `record` on the server. `cid` names the instance being saved.
    async fn create_data(&self, this: &dyn Connection, record: &Record, cid: Option<Cid>) -> Result<Record> {
        self.below(Operation::CreateData)?
            .create_data(this, record, cid)
            .await
    }

    /// Update `record` on the server.
    async fn update_data(&self, this: &dyn Connection, record: &Record) -> Result<Record> {
        self.below(Operation::UpdateData)?.update_data(this, record).await
    }

    /// Destroy `record` on the server.
    async fn destroy_data(&self, this: &dyn Connection, record: &Record) -> Result<Record> {
        self.below(Operation::DestroyData)?
            .destroy_data(this, record)
            .await
    }

    /// Convert a list response body into list data.
    fn parse_list_data(&self, this: &dyn Connection, body: serde_json::Value) -> Result<ListData> {
        self.below(Operation::ParseListData)?.parse_list_data(this, body)
    }

    /// Convert an instance response body into a record.
    fn parse_instance_data(&self, this: &dyn Connection, body: serde_json::Value) -> Result<Record> {
        self.below(Operation::ParseInstanceData)?
            .parse_instance_data(this, body)
    }

    /// Called once a create has settled with `record`.
    fn created_data(&self, this: &dyn Connection, record: &Record, cid: Option<Cid>) -> Result<()> {
        self.below(Operation::CreatedData)?.created_data(this, record, cid)
    }

    /// Called once an update has settled with `record`.
    fn updated_data(&self, this: &dyn Connection, record: &Record) -> Result<()> {
        self.below(Operation::UpdatedData)?.updated_data(this, record)
    }

    /// Called once a destroy has settled with `record`.
    fn destroyed_data(&self, this: &dyn Connection, record: &Record) -> Result<()> {
        self.below(Operation::DestroyedData)?.destroyed_data(this, record)
    }

    /// Fetch a live list for `query`.
    async fn get_list(&self, this: &dyn Connection, query: &Query) -> Result<LiveList> {
        self.below(Operation::GetList)?.get_list(this, query).await
    }

    /// Fetch the instance identified by `params`.
    async fn get(&self, this: &dyn Connection, params: &Record) -> Result<Instance> {
        self.below(Operation::Get)?.get(this, params).await
    }

    /// Create or update `instance` on the server.
    async fn save(&self, this: &dyn Connection, instance: &Instance) -> Result<Instance> {
        self.below(Operation::Save)?.save(this, instance).await
    }

    /// Destroy `instance` on the server.
    async fn destroy(&self, this: &dyn Connection, instance: &Instance) -> Result<Instance> {
        self.below(Operation::Destroy)?.destroy(this, instance).await
    }

    /// Turn a raw record into an instance.
    fn hydrate_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.below(Operation::HydrateInstance)?
            .hydrate_instance(this, record)
    }

    /// Turn list data into a live list bound to `query`.
    fn hydrate_list(&self, this: &dyn Connection, data: ListData, query: &Query) -> Result<LiveList> {
        self.below(Operation::HydrateList)?
            .hydrate_list(this, data, query)
    }

    /// Turn an instance back into the record sent to the server.
    fn serialize_instance(&self, this: &dyn Connection, instance: &Instance) -> Record {
        match self.base() {
            Some(base) => base.serialize_instance(this, instance),
            None => instance.serialize(),
        }
    }

    /// Apply the server's record after `instance` was created.
    fn created_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.below(Operation::CreatedInstance)?
            .created_instance(this, instance, record)
    }

    /// Apply the server's record after `instance` was updated.
    fn updated_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.below(Operation::UpdatedInstance)?
            .updated_instance(this, instance, record)
    }

    /// Apply the server's record after `instance` was destroyed.
    fn destroyed_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.below(Operation::DestroyedInstance)?
            .destroyed_instance(this, instance, record)
    }

    /// A record was created without this connection's involvement.
    async fn create_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.below(Operation::CreateInstance)?
            .create_instance(this, record)
            .await
    }

    /// A record was updated without this connection's involvement.
    async fn update_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.below(Operation::UpdateInstance)?
            .update_instance(this, record)
            .await
    }

    /// A record was destroyed without this connection's involvement.
    async fn destroy_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.below(Operation::DestroyInstance)?
            .destroy_instance(this, record)
            .await
    }
}

/// The empty connection every composition starts from.
#[derive(Debug, Default)]
pub struct BaseConnection;

impl Connection for BaseConnection {
    fn behavior(&self) -> &'static str { "base" }

    fn base(&self) -> Option<&dyn Connection> { None }
}
