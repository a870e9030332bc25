//! Single-fire instance callbacks and shared in-flight reads.
//!
//! A save reports its outcome twice: once from the data-callback path that
//! reconciles lists, and once from the save itself. This layer lets only the
//! first of two identical callbacks through. It also collapses identical
//! concurrent reads onto one request whose settled result, success or error,
//! every caller receives.

use std::{future::Future, sync::Arc};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::{debug, trace};

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::Result,
    instance::Instance,
    metrics,
    query::Query,
    record::{IdentityKey, ListData, Record, canonical_json},
};

/// Dedups instance callbacks and concurrent identical reads.
#[derive(Clone, Copy, Debug, Default)]
pub struct CallbacksOnce;

impl Behavior for CallbacksOnce {
    fn name(&self) -> &'static str { "callbacks-once" }

    fn provides(&self) -> &'static [Capability] { &[Capability::RequestDedup] }

    fn requires(&self) -> &'static [Capability] { &[Capability::Data] }

    fn expects(&self) -> &'static [Capability] { &[Capability::Instances] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::GetListData,
            Operation::GetData,
            Operation::CreatedInstance,
            Operation::UpdatedInstance,
            Operation::DestroyedInstance,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(CallbacksOnceLayer {
            base,
            config: Arc::clone(config),
            lists: InFlight::default(),
            records: InFlight::default(),
        })
    }
}

/// Requests in flight, keyed by operation and canonical parameters.
struct InFlight<T>(DashMap<String, Arc<OnceCell<Result<T>>>>);

impl<T> Default for InFlight<T> {
    fn default() -> Self { Self(DashMap::new()) }
}

impl<T: Clone> InFlight<T> {
    async fn share<F>(&self, operation: Operation, key: String, fetch: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let cell = Arc::clone(self.0.entry(key.clone()).or_default().value());
        let mut ran = false;
        let result = cell
            .get_or_init(|| {
                ran = true;
                fetch
            })
            .await
            .clone();
        if ran {
            self.0.remove_if(&key, |_, current| Arc::ptr_eq(current, &cell));
        } else {
            debug!(operation = operation.as_str(), key = %key, "joined in-flight request");
            metrics::inc_dedup_hits(operation);
        }
        result
    }
}

struct CallbacksOnceLayer {
    base: Box<dyn Connection>,
    config: Arc<ModelConfig>,
    lists: InFlight<ListData>,
    records: InFlight<Record>,
}

/// In-flight key for a single-record read.
///
/// Parameters are coerced through the model schema and identity values are
/// normalized, so `{"_id": 1}` and `{"_id": "1"}` share one request.
fn record_key(config: &ModelConfig, params: &Record) -> String {
    let mut normalized = config
        .model()
        .coerce(params.clone())
        .unwrap_or_else(|_| params.clone());
    for field in config.query_logic().identity_fields() {
        if let Some(key) = IdentityKey::from_values([normalized.get(field)]) {
            normalized.insert(field.clone(), Value::String(key.to_string()));
        }
    }
    format!(
        "{}:{}",
        Operation::GetData.as_str(),
        canonical_json(&Value::Object(normalized))
    )
}

impl CallbacksOnceLayer {
    /// Whether a callback of `operation` with `record` differs from the last
    /// one delivered to `instance`.
    fn first_delivery(operation: Operation, instance: &Instance, record: &Record) -> bool {
        let signature = format!(
            "{}:{}",
            operation.as_str(),
            canonical_json(&Value::Object(record.clone()))
        );
        let first = instance.note_callback(signature);
        if !first {
            trace!(operation = operation.as_str(), cid = %instance.cid(), "suppressed repeated callback");
        }
        first
    }
}

#[async_trait]
impl Connection for CallbacksOnceLayer {
    fn behavior(&self) -> &'static str { "callbacks-once" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    async fn get_list_data(&self, this: &dyn Connection, query: &Query) -> Result<ListData> {
        let key = format!(
            "{}:{}",
            Operation::GetListData.as_str(),
            canonical_json(&query.to_value())
        );
        self.lists
            .share(
                Operation::GetListData,
                key,
                self.base.get_list_data(this, query),
            )
            .await
    }

    async fn get_data(&self, this: &dyn Connection, params: &Record) -> Result<Record> {
        let key = record_key(&self.config, params);
        self.records
            .share(Operation::GetData, key, self.base.get_data(this, params))
            .await
    }

    fn created_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        if !Self::first_delivery(Operation::CreatedInstance, instance, record) {
            return Ok(());
        }
        self.base.created_instance(this, instance, record)
    }

    fn updated_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        if !Self::first_delivery(Operation::UpdatedInstance, instance, record) {
            return Ok(());
        }
        self.base.updated_instance(this, instance, record)
    }

    fn destroyed_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        if !Self::first_delivery(Operation::DestroyedInstance, instance, record) {
            return Ok(());
        }
        self.base.destroyed_instance(this, instance, record)
    }
}
