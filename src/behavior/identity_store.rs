//! Identity map: one live instance per identity and a registry of lists.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::Result,
    instance::{Instance, LiveList},
    query::Query,
    record::{ListData, Record},
    store::{InstanceStore, ListStore},
};

/// Keeps one live instance per identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct IdentityStore;

impl Behavior for IdentityStore {
    fn name(&self) -> &'static str { "identity-store" }

    fn provides(&self) -> &'static [Capability] { &[Capability::IdentityStore] }

    fn requires(&self) -> &'static [Capability] { &[Capability::Instances] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::HydrateInstance,
            Operation::HydrateList,
            Operation::CreatedInstance,
            Operation::DestroyedInstance,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, _config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(IdentityStoreLayer {
            base,
            instances: InstanceStore::default(),
            lists: ListStore::default(),
        })
    }
}

struct IdentityStoreLayer {
    base: Box<dyn Connection>,
    instances: InstanceStore,
    lists: ListStore,
}

#[async_trait]
impl Connection for IdentityStoreLayer {
    fn behavior(&self) -> &'static str { "identity-store" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn instance_store(&self) -> Option<&InstanceStore> { Some(&self.instances) }

    fn list_store(&self) -> Option<&ListStore> { Some(&self.lists) }

    fn hydrate_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        let fresh = self.base.hydrate_instance(this, record)?;
        let Some(key) = this.id(this, &fresh.serialize()) else {
            return Ok(fresh);
        };
        let (instance, existed) = self.instances.resolve(key, &fresh);
        if existed {
            let current = instance.serialize();
            let mut merged = current.clone();
            merged.extend(fresh.serialize());
            let changed = merged != current;
            trace!(cid = %instance.cid(), changed, "reusing stored instance");
            if changed {
                this.updated_instance(this, &instance, &merged)?;
            }
        }
        Ok(instance)
    }

    fn hydrate_list(&self, this: &dyn Connection, data: ListData, query: &Query) -> Result<LiveList> {
        let list = self.base.hydrate_list(this, data, query)?;
        self.lists.insert(&list);
        Ok(list)
    }

    fn created_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.base.created_instance(this, instance, record)?;
        if let Some(key) = this.id(this, &instance.serialize()) {
            self.instances.insert(key, instance);
        }
        self.instances.untrack(instance.cid());
        Ok(())
    }

    fn destroyed_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.base.destroyed_instance(this, instance, record)?;
        if let Some(key) = this.id(this, &instance.serialize()) {
            self.instances.remove_instance(&key, instance);
        }
        self.instances.untrack(instance.cid());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        behavior::{Construction, MapBinding},
        connection::BaseConnection,
        events::EventKind,
        test_helpers::{record, todo_config},
    };

    fn layer() -> Box<dyn Connection> {
        let config = Arc::new(todo_config());
        let conn = Construction.apply(Box::new(BaseConnection), &config);
        let conn = MapBinding.apply(conn, &config);
        IdentityStore.apply(conn, &config)
    }

    #[test]
    fn hydrating_a_known_identity_updates_in_place() {
        let conn = layer();
        let first = conn
            .hydrate_instance(conn.as_ref(), record(json!({"_id": 1, "points": 1})))
            .expect("hydrates");
        let second = conn
            .hydrate_instance(conn.as_ref(), record(json!({"_id": "1", "points": 5})))
            .expect("hydrates");
        assert!(first.ptr_eq(&second));
        assert_eq!(first.get("points"), Some(json!(5)));
    }

    #[test]
    fn changed_rehydration_publishes_an_update() {
        let conn = layer();
        let mut events = conn.model_events().expect("events installed").subscribe();
        let stored = conn
            .hydrate_instance(conn.as_ref(), record(json!({"_id": 1, "name": "lawn", "points": 1})))
            .expect("hydrates");

        conn.hydrate_instance(conn.as_ref(), record(json!({"_id": 1, "points": 1})))
            .expect("unchanged");
        assert!(events.try_recv().is_err());

        conn.hydrate_instance(conn.as_ref(), record(json!({"_id": 1, "points": 4})))
            .expect("changed");
        let event = events.try_recv().expect("update published");
        assert_eq!(event.kind, EventKind::Updated);
        assert!(event.instance.ptr_eq(&stored));
        assert_eq!(stored.get("name"), Some(json!("lawn")));
        assert_eq!(stored.get("points"), Some(json!(4)));
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn lists_are_registered_while_held() {
        let conn = layer();
        let data = ListData::new(vec![record(json!({"_id": 1})), record(json!({"_id": 2}))]);
        let list = conn
            .hydrate_list(conn.as_ref(), data, &Query::all())
            .expect("hydrates");
        let lists = conn.list_store().expect("list store");
        assert_eq!(lists.active_lists().len(), 1);
        drop(list);
        assert!(lists.active_lists().is_empty());
    }

    #[test]
    fn created_indexes_and_destroyed_unindexes() {
        let conn = layer();
        let store = conn.instance_store().expect("store");
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a"})))
            .expect("hydrates");
        store.track(&instance);
        conn.created_instance(conn.as_ref(), &instance, &record(json!({"_id": 9})))
            .expect("created");
        assert!(store.pending(instance.cid()).is_none());
        let key = conn.id(conn.as_ref(), &instance.serialize()).expect("identified");
        assert!(store.get(&key).is_some_and(|found| found.ptr_eq(&instance)));

        conn.destroyed_instance(conn.as_ref(), &instance, &Record::new())
            .expect("destroyed");
        assert!(store.get(&key).is_none());
    }
}
