//! Real-time reconciliation of held lists.
//!
//! Every settled write, and every change pushed by the server through the
//! `*_instance` operations, is applied to each registered list on its own:
//! the record is inserted where it now belongs, removed where it no longer
//! matches, or moved when only its sort position changed.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::{ConnectError, Result},
    instance::{Cid, Instance, LiveList},
    metrics::{self, ListChange},
    query::QueryLogic,
    record::{IdentityKey, Record},
};

/// Keeps held lists consistent with created, updated and destroyed records.
#[derive(Clone, Copy, Debug, Default)]
pub struct RealTime;

impl Behavior for RealTime {
    fn name(&self) -> &'static str { "real-time" }

    fn provides(&self) -> &'static [Capability] { &[Capability::RealTime] }

    fn requires(&self) -> &'static [Capability] { &[Capability::IdentityStore, Capability::Data] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::CreateInstance,
            Operation::UpdateInstance,
            Operation::DestroyInstance,
            Operation::CreatedData,
            Operation::UpdatedData,
            Operation::DestroyedData,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(RealTimeLayer {
            base,
            config: Arc::clone(config),
        })
    }
}

struct RealTimeLayer {
    base: Box<dyn Connection>,
    config: Arc<ModelConfig>,
}

/// Apply one record to one list. Returns the change made, if any.
fn reconcile(logic: &QueryLogic, list: &LiveList, instance: &Instance, removed: bool) -> Option<ListChange> {
    let record = instance.serialize();
    let query = list.query();
    let key = logic.identity(&record);
    let belongs = !removed && logic.is_member(query, &record);
    list.update(|items| {
        let position = items.iter().position(|held| {
            held.ptr_eq(instance) || (key.is_some() && logic.identity(&held.serialize()) == key)
        });
        match (position, belongs) {
            (None, false) => None,
            (Some(at), false) => {
                items.remove(at);
                Some(ListChange::Remove)
            }
            (None, true) => {
                let others: Vec<Record> = items.iter().map(Instance::serialize).collect();
                let index = logic.index(query, &others, &record);
                if let Some(page) = query.page_window() {
                    if index >= page.len() {
                        return None;
                    }
                }
                items.insert(index, instance.clone());
                if let Some(page) = query.page_window() {
                    items.truncate(page.len());
                }
                Some(ListChange::Insert)
            }
            (Some(at), true) => {
                let held = items.remove(at);
                let others: Vec<Record> = items.iter().map(Instance::serialize).collect();
                let index = logic.index(query, &others, &record);
                items.insert(index, held);
                (index != at).then_some(ListChange::Move)
            }
        }
    })
}

impl RealTimeLayer {
    fn key(&self, this: &dyn Connection, record: &Record) -> Result<IdentityKey> {
        this.id(this, record)
            .ok_or_else(|| ConnectError::MissingIdentity(self.config.query_logic().identity_fields().join(", ")))
    }

    fn stored(&self, key: &IdentityKey) -> Option<Instance> { self.base.instance_store().and_then(|store| store.get(key)) }

    fn reconcile_lists(&self, instance: &Instance, removed: bool) {
        let Some(lists) = self.base.list_store() else {
            return;
        };
        let logic = self.config.query_logic();
        for list in lists.active_lists() {
            if let Some(change) = reconcile(logic, &list, instance, removed) {
                debug!(list = list.id().as_u64(), cid = %instance.cid(), change = change.as_str(), "list reconciled");
                metrics::inc_list_changes(change);
            }
        }
    }

    fn apply_created(&self, this: &dyn Connection, record: &Record, cid: Option<Cid>) -> Result<Instance> {
        let pending = cid.and_then(|cid| self.base.instance_store().and_then(|store| store.pending(cid)));
        let known = || this.id(this, record).and_then(|key| self.stored(&key));
        let instance = match pending.or_else(known) {
            Some(instance) => instance,
            None => this.hydrate_instance(this, record.clone())?,
        };
        this.created_instance(this, &instance, record)?;
        self.reconcile_lists(&instance, false);
        Ok(instance)
    }

    fn apply_updated(&self, this: &dyn Connection, record: &Record) -> Result<Instance> {
        let key = self.key(this, record)?;
        let Some(instance) = self.stored(&key) else {
            warn!(
                model = %self.config.name(),
                id = %key,
                "update for an unknown instance, inserting it as new"
            );
            return self.apply_created(this, record, None);
        };
        this.updated_instance(this, &instance, record)?;
        self.reconcile_lists(&instance, false);
        Ok(instance)
    }

    fn apply_destroyed(&self, this: &dyn Connection, record: &Record) -> Result<Instance> {
        let key = self.key(this, record)?;
        let instance = match self.stored(&key) {
            Some(instance) => instance,
            None => this.hydrate_instance(this, record.clone())?,
        };
        this.destroyed_instance(this, &instance, record)?;
        self.reconcile_lists(&instance, true);
        Ok(instance)
    }
}

#[async_trait]
impl Connection for RealTimeLayer {
    fn behavior(&self) -> &'static str { "real-time" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn created_data(&self, this: &dyn Connection, record: &Record, cid: Option<Cid>) -> Result<()> {
        self.apply_created(this, record, cid)?;
        self.base.created_data(this, record, cid)
    }

    fn updated_data(&self, this: &dyn Connection, record: &Record) -> Result<()> {
        self.apply_updated(this, record)?;
        self.base.updated_data(this, record)
    }

    fn destroyed_data(&self, this: &dyn Connection, record: &Record) -> Result<()> {
        self.apply_destroyed(this, record)?;
        self.base.destroyed_data(this, record)
    }

    async fn create_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.apply_created(this, &record, None)
    }

    async fn update_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.apply_updated(this, &record)
    }

    async fn destroy_instance(&self, this: &dyn Connection, record: Record) -> Result<Instance> {
        self.apply_destroyed(this, &record)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rstest::{fixture, rstest};
    use serde_json::json;

    use super::*;
    use crate::{
        query::{Page, Predicate, Query, Sort},
        schema::{Field, Schema},
        test_helpers::record,
    };

    #[fixture]
    fn logic() -> QueryLogic {
        QueryLogic::new(
            Schema::builder("Todo")
                .field(Field::number("_id").identity())
                .field(Field::number("points"))
                .build(),
        )
    }

    fn instance(logic: &QueryLogic, value: serde_json::Value) -> Instance {
        Instance::new(Arc::clone(logic.schema()), record(value))
    }

    fn list(logic: &QueryLogic, query: Query, values: &[serde_json::Value]) -> LiveList {
        let items = values.iter().map(|v| instance(logic, v.clone())).collect();
        LiveList::new(query, items, Record::new())
    }

    fn points(list: &LiveList) -> Vec<i64> {
        list.serialize()
            .iter()
            .filter_map(|r| r.get("points").and_then(serde_json::Value::as_i64))
            .collect()
    }

    #[rstest]
    fn inserts_at_the_sorted_index(logic: QueryLogic) {
        let query = Query::all().sort(Sort::desc("points"));
        let held = list(&logic, query, &[json!({"_id": 1, "points": 9}), json!({"_id": 2, "points": 1})]);
        let new = instance(&logic, json!({"_id": 3, "points": 5}));
        assert_eq!(reconcile(&logic, &held, &new, false), Some(ListChange::Insert));
        assert_eq!(points(&held), [9, 5, 1]);
        assert_eq!(reconcile(&logic, &held, &new, false), None);
    }

    #[rstest]
    fn removes_records_that_stop_matching(logic: QueryLogic) {
        let query = Query::all().filter("points", Predicate::gt(2));
        let held = list(&logic, query, &[json!({"_id": 1, "points": 9})]);
        let member = held.get(0).expect("held");
        member.set("points", 1).expect("coerces");
        assert_eq!(reconcile(&logic, &held, &member, false), Some(ListChange::Remove));
        assert!(held.is_empty());
        assert_eq!(reconcile(&logic, &held, &member, false), None);
    }

    #[rstest]
    fn moves_without_changing_length(logic: QueryLogic) {
        let query = Query::all().sort(Sort::asc("points"));
        let held = list(&logic, query, &[json!({"_id": 1, "points": 1}), json!({"_id": 2, "points": 2})]);
        let first = held.get(0).expect("held");
        first.set("points", 3).expect("coerces");
        assert_eq!(reconcile(&logic, &held, &first, false), Some(ListChange::Move));
        assert_eq!(points(&held), [2, 3]);
    }

    #[rstest]
    fn pages_accept_inserts_only_inside_their_window(logic: QueryLogic) {
        let query = Query::all()
            .sort(Sort::asc("points"))
            .page(Page::new(0, 1).expect("valid page"));
        let held = list(&logic, query, &[json!({"_id": 1, "points": 1}), json!({"_id": 2, "points": 5})]);
        let outside = instance(&logic, json!({"_id": 3, "points": 9}));
        assert_eq!(reconcile(&logic, &held, &outside, false), None);
        let inside = instance(&logic, json!({"_id": 4, "points": 3}));
        assert_eq!(reconcile(&logic, &held, &inside, false), Some(ListChange::Insert));
        assert_eq!(points(&held), [1, 3]);
    }

    #[rstest]
    fn destroyed_records_leave_every_list(logic: QueryLogic) {
        let held = list(&logic, Query::all(), &[json!({"_id": 1, "points": 1})]);
        let copy = instance(&logic, json!({"_id": 1}));
        assert_eq!(reconcile(&logic, &held, &copy, true), Some(ListChange::Remove));
        assert!(held.is_empty());
    }
}
