//! Instance construction: hydration, serialization and the save/destroy
//! flows built on the data operations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::Result,
    instance::{Instance, LiveList},
    query::Query,
    record::{IdentityKey, ListData, Record},
};

/// Turns raw records into instances and back.
#[derive(Clone, Copy, Debug, Default)]
pub struct Construction;

impl Behavior for Construction {
    fn name(&self) -> &'static str { "construction" }

    fn provides(&self) -> &'static [Capability] { &[Capability::Instances] }

    fn expects(&self) -> &'static [Capability] { &[Capability::Data] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::Id,
            Operation::GetList,
            Operation::Get,
            Operation::Save,
            Operation::Destroy,
            Operation::HydrateInstance,
            Operation::HydrateList,
            Operation::SerializeInstance,
            Operation::CreatedInstance,
            Operation::UpdatedInstance,
            Operation::DestroyedInstance,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(ConstructionLayer {
            base,
            config: Arc::clone(config),
        })
    }
}

struct ConstructionLayer {
    base: Box<dyn Connection>,
    config: Arc<ModelConfig>,
}

impl ConstructionLayer {
    fn coerce(&self, record: &Record) -> Result<Record> { Ok(self.config.model().coerce(record.clone())?) }

    // Saving an instance that already carries an identity must update the
    // stored instance, not a second copy hydrated from the response.
    fn adopt(this: &dyn Connection, key: IdentityKey, instance: &Instance) {
        if let Some(store) = this.instance_store() {
            if store.get(&key).is_none() {
                store.insert(key, instance);
            }
        }
    }
}

#[async_trait]
impl Connection for ConstructionLayer {
    fn behavior(&self) -> &'static str { "construction" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn id(&self, _this: &dyn Connection, record: &Record) -> Option<IdentityKey> {
        self.config.query_logic().identity(record)
    }

    async fn get_list(&self, this: &dyn Connection, query: &Query) -> Result<LiveList> {
        let query = self.config.query_logic().normalize(query)?;
        let data = this.get_list_data(this, &query).await?;
        this.hydrate_list(this, data, &query)
    }

    async fn get(&self, this: &dyn Connection, params: &Record) -> Result<Instance> {
        let record = this.get_data(this, params).await?;
        this.hydrate_instance(this, record)
    }

    async fn save(&self, this: &dyn Connection, instance: &Instance) -> Result<Instance> {
        let record = this.serialize_instance(this, instance);
        match this.id(this, &record) {
            None => {
                debug!(cid = %instance.cid(), "creating instance");
                if let Some(store) = this.instance_store() {
                    store.track(instance);
                }
                let created = this.create_data(this, &record, Some(instance.cid())).await?;
                this.created_instance(this, instance, &created)?;
            }
            Some(key) => {
                debug!(cid = %instance.cid(), id = %key, "updating instance");
                Self::adopt(this, key, instance);
                let updated = this.update_data(this, &record).await?;
                this.updated_instance(this, instance, &updated)?;
            }
        }
        Ok(instance.clone())
    }

    async fn destroy(&self, this: &dyn Connection, instance: &Instance) -> Result<Instance> {
        let record = this.serialize_instance(this, instance);
        match this.id(this, &record) {
            None => this.destroyed_instance(this, instance, &record)?,
            Some(key) => {
                debug!(cid = %instance.cid(), id = %key, "destroying instance");
                Self::adopt(this, key, instance);
                let destroyed = this.destroy_data(this, &record).await?;
                this.destroyed_instance(this, instance, &destroyed)?;
            }
        }
        Ok(instance.clone())
    }

    fn hydrate_instance(&self, _this: &dyn Connection, record: Record) -> Result<Instance> {
        let props = self.config.model().coerce(record)?;
        Ok(Instance::new(Arc::clone(self.config.model()), props))
    }

    fn hydrate_list(&self, this: &dyn Connection, data: ListData, query: &Query) -> Result<LiveList> {
        let instances = data
            .items
            .into_iter()
            .map(|item| this.hydrate_instance(this, item))
            .collect::<Result<Vec<_>>>()?;
        Ok(LiveList::new(query.clone(), instances, data.meta))
    }

    fn serialize_instance(&self, _this: &dyn Connection, instance: &Instance) -> Record { instance.serialize() }

    fn created_instance(&self, _this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        instance.merge(self.coerce(record)?);
        Ok(())
    }

    fn updated_instance(&self, _this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        let mut record = self.coerce(record)?;
        // The field set is replaced, but a response omitting the identity
        // must not detach the instance from it.
        for field in self.config.query_logic().identity_fields() {
            if !record.contains_key(field) {
                if let Some(value) = instance.get(field) {
                    record.insert(field.clone(), value);
                }
            }
        }
        instance.replace(record);
        Ok(())
    }

    fn destroyed_instance(&self, _this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        instance.merge(self.coerce(record)?);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::test_helpers::{record, todo_config};

    fn layer() -> Box<dyn Connection> {
        Construction.apply(Box::new(crate::connection::BaseConnection), &Arc::new(todo_config()))
    }

    #[test]
    fn hydrate_coerces_and_serialize_round_trips() {
        let conn = layer();
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"_id": "7", "status": "NEW", "points": "3"})))
            .expect("hydrates");
        assert_eq!(
            conn.serialize_instance(conn.as_ref(), &instance),
            record(json!({"_id": 7, "status": "new", "points": 3}))
        );
        assert_eq!(
            conn.id(conn.as_ref(), &instance.serialize()).map(|k| k.to_string()),
            Some("7".to_string())
        );
    }

    #[test]
    fn updated_replaces_while_created_merges() {
        let conn = layer();
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a", "points": 1})))
            .expect("hydrates");
        conn.created_instance(conn.as_ref(), &instance, &record(json!({"_id": 1})))
            .expect("created");
        assert_eq!(instance.get("name"), Some(json!("a")));
        conn.updated_instance(conn.as_ref(), &instance, &record(json!({"points": 2})))
            .expect("updated");
        assert_eq!(instance.serialize(), record(json!({"_id": 1, "points": 2})));
    }

    #[tokio::test]
    async fn save_without_a_data_layer_is_unsupported() {
        let conn = layer();
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a"})))
            .expect("hydrates");
        let err = conn.save(conn.as_ref(), &instance).await.expect_err("no data layer");
        assert!(matches!(err, crate::error::ConnectError::Unsupported(Operation::CreateData)));
    }

    #[tokio::test]
    async fn destroying_an_unsaved_instance_skips_the_server() {
        let conn = layer();
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a"})))
            .expect("hydrates");
        let destroyed = conn.destroy(conn.as_ref(), &instance).await.expect("local destroy");
        assert!(destroyed.ptr_eq(&instance));
    }
}
