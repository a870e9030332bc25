//! Publishes model events when instance callbacks run.

use std::sync::Arc;

use async_trait::async_trait;

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::Result,
    events::{EventKind, ModelEvents},
    instance::Instance,
    record::Record,
};

/// Binds instance callbacks to the model event channel.
#[derive(Clone, Copy, Debug, Default)]
pub struct MapBinding;

impl Behavior for MapBinding {
    fn name(&self) -> &'static str { "map-binding" }

    fn provides(&self) -> &'static [Capability] { &[Capability::ModelEvents] }

    fn requires(&self) -> &'static [Capability] { &[Capability::Instances] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::CreatedInstance,
            Operation::UpdatedInstance,
            Operation::DestroyedInstance,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(MapBindingLayer {
            base,
            events: ModelEvents::new(config.event_capacity()),
        })
    }
}

struct MapBindingLayer {
    base: Box<dyn Connection>,
    events: ModelEvents,
}

#[async_trait]
impl Connection for MapBindingLayer {
    fn behavior(&self) -> &'static str { "map-binding" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn model_events(&self) -> Option<&ModelEvents> { Some(&self.events) }

    fn created_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.base.created_instance(this, instance, record)?;
        self.events.publish(EventKind::Created, instance);
        Ok(())
    }

    fn updated_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.base.updated_instance(this, instance, record)?;
        self.events.publish(EventKind::Updated, instance);
        Ok(())
    }

    fn destroyed_instance(&self, this: &dyn Connection, instance: &Instance, record: &Record) -> Result<()> {
        self.base.destroyed_instance(this, instance, record)?;
        instance.mark_destroyed();
        self.events.publish(EventKind::Destroyed, instance);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        behavior::Construction,
        connection::BaseConnection,
        test_helpers::{record, todo_config},
    };

    #[tokio::test]
    async fn callbacks_publish_events_in_order() {
        let config = Arc::new(todo_config());
        let conn = MapBinding.apply(Construction.apply(Box::new(BaseConnection), &config), &config);
        let mut events = conn.model_events().expect("events installed").subscribe();

        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a"})))
            .expect("hydrates");
        let props = record(json!({"_id": 1, "name": "a"}));
        conn.created_instance(conn.as_ref(), &instance, &props).expect("created");
        conn.updated_instance(conn.as_ref(), &instance, &props).expect("updated");
        conn.destroyed_instance(conn.as_ref(), &instance, &props).expect("destroyed");

        for expected in [EventKind::Created, EventKind::Updated, EventKind::Destroyed] {
            let event = events.recv().await.expect("event delivered");
            assert_eq!(event.kind, expected);
            assert!(event.instance.ptr_eq(&instance));
        }
        assert!(instance.is_destroyed());
    }

    #[test]
    fn failed_callbacks_publish_nothing() {
        let config = Arc::new(todo_config());
        let conn = MapBinding.apply(Construction.apply(Box::new(BaseConnection), &config), &config);
        let mut events = conn.model_events().expect("events installed").subscribe();
        let instance = conn
            .hydrate_instance(conn.as_ref(), record(json!({"name": "a"})))
            .expect("hydrates");
        let bad = record(json!({"points": "many"}));
        assert!(conn.destroyed_instance(conn.as_ref(), &instance, &bad).is_err());
        assert!(!instance.is_destroyed());
        assert!(events.try_recv().is_err());
    }
}
