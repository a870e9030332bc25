//! Hooks invoked once a write has settled on the server.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::trace;

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::Result,
    instance::Cid,
    record::Record,
};

/// Installs the `*_data` callbacks as no-op hooks for later layers to
/// override.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataCallbacks;

impl Behavior for DataCallbacks {
    fn name(&self) -> &'static str { "data-callbacks" }

    fn provides(&self) -> &'static [Capability] { &[Capability::DataCallbacks] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::CreatedData,
            Operation::UpdatedData,
            Operation::DestroyedData,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(DataCallbacksLayer {
            base,
            name: config.name().to_string(),
        })
    }
}

struct DataCallbacksLayer {
    base: Box<dyn Connection>,
    name: String,
}

#[async_trait]
impl Connection for DataCallbacksLayer {
    fn behavior(&self) -> &'static str { "data-callbacks" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn created_data(&self, _this: &dyn Connection, _record: &Record, cid: Option<Cid>) -> Result<()> {
        trace!(model = %self.name, cid = ?cid, "created data settled");
        Ok(())
    }

    fn updated_data(&self, _this: &dyn Connection, _record: &Record) -> Result<()> {
        trace!(model = %self.name, "updated data settled");
        Ok(())
    }

    fn destroyed_data(&self, _this: &dyn Connection, _record: &Record) -> Result<()> {
        trace!(model = %self.name, "destroyed data settled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{connection::BaseConnection, test_helpers::todo_config};

    #[test]
    fn hooks_succeed_without_a_base_implementation() {
        let conn = DataCallbacks.apply(Box::new(BaseConnection), &Arc::new(todo_config()));
        let record = Record::new();
        assert!(conn.created_data(conn.as_ref(), &record, None).is_ok());
        assert!(conn.updated_data(conn.as_ref(), &record).is_ok());
        assert!(conn.destroyed_data(conn.as_ref(), &record).is_ok());
    }
}
