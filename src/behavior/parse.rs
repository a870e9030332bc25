//! Response body parsing.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::Behavior;
use crate::{
    config::{ModelConfig, ParseOptions},
    connection::{Capability, Connection, Operation},
    error::{ParseError, Result, json_kind},
    record::{ListData, Record},
};

/// Extracts records from list and instance response bodies.
#[derive(Clone, Copy, Debug, Default)]
pub struct Parse;

impl Behavior for Parse {
    fn name(&self) -> &'static str { "parse" }

    fn provides(&self) -> &'static [Capability] { &[Capability::Parse] }

    fn operations(&self) -> &'static [Operation] { &[Operation::ParseListData, Operation::ParseInstanceData] }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(ParseLayer {
            base,
            options: config.parse().clone(),
        })
    }
}

struct ParseLayer {
    base: Box<dyn Connection>,
    options: ParseOptions,
}

fn into_record(value: Value) -> std::result::Result<Record, ParseError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ParseError::NotAnObject(json_kind(&other))),
    }
}

#[async_trait]
impl Connection for ParseLayer {
    fn behavior(&self) -> &'static str { "parse" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    fn parse_list_data(&self, _this: &dyn Connection, body: Value) -> Result<ListData> {
        let (items, meta) = match body {
            Value::Array(items) => (items, Record::new()),
            Value::Object(mut envelope) => match envelope.remove(&self.options.list_prop) {
                Some(Value::Array(items)) => (items, envelope),
                _ => {
                    return Err(ParseError::NotAList {
                        prop: self.options.list_prop.clone(),
                        found: "an object",
                    }
                    .into());
                }
            },
            other => {
                return Err(ParseError::NotAList {
                    prop: self.options.list_prop.clone(),
                    found: json_kind(&other),
                }
                .into());
            }
        };
        let items = items
            .into_iter()
            .map(into_record)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ListData { items, meta })
    }

    fn parse_instance_data(&self, _this: &dyn Connection, body: Value) -> Result<Record> {
        let body = match (&self.options.instance_prop, body) {
            (Some(prop), Value::Object(mut envelope)) if envelope.contains_key(prop) => {
                envelope.remove(prop).unwrap_or(Value::Null)
            }
            (_, body) => body,
        };
        Ok(into_record(body)?)
    }
}
