//! Data operations over the transport, addressed by URL templates.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::Behavior;
use crate::{
    config::ModelConfig,
    connection::{Capability, Connection, Operation},
    error::{ConnectError, Result, TransportError},
    instance::Cid,
    metrics,
    query::{Comparison, Query},
    record::{ListData, Record},
    transport::{TransportRequest, TransportResponse},
    url::{Method, Route},
};

/// Implements the data operations as REST requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct DataUrl;

impl Behavior for DataUrl {
    fn name(&self) -> &'static str { "url" }

    fn provides(&self) -> &'static [Capability] { &[Capability::Data] }

    fn requires(&self) -> &'static [Capability] { &[Capability::Parse, Capability::DataCallbacks] }

    fn operations(&self) -> &'static [Operation] {
        &[
            Operation::GetListData,
            Operation::GetData,
            Operation::CreateData,
            Operation::UpdateData,
            Operation::DestroyData,
        ]
    }

    fn apply(&self, base: Box<dyn Connection>, config: &Arc<ModelConfig>) -> Box<dyn Connection> {
        Box::new(DataUrlLayer {
            base,
            config: Arc::clone(config),
        })
    }
}

struct DataUrlLayer {
    base: Box<dyn Connection>,
    config: Arc<ModelConfig>,
}

/// Values of single `$eq` predicates, used to fill collection placeholders.
fn equality_params(query: &Query) -> Record {
    query
        .predicates()
        .iter()
        .filter_map(|(field, predicate)| match predicate.clauses() {
            [(Comparison::Eq, value)] => Some((field.clone(), value.clone())),
            _ => None,
        })
        .collect()
}

impl DataUrlLayer {
    fn route(&self, operation: Operation) -> Result<&Route> {
        self.config
            .routes()
            .route(operation)
            .ok_or(ConnectError::Unsupported(operation))
    }

    async fn send(&self, operation: Operation, request: TransportRequest) -> Result<TransportResponse> {
        metrics::inc_requests(operation);
        debug!(
            model = %self.config.name(),
            operation = operation.as_str(),
            method = request.method.as_str(),
            url = %request.url(),
            "sending request"
        );
        let method = request.method.as_str();
        let path = request.path.clone();
        let response = match self.config.transport().send(request).await {
            Ok(response) => response,
            Err(error) => {
                metrics::inc_errors(operation);
                warn!(operation = operation.as_str(), %error, "transport failed");
                return Err(error.into());
            }
        };
        if !response.is_success() {
            metrics::inc_errors(operation);
            debug!(operation = operation.as_str(), status = response.status, "request rejected");
            return Err(TransportError::Status {
                method,
                path,
                status: response.status,
                body: response.body,
            }
            .into());
        }
        Ok(response)
    }

    /// Send a write and parse its response, falling back to the request
    /// record when the server answers without a body.
    async fn write(&self, this: &dyn Connection, operation: Operation, record: &Record) -> Result<Record> {
        let route = self.route(operation)?;
        let path = route.template().expand(record)?;
        let mut request = TransportRequest::new(route.method(), path);
        if route.method() != Method::Delete {
            request = request.with_body(Value::Object(record.clone()));
        }
        let response = self.send(operation, request).await?;
        match response.body {
            Value::Null => Ok(record.clone()),
            body => this.parse_instance_data(this, body),
        }
    }
}

#[async_trait]
impl Connection for DataUrlLayer {
    fn behavior(&self) -> &'static str { "url" }

    fn base(&self) -> Option<&dyn Connection> { Some(self.base.as_ref()) }

    async fn get_list_data(&self, this: &dyn Connection, query: &Query) -> Result<ListData> {
        let route = self.route(Operation::GetListData)?;
        let path = route.template().expand(&equality_params(query))?;
        let request = TransportRequest::new(route.method(), path).with_query(query.to_params());
        let response = self.send(Operation::GetListData, request).await?;
        this.parse_list_data(this, response.body)
    }

    async fn get_data(&self, this: &dyn Connection, params: &Record) -> Result<Record> {
        let route = self.route(Operation::GetData)?;
        let path = route.template().expand(params)?;
        let response = self
            .send(Operation::GetData, TransportRequest::new(route.method(), path))
            .await?;
        this.parse_instance_data(this, response.body)
    }

    async fn create_data(&self, this: &dyn Connection, record: &Record, cid: Option<Cid>) -> Result<Record> {
        let created = self.write(this, Operation::CreateData, record).await?;
        this.created_data(this, &created, cid)?;
        Ok(created)
    }

    async fn update_data(&self, this: &dyn Connection, record: &Record) -> Result<Record> {
        let updated = self.write(this, Operation::UpdateData, record).await?;
        this.updated_data(this, &updated)?;
        Ok(updated)
    }

    async fn destroy_data(&self, this: &dyn Connection, record: &Record) -> Result<Record> {
        let destroyed = self.write(this, Operation::DestroyData, record).await?;
        this.destroyed_data(this, &destroyed)?;
        Ok(destroyed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        behavior::{DataCallbacks, Parse},
        connection::BaseConnection,
        fixture::FixtureStore,
        query::{Predicate, Sort},
        test_helpers::{record, todo_builder, todo_store},
    };

    fn layer(store: &Arc<FixtureStore>) -> Box<dyn Connection> {
        let config = Arc::new(
            todo_builder()
                .transport(Arc::clone(store))
                .build()
                .expect("valid config"),
        );
        let conn = DataCallbacks.apply(Box::new(BaseConnection), &config);
        let conn = Parse.apply(conn, &config);
        DataUrl.apply(conn, &config)
    }

    #[tokio::test]
    async fn writes_follow_rest_conventions() {
        let store = Arc::new(todo_store());
        let conn = layer(&store);
        let created = conn
            .create_data(conn.as_ref(), &record(json!({"name": "a", "points": 1})), None)
            .await
            .expect("created");
        assert_eq!(created.get("_id"), Some(&json!(1)));

        let mut changed = created.clone();
        changed.insert("points".into(), json!(4));
        conn.update_data(conn.as_ref(), &changed).await.expect("updated");

        let destroyed = conn.destroy_data(conn.as_ref(), &changed).await.expect("destroyed");
        assert_eq!(destroyed, changed);

        let methods: Vec<Method> = store.requests().iter().map(|r| r.method).collect();
        assert_eq!(methods, [Method::Post, Method::Put, Method::Delete]);
        assert_eq!(store.requests()[1].path, "/api/todos/1");
        assert!(store.records().is_empty());
    }

    #[tokio::test]
    async fn list_queries_travel_as_bracketed_params() {
        let store = Arc::new(todo_store());
        store.create_instance(record(json!({"name": "low", "points": 1})));
        store.create_instance(record(json!({"name": "high", "points": 9})));
        let conn = layer(&store);

        let query = Query::all()
            .filter("points", Predicate::gt(2))
            .sort(Sort::desc("points"));
        let data = conn.get_list_data(conn.as_ref(), &query).await.expect("listed");
        assert_eq!(data.items.len(), 1);
        assert_eq!(data.meta.get("count"), Some(&json!(1)));
        let sent = &store.requests()[0];
        assert!(sent.query.contains(&("sort".to_string(), "-points".to_string())));
        assert!(sent.query.contains(&("filter[points][$gt]".to_string(), "2".to_string())));
    }

    #[tokio::test]
    async fn non_success_statuses_are_errors() {
        let store = Arc::new(todo_store());
        let conn = layer(&store);
        let err = conn
            .get_data(conn.as_ref(), &record(json!({"_id": 42})))
            .await
            .expect_err("missing record");
        assert!(err.is_status(404));
        assert_eq!(err.to_string(), "GET /api/todos/42 answered 404");

        let err = conn
            .get_data(conn.as_ref(), &Record::new())
            .await
            .expect_err("no identity");
        assert!(matches!(err, ConnectError::MissingIdentity(field) if field == "_id"));
    }
}
