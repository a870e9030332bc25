//! In-memory REST store used as a transport in tests and examples.
//!
//! [`FixtureStore`] answers the conventional routes derived from a URL
//! template: list and create on the collection path, read, update and delete
//! on the resource path. List requests are filtered, sorted and paged with
//! the same [`QueryLogic`] the connection uses, and answered with a
//! `{data, count}` envelope.

use std::{
    collections::VecDeque,
    sync::{
        Mutex,
        MutexGuard,
        PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::trace;

use crate::{
    config::DEFAULT_LIST_PROP,
    connection::Operation,
    error::{ConfigError, TransportError},
    query::{Query, QueryLogic},
    record::{IdentityKey, Record},
    transport::{Transport, TransportRequest, TransportResponse},
    url::{Method, Routes, UrlTemplate},
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

fn error(status: u16, message: impl Into<String>) -> TransportResponse {
    TransportResponse::with_status(status, json!({ "message": message.into() }))
}

/// An in-memory server for one resource.
pub struct FixtureStore {
    logic: QueryLogic,
    collection: UrlTemplate,
    resource: UrlTemplate,
    list_prop: String,
    records: Mutex<Vec<Record>>,
    next_id: AtomicU64,
    requests: Mutex<Vec<TransportRequest>>,
    failures: Mutex<VecDeque<u16>>,
    latency: Option<Duration>,
}

impl FixtureStore {
    /// Serve the routes derived from `url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] for a malformed template.
    pub fn new(url: &str, logic: QueryLogic) -> Result<Self, ConfigError> {
        let routes = Routes::from_template(url, logic.identity_fields(), Method::Put)?;
        let template = |operation| {
            routes
                .route(operation)
                .map(|route| route.template().clone())
                .ok_or(ConfigError::InvalidUrl {
                    url: url.to_string(),
                    reason: "no route for operation",
                })
        };
        Ok(Self {
            collection: template(Operation::GetListData)?,
            resource: template(Operation::GetData)?,
            logic,
            list_prop: DEFAULT_LIST_PROP.to_string(),
            records: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            requests: Mutex::new(Vec::new()),
            failures: Mutex::new(VecDeque::new()),
            latency: None,
        })
    }

    /// Delay every response by `latency`.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Answer lists under `prop` instead of `data`.
    #[must_use]
    pub fn with_list_prop(mut self, prop: impl Into<String>) -> Self {
        self.list_prop = prop.into();
        self
    }

    /// Answer the next request with `status` instead of serving it.
    pub fn fail_next(&self, status: u16) { lock(&self.failures).push_back(status); }

    /// Insert a record on the server side, assigning an identity if it has
    /// none. Returns the stored record.
    pub fn create_instance(&self, record: Record) -> Record {
        let record = self.logic.schema().coerce(record.clone()).unwrap_or(record);
        let record = self.assign_identity(record);
        lock(&self.records).push(record.clone());
        record
    }

    /// Merge `record` into the stored record with the same identity on the
    /// server side. Returns the stored result, or `None` if there is none.
    pub fn update_instance(&self, record: Record) -> Option<Record> {
        let record = self.logic.schema().coerce(record.clone()).unwrap_or(record);
        let key = self.logic.identity(&record)?;
        let mut records = lock(&self.records);
        let stored = records
            .iter_mut()
            .find(|stored| self.logic.identity(stored).as_ref() == Some(&key))?;
        stored.extend(record);
        Some(stored.clone())
    }

    /// Snapshot of the stored records in insertion order.
    #[must_use]
    pub fn records(&self) -> Vec<Record> { lock(&self.records).clone() }

    /// Requests received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<TransportRequest> { lock(&self.requests).clone() }

    /// Number of requests received so far.
    #[must_use]
    pub fn request_count(&self) -> usize { lock(&self.requests).len() }

    fn assign_identity(&self, mut record: Record) -> Record {
        if let [field] = self.logic.identity_fields() {
            match record.get(field) {
                None | Some(Value::Null) => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    record.insert(field.clone(), Value::from(id));
                }
                Some(value) => {
                    if let Some(id) = value.as_u64() {
                        self.next_id.fetch_max(id.saturating_add(1), Ordering::Relaxed);
                    }
                }
            }
        }
        record
    }

    fn position(&self, records: &[Record], key: &IdentityKey) -> Option<usize> {
        records
            .iter()
            .position(|stored| self.logic.identity(stored).as_ref() == Some(key))
    }

    fn list(&self, request: &TransportRequest) -> TransportResponse {
        let query = match Query::from_params(request.query.iter().map(|(k, v)| (k.as_str(), v.as_str()))) {
            Ok(query) => query,
            Err(err) => return error(400, err.to_string()),
        };
        let query = match self.logic.normalize(&query) {
            Ok(query) => query,
            Err(err) => return error(400, err.to_string()),
        };
        let records = lock(&self.records);
        let (items, count) = self.logic.apply(&query, records.iter());
        let items: Vec<Value> = items.into_iter().map(Value::Object).collect();
        let mut body = Record::new();
        body.insert(self.list_prop.clone(), Value::Array(items));
        body.insert("count".into(), Value::from(count));
        TransportResponse::ok(Value::Object(body))
    }

    fn create(&self, body: Option<&Value>) -> TransportResponse {
        let Some(Value::Object(record)) = body else {
            return error(400, "expected a JSON object body");
        };
        let record = match self.logic.schema().coerce(record.clone()) {
            Ok(record) => self.assign_identity(record),
            Err(err) => return error(400, err.to_string()),
        };
        let Some(key) = self.logic.identity(&record) else {
            return error(400, "record has no identity");
        };
        let mut records = lock(&self.records);
        if self.position(&records, &key).is_some() {
            return error(409, format!("record {key} already exists"));
        }
        records.push(record.clone());
        TransportResponse::with_status(201, Value::Object(record))
    }

    fn item(&self, request: &TransportRequest, captures: &Record) -> TransportResponse {
        let Some(key) = self.logic.identity(captures) else {
            return error(400, "path has no identity");
        };
        let mut records = lock(&self.records);
        let Some(at) = self.position(&records, &key) else {
            return error(404, format!("no record {key}"));
        };
        match request.method {
            Method::Get => TransportResponse::ok(Value::Object(records[at].clone())),
            Method::Put | Method::Patch => {
                let Some(Value::Object(record)) = &request.body else {
                    return error(400, "expected a JSON object body");
                };
                let mut record = match self.logic.schema().coerce(record.clone()) {
                    Ok(record) => record,
                    Err(err) => return error(400, err.to_string()),
                };
                let stored = &mut records[at];
                if request.method == Method::Patch {
                    stored.extend(record);
                } else {
                    for field in self.logic.identity_fields() {
                        if let Some(value) = stored.get(field) {
                            record.insert(field.clone(), value.clone());
                        }
                    }
                    *stored = record;
                }
                TransportResponse::ok(Value::Object(stored.clone()))
            }
            Method::Delete => {
                records.remove(at);
                TransportResponse::with_status(204, Value::Null)
            }
            Method::Post => error(405, "cannot post to a resource"),
        }
    }
}

#[async_trait]
impl Transport for FixtureStore {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse, TransportError> {
        trace!(request = %request, "fixture request");
        lock(&self.requests).push(request.clone());
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if let Some(status) = lock(&self.failures).pop_front() {
            return Ok(error(status, "injected failure"));
        }
        let response = if let Some(captures) = self.resource.matches(&request.path) {
            self.item(&request, &captures)
        } else if self.collection.matches(&request.path).is_some() {
            match request.method {
                Method::Get => self.list(&request),
                Method::Post => self.create(request.body.as_ref()),
                _ => error(405, "method not allowed on the collection"),
            }
        } else {
            error(404, format!("no route for {}", request.path))
        };
        Ok(response)
    }
}
