//! Live instances and live lists.
//!
//! Both are cheap `Arc` handles. Cloning a handle shares the underlying
//! state, so an instance held by the application, the identity store and any
//! number of lists is one object: an update applied through the store is
//! visible everywhere. Locks inside these types are never held across an
//! `.await`.

use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        MutexGuard,
        PoisonError,
        RwLock,
        RwLockReadGuard,
        RwLockWriteGuard,
        Weak,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
};

use serde_json::Value;

use crate::{error::SchemaError, query::Query, record::Record, schema::Schema};

static NEXT_CID: AtomicU64 = AtomicU64::new(1);
static NEXT_LIST: AtomicU64 = AtomicU64::new(1);

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> { lock.read().unwrap_or_else(PoisonError::into_inner) }

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> { lock.write().unwrap_or_else(PoisonError::into_inner) }

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> { mutex.lock().unwrap_or_else(PoisonError::into_inner) }

/// Client-side identifier assigned to every instance at construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid(u64);

impl Cid {
    fn next() -> Self { Self(NEXT_CID.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "cid:{}", self.0) }
}

pub(crate) struct InstanceInner {
    cid: Cid,
    schema: Arc<Schema>,
    props: RwLock<Record>,
    destroyed: AtomicBool,
    last_callback: Mutex<Option<String>>,
}

/// Shared handle to one live record.
#[derive(Clone)]
pub struct Instance(Arc<InstanceInner>);

impl Instance {
    /// Wrap already-coerced `props`.
    pub(crate) fn new(schema: Arc<Schema>, props: Record) -> Self {
        Self(Arc::new(InstanceInner {
            cid: Cid::next(),
            schema,
            props: RwLock::new(props),
            destroyed: AtomicBool::new(false),
            last_callback: Mutex::new(None),
        }))
    }

    pub(crate) fn from_arc(inner: Arc<InstanceInner>) -> Self { Self(inner) }

    pub(crate) fn downgrade(&self) -> Weak<InstanceInner> { Arc::downgrade(&self.0) }

    /// Client id of this instance.
    #[must_use]
    pub fn cid(&self) -> Cid { self.0.cid }

    /// Schema the instance was built from.
    #[must_use]
    pub fn schema(&self) -> &Arc<Schema> { &self.0.schema }

    /// Current value of `field`.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<Value> { read(&self.0.props).get(field).cloned() }

    /// Set `field`, coercing the value through the schema.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if the value cannot be coerced.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> Result<(), SchemaError> {
        let value = self.0.schema.coerce_value(field, value.into())?;
        write(&self.0.props).insert(field.to_string(), value);
        Ok(())
    }

    /// Merge `record` into the instance, coercing every field first.
    ///
    /// Nothing is applied if any field fails.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] if a value cannot be coerced.
    pub fn assign(&self, record: Record) -> Result<(), SchemaError> {
        let record = self.0.schema.coerce(record)?;
        self.merge(record);
        Ok(())
    }

    pub(crate) fn merge(&self, record: Record) { write(&self.0.props).extend(record); }

    pub(crate) fn replace(&self, record: Record) { *write(&self.0.props) = record; }

    /// Snapshot of every field.
    #[must_use]
    pub fn serialize(&self) -> Record { read(&self.0.props).clone() }

    /// Whether the instance has been destroyed on the server.
    #[must_use]
    pub fn is_destroyed(&self) -> bool { self.0.destroyed.load(Ordering::Acquire) }

    pub(crate) fn mark_destroyed(&self) { self.0.destroyed.store(true, Ordering::Release); }

    /// Record `signature` as the latest instance callback.
    ///
    /// Returns `false` if it equals the previous one.
    pub(crate) fn note_callback(&self, signature: String) -> bool {
        let mut last = lock(&self.0.last_callback);
        if last.as_deref() == Some(signature.as_str()) {
            return false;
        }
        *last = Some(signature);
        true
    }

    /// Whether both handles refer to the same instance.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool { self.ptr_eq(other) }
}

impl Eq for Instance {}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("cid", &self.0.cid)
            .field("props", &*read(&self.0.props))
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Identifier of a live list within its connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListId(u64);

impl ListId {
    fn next() -> Self { Self(NEXT_LIST.fetch_add(1, Ordering::Relaxed)) }

    /// Return the inner `u64` representation.
    #[must_use]
    pub fn as_u64(&self) -> u64 { self.0 }
}

/// Length notification delivered to list listeners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LengthChange {
    /// Length before the change.
    pub previous: usize,
    /// Length after the change.
    pub current: usize,
}

type LengthListener = Arc<dyn Fn(LengthChange) + Send + Sync>;

pub(crate) struct ListInner {
    id: ListId,
    query: Query,
    meta: Record,
    items: RwLock<Vec<Instance>>,
    listeners: Mutex<Vec<LengthListener>>,
}

/// Shared handle to an ordered set of instances bound to a query.
#[derive(Clone)]
pub struct LiveList(Arc<ListInner>);

impl LiveList {
    pub(crate) fn new(query: Query, items: Vec<Instance>, meta: Record) -> Self {
        Self(Arc::new(ListInner {
            id: ListId::next(),
            query,
            meta,
            items: RwLock::new(items),
            listeners: Mutex::new(Vec::new()),
        }))
    }

    pub(crate) fn from_arc(inner: Arc<ListInner>) -> Self { Self(inner) }

    pub(crate) fn downgrade(&self) -> Weak<ListInner> { Arc::downgrade(&self.0) }

    /// Identifier of this list.
    #[must_use]
    pub fn id(&self) -> ListId { self.0.id }

    /// Query the list was fetched with.
    #[must_use]
    pub fn query(&self) -> &Query { &self.0.query }

    /// Envelope metadata returned with the list, such as `count`.
    #[must_use]
    pub fn meta(&self) -> &Record { &self.0.meta }

    /// Number of instances held.
    #[must_use]
    pub fn len(&self) -> usize { read(&self.0.items).len() }

    /// Whether the list holds no instances.
    #[must_use]
    pub fn is_empty(&self) -> bool { read(&self.0.items).is_empty() }

    /// Instance at `index`.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<Instance> { read(&self.0.items).get(index).cloned() }

    /// Snapshot of the held instances in order.
    #[must_use]
    pub fn instances(&self) -> Vec<Instance> { read(&self.0.items).clone() }

    /// Whether `instance` is held by this list.
    #[must_use]
    pub fn contains(&self, instance: &Instance) -> bool {
        read(&self.0.items).iter().any(|held| held.ptr_eq(instance))
    }

    /// Serialize every held instance in order.
    #[must_use]
    pub fn serialize(&self) -> Vec<Record> {
        read(&self.0.items).iter().map(Instance::serialize).collect()
    }

    /// Register a listener called whenever the length changes.
    pub fn on_length(&self, listener: impl Fn(LengthChange) + Send + Sync + 'static) {
        lock(&self.0.listeners).push(Arc::new(listener));
    }

    /// Mutate the held instances under the write lock.
    ///
    /// Listeners run after the lock is released, once, if the length differs
    /// from what it was before `f` ran.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut Vec<Instance>) -> R) -> R {
        let (result, change) = {
            let mut items = write(&self.0.items);
            let previous = items.len();
            let result = f(&mut items);
            let current = items.len();
            (result, (previous != current).then_some(LengthChange { previous, current }))
        };
        if let Some(change) = change {
            let listeners = lock(&self.0.listeners).clone();
            for listener in listeners {
                listener(change);
            }
        }
        result
    }

    /// Whether both handles refer to the same list.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool { Arc::ptr_eq(&self.0, &other.0) }
}

impl fmt::Debug for LiveList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveList")
            .field("id", &self.0.id)
            .field("query", &self.0.query)
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}
