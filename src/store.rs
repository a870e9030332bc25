//! Identity store and list registry.
//!
//! Both tables hold non-owning weak references. An instance or list stays
//! reachable through the store only while the application holds a handle to
//! it; dead entries are pruned lazily at lookup time or explicitly with
//! `prune`.

use std::sync::Weak;

use dashmap::{DashMap, mapref::entry::Entry};

use crate::{
    instance::{Cid, Instance, InstanceInner, ListId, ListInner, LiveList},
    record::IdentityKey,
};

/// One live instance per identity, plus instances awaiting an identity.
#[derive(Default)]
pub struct InstanceStore {
    by_identity: DashMap<IdentityKey, Weak<InstanceInner>>,
    pending: DashMap<Cid, Weak<InstanceInner>>,
}

impl InstanceStore {
    /// Retrieve the live instance for `key`, if any.
    pub fn get(&self, key: &IdentityKey) -> Option<Instance> {
        let guard = self.by_identity.get(key);
        let inner = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if inner.is_none() {
            self.by_identity
                .remove_if(key, |_, weak| weak.strong_count() == 0);
        }
        inner.map(Instance::from_arc)
    }

    /// Index `instance` under `key`, replacing any previous entry.
    pub fn insert(&self, key: IdentityKey, instance: &Instance) {
        self.by_identity.insert(key, instance.downgrade());
    }

    /// Return the live instance for `key`, storing `candidate` if there is
    /// none. The flag is `true` when an existing instance was returned.
    pub fn resolve(&self, key: IdentityKey, candidate: &Instance) -> (Instance, bool) {
        match self.by_identity.entry(key) {
            Entry::Occupied(mut entry) => {
                if let Some(inner) = entry.get().upgrade() {
                    return (Instance::from_arc(inner), true);
                }
                entry.insert(candidate.downgrade());
            }
            Entry::Vacant(entry) => {
                entry.insert(candidate.downgrade());
            }
        }
        (candidate.clone(), false)
    }

    /// Drop the entry for `key`.
    pub fn remove(&self, key: &IdentityKey) { self.by_identity.remove(key); }

    /// Drop the entry for `key` if it refers to `instance`.
    pub fn remove_instance(&self, key: &IdentityKey, instance: &Instance) {
        let target = instance.downgrade();
        self.by_identity
            .remove_if(key, |_, weak| weak.ptr_eq(&target) || weak.strong_count() == 0);
    }

    /// Track an instance that has no identity yet.
    pub fn track(&self, instance: &Instance) { self.pending.insert(instance.cid(), instance.downgrade()); }

    /// Instance tracked under `cid`, if it is still alive.
    pub fn pending(&self, cid: Cid) -> Option<Instance> {
        let guard = self.pending.get(&cid);
        let inner = guard.as_ref().and_then(|weak| weak.upgrade());
        drop(guard);
        if inner.is_none() {
            self.pending.remove(&cid);
        }
        inner.map(Instance::from_arc)
    }

    /// Stop tracking `cid`.
    pub fn untrack(&self, cid: Cid) { self.pending.remove(&cid); }

    /// Remove every entry whose instance has been dropped.
    pub fn prune(&self) {
        self.by_identity.retain(|_, weak| weak.strong_count() > 0);
        self.pending.retain(|_, weak| weak.strong_count() > 0);
    }

    /// Number of identified entries, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.by_identity.len() }

    /// Whether no identified entries are held.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.by_identity.is_empty() }
}

/// Registry of lists that real-time updates must keep current.
#[derive(Default)]
pub struct ListStore(DashMap<ListId, Weak<ListInner>>);

impl ListStore {
    /// Register `list`.
    pub fn insert(&self, list: &LiveList) { self.0.insert(list.id(), list.downgrade()); }

    /// Stop tracking a list.
    pub fn remove(&self, id: ListId) { self.0.remove(&id); }

    /// Remove every entry whose list has been dropped.
    pub fn prune(&self) { self.0.retain(|_, weak| weak.strong_count() > 0); }

    /// Prune dropped lists, then collect the live ones.
    #[must_use]
    pub fn active_lists(&self) -> Vec<LiveList> {
        let mut lists = Vec::with_capacity(self.0.len());
        self.0.retain(|_, weak| {
            if let Some(inner) = weak.upgrade() {
                lists.push(LiveList::from_arc(inner));
                true
            } else {
                false
            }
        });
        lists.sort_by_key(LiveList::id);
        lists
    }

    /// Number of registered lists, live or not yet pruned.
    #[must_use]
    pub fn len(&self) -> usize { self.0.len() }

    /// Whether no lists are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
}
