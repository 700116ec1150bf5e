//! Per-resource record collection with a generation counter.
//!
//! A `CollectionStore` is the single owner of the last authoritative set of
//! records for one resource type. It is mutated only through its own
//! operations, and every mutation bumps a revision that dependents watch.
//!
//! Fetches take a [`FetchTicket`] before they start. A fetch whose ticket is
//! older than the last one that landed is discarded, so a slow early fetch
//! can never overwrite a newer result.

use std::collections::HashSet;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use labgate_shared::Record;
use serde_json::Value;
use tokio::sync::watch;

/// Issue order of a fetch against one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FetchTicket(u64);

struct Inner<R> {
    records: Vec<R>,
    generation: u64,
    revision: u64,
    issued: u64,
    landed: u64,
}

pub struct CollectionStore<R: Record> {
    inner: RwLock<Inner<R>>,
    changes: watch::Sender<u64>,
}

impl<R: Record> Default for CollectionStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: Record> CollectionStore<R> {
    pub fn new() -> Self {
        let (changes, _) = watch::channel(0);
        Self {
            inner: RwLock::new(Inner {
                records: Vec::new(),
                generation: 0,
                revision: 0,
                issued: 0,
                landed: 0,
            }),
            changes,
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner<R>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner<R>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self, revision: u64) {
        self.changes.send_replace(revision);
    }

    /// Receiver that yields the revision after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.changes.subscribe()
    }

    /// Number of `replace` calls applied so far.
    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Bumped on every mutation, including point patches and removals.
    pub fn revision(&self) -> u64 {
        self.read().revision
    }

    pub fn len(&self) -> usize {
        self.read().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().records.is_empty()
    }

    pub fn contains(&self, id: &R::Id) -> bool {
        self.read().records.iter().any(|r| &r.id() == id)
    }

    pub fn get(&self, id: &R::Id) -> Option<R> {
        self.read().records.iter().find(|r| &r.id() == id).cloned()
    }

    /// Copy of the current records, in order.
    pub fn snapshot(&self) -> Vec<R> {
        self.read().records.clone()
    }

    /// Run `f` against the current records without cloning them.
    pub fn with_records<T>(&self, f: impl FnOnce(&[R]) -> T) -> T {
        f(&self.read().records)
    }

    /// Like [`with_records`](Self::with_records), also passing the revision
    /// the records belong to.
    pub fn with_revision<T>(&self, f: impl FnOnce(u64, &[R]) -> T) -> T {
        let inner = self.read();
        f(inner.revision, &inner.records)
    }

    /// Swap in a new authoritative set. Duplicate identities keep their
    /// first occurrence. Returns the new generation.
    pub fn replace(&self, records: Vec<R>) -> u64 {
        let records = dedup(records);
        let (generation, revision) = {
            let mut inner = self.write();
            inner.records = records;
            inner.generation += 1;
            inner.revision += 1;
            (inner.generation, inner.revision)
        };
        self.notify(revision);
        generation
    }

    /// Reserve a ticket for a fetch that is about to be issued.
    pub fn begin_fetch(&self) -> FetchTicket {
        let mut inner = self.write();
        inner.issued += 1;
        FetchTicket(inner.issued)
    }

    /// Apply a fetch result unless a fetch issued later has already landed.
    /// Returns the new generation, or `None` when the result was stale.
    pub fn replace_from_fetch(&self, ticket: FetchTicket, records: Vec<R>) -> Option<u64> {
        let records = dedup(records);
        let (generation, revision) = {
            let mut inner = self.write();
            if ticket.0 <= inner.landed {
                crate::log_debug!(
                    "discarding stale fetch #{} (#{} already landed)",
                    ticket.0,
                    inner.landed
                );
                return None;
            }
            inner.landed = ticket.0;
            inner.records = records;
            inner.generation += 1;
            inner.revision += 1;
            (inner.generation, inner.revision)
        };
        self.notify(revision);
        Some(generation)
    }

    /// Merge the fields of a JSON object into the matching record.
    ///
    /// No-op when the identity is absent, the patch is not an object, the
    /// merged record no longer validates, or nothing changed. Attempts to
    /// change the identity are ignored.
    pub fn patch_one(&self, id: &R::Id, partial: &Value) -> bool {
        let Some(fields) = partial.as_object() else {
            return false;
        };
        let revision = {
            let mut inner = self.write();
            let Some(slot) = inner.records.iter_mut().find(|r| &r.id() == id) else {
                return false;
            };
            let Ok(Value::Object(mut merged)) = serde_json::to_value(&*slot) else {
                return false;
            };
            let before = merged.clone();
            for (key, value) in fields {
                merged.insert(key.clone(), value.clone());
            }
            if merged == before {
                return false;
            }
            let patched = match serde_json::from_value::<R>(Value::Object(merged)) {
                Ok(patched) => patched,
                Err(e) => {
                    crate::log_warn!("ignoring patch for {}: {}", id, e);
                    return false;
                }
            };
            if &patched.id() != id {
                crate::log_warn!("ignoring patch that changes identity of {}", id);
                return false;
            }
            *slot = patched;
            inner.revision += 1;
            inner.revision
        };
        self.notify(revision);
        true
    }

    /// Apply a typed in-place update to the matching record.
    pub fn update_one(&self, id: &R::Id, f: impl FnOnce(&mut R)) -> bool {
        let revision = {
            let mut inner = self.write();
            let Some(slot) = inner.records.iter_mut().find(|r| &r.id() == id) else {
                return false;
            };
            let mut updated = slot.clone();
            f(&mut updated);
            if &updated.id() != id {
                crate::log_warn!("ignoring update that changes identity of {}", id);
                return false;
            }
            *slot = updated;
            inner.revision += 1;
            inner.revision
        };
        self.notify(revision);
        true
    }

    pub fn remove_one(&self, id: &R::Id) -> bool {
        let revision = {
            let mut inner = self.write();
            let before = inner.records.len();
            inner.records.retain(|r| &r.id() != id);
            if inner.records.len() == before {
                return false;
            }
            inner.revision += 1;
            inner.revision
        };
        self.notify(revision);
        true
    }

    pub fn remove_all(&self) {
        let revision = {
            let mut inner = self.write();
            if inner.records.is_empty() {
                return;
            }
            inner.records.clear();
            inner.revision += 1;
            inner.revision
        };
        self.notify(revision);
    }
}

fn dedup<R: Record>(records: Vec<R>) -> Vec<R> {
    let mut seen = HashSet::with_capacity(records.len());
    let total = records.len();
    let unique: Vec<R> = records.into_iter().filter(|r| seen.insert(r.id())).collect();
    if unique.len() != total {
        crate::log_warn!(
            "dropped {} records with duplicate identities",
            total - unique.len()
        );
    }
    unique
}
