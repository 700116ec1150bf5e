//! Optimistic edits and deletes.
//!
//! A mutation is applied to the [`CollectionStore`] before the request is
//! sent and tracked as a [`PendingMutation`] tagged with the store generation
//! at submission. Success clears it. Failure is reported to the caller and the
//! optimistic state is left in place; the next authoritative refresh
//! supersedes it. There is at most one pending entry per identity, so a
//! record never has two divergent local copies.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use labgate_shared::{ApiError, Record};
use serde_json::Value;

use crate::api_client::ResourceApi;
use crate::stores::CollectionStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationKind {
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingMutation<Id> {
    pub record_id: Id,
    pub kind: MutationKind,
    pub payload: Option<Value>,
    pub submitted_at_generation: u64,
    /// The server rejected it; kept until a refresh supersedes it.
    pub failed: bool,
    seq: u64,
}

/// Result of a "delete all" request.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteAllOutcome<Id> {
    /// No filters were active; one bulk delete cleared the collection.
    Cleared,
    /// The bulk delete was rejected; nothing was removed locally.
    BulkFailed(ApiError),
    /// Filters were active; one delete per filtered record.
    Batch {
        deleted: Vec<Id>,
        failed: Vec<(Id, ApiError)>,
    },
}

impl<Id> DeleteAllOutcome<Id> {
    pub fn is_complete(&self) -> bool {
        match self {
            DeleteAllOutcome::Cleared => true,
            DeleteAllOutcome::BulkFailed(_) => false,
            DeleteAllOutcome::Batch { failed, .. } => failed.is_empty(),
        }
    }

    /// Some deletes in a batch succeeded and some failed.
    pub fn is_partial(&self) -> bool {
        matches!(
            self,
            DeleteAllOutcome::Batch { deleted, failed } if !deleted.is_empty() && !failed.is_empty()
        )
    }
}

struct Pending<Id> {
    entries: HashMap<Id, PendingMutation<Id>>,
    next_seq: u64,
}

pub struct MutationCoordinator<R: Record> {
    store: Arc<CollectionStore<R>>,
    api: Arc<dyn ResourceApi<R>>,
    pending: Mutex<Pending<R::Id>>,
}

impl<R: Record> MutationCoordinator<R> {
    pub fn new(store: Arc<CollectionStore<R>>, api: Arc<dyn ResourceApi<R>>) -> Self {
        Self {
            store,
            api,
            pending: Mutex::new(Pending {
                entries: HashMap::new(),
                next_seq: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Pending<R::Id>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Currently pending mutations, in no particular order.
    pub fn pending(&self) -> Vec<PendingMutation<R::Id>> {
        self.lock().entries.values().cloned().collect()
    }

    pub fn is_pending(&self, id: &R::Id) -> bool {
        self.lock().entries.contains_key(id)
    }

    fn track(&self, id: &R::Id, kind: MutationKind, payload: Option<Value>) -> u64 {
        let generation = self.store.generation();
        let mut pending = self.lock();
        pending.next_seq += 1;
        let seq = pending.next_seq;
        let replaced = pending.entries.insert(
            id.clone(),
            PendingMutation {
                record_id: id.clone(),
                kind,
                payload,
                submitted_at_generation: generation,
                failed: false,
                seq,
            },
        );
        if replaced.is_some() {
            crate::log_debug!("superseding pending mutation for {}", id);
        }
        seq
    }

    /// Clear the entry for `id` if it is still the submission `seq`.
    fn settle(&self, id: &R::Id, seq: u64) {
        let mut pending = self.lock();
        if pending.entries.get(id).is_some_and(|p| p.seq == seq) {
            pending.entries.remove(id);
        }
    }

    fn mark_failed(&self, id: &R::Id, seq: u64) {
        let mut pending = self.lock();
        if let Some(entry) = pending.entries.get_mut(id).filter(|p| p.seq == seq) {
            entry.failed = true;
        }
    }

    /// Patch the record locally, then send the update.
    pub async fn update(&self, id: &R::Id, patch: Value) -> Result<(), ApiError> {
        self.store.patch_one(id, &patch);
        let seq = self.track(id, MutationKind::Update, Some(patch.clone()));

        match self.api.update(id, &patch).await {
            Ok(_) => {
                self.settle(id, seq);
                Ok(())
            }
            Err(e) => {
                crate::log_warn!("update of {} rejected: {}", id, e);
                self.mark_failed(id, seq);
                Err(e)
            }
        }
    }

    /// Remove the record locally, then send the delete.
    pub async fn delete(&self, id: &R::Id) -> Result<(), ApiError> {
        self.store.remove_one(id);
        let seq = self.track(id, MutationKind::Delete, None);

        match self.api.delete(id).await {
            Ok(()) => {
                self.settle(id, seq);
                Ok(())
            }
            Err(e) => {
                crate::log_warn!("delete of {} rejected: {}", id, e);
                self.mark_failed(id, seq);
                Err(e)
            }
        }
    }

    /// Delete everything the operator is looking at.
    ///
    /// With filters active, each filtered record gets its own request and is
    /// removed locally as soon as that request succeeds; failures do not stop
    /// the batch. Without filters, one bulk request clears the collection.
    pub async fn delete_all(
        &self,
        filtered_ids: Vec<R::Id>,
        filters_active: bool,
    ) -> DeleteAllOutcome<R::Id> {
        if !filters_active {
            return match self.api.delete_all().await {
                Ok(()) => {
                    self.store.remove_all();
                    self.lock().entries.clear();
                    DeleteAllOutcome::Cleared
                }
                Err(e) => {
                    crate::log_warn!("bulk delete rejected: {}", e);
                    DeleteAllOutcome::BulkFailed(e)
                }
            };
        }

        let results = join_all(filtered_ids.into_iter().map(|id| async move {
            let result = self.api.delete(&id).await;
            if result.is_ok() {
                self.store.remove_one(&id);
            }
            (id, result)
        }))
        .await;

        let mut deleted = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(()) => deleted.push(id),
                Err(e) => failed.push((id, e)),
            }
        }
        if !failed.is_empty() {
            crate::log_warn!(
                "batch delete finished partially: {} deleted, {} failed",
                deleted.len(),
                failed.len()
            );
        }
        DeleteAllOutcome::Batch { deleted, failed }
    }

    /// Called after an authoritative replace landed at `generation`.
    ///
    /// Entries submitted before it are discarded without being re-applied
    /// when their identity is gone from the new set or the server already
    /// rejected them. Entries still in flight for a present identity stay
    /// until their response settles them.
    pub fn reconcile(&self, generation: u64) {
        let store = &self.store;
        let mut pending = self.lock();
        let before = pending.entries.len();
        pending.entries.retain(|id, p| {
            p.submitted_at_generation >= generation || (!p.failed && store.contains(id))
        });
        let dropped = before - pending.entries.len();
        if dropped > 0 {
            crate::log_debug!("refresh superseded {} pending mutations", dropped);
        }
    }
}
