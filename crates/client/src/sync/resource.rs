//! Ties one resource endpoint to its [`CollectionStore`].
//!
//! `ResourceSync` owns the fetch path (generation-guarded refresh), the
//! optimistic [`MutationCoordinator`], and the push bindings that keep the
//! store current while a view is mounted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use labgate_shared::{ApiError, Record};

use crate::api_client::ResourceApi;
use crate::stores::CollectionStore;
use crate::sync::mutation::MutationCoordinator;
use crate::sync::router::{EventRouter, Handler, PushEvent, Subscription};

pub struct ResourceSync<R: Record> {
    name: String,
    store: Arc<CollectionStore<R>>,
    api: Arc<dyn ResourceApi<R>>,
    coordinator: MutationCoordinator<R>,
    debounce: Duration,
    scheduled: AtomicU64,
}

impl<R: Record> ResourceSync<R> {
    pub fn new(
        name: impl Into<String>,
        api: Arc<dyn ResourceApi<R>>,
        debounce: Duration,
    ) -> Arc<Self> {
        let store = Arc::new(CollectionStore::new());
        Arc::new(Self {
            name: name.into(),
            coordinator: MutationCoordinator::new(store.clone(), api.clone()),
            store,
            api,
            debounce,
            scheduled: AtomicU64::new(0),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn store(&self) -> &Arc<CollectionStore<R>> {
        &self.store
    }

    pub fn api(&self) -> &Arc<dyn ResourceApi<R>> {
        &self.api
    }

    pub fn mutations(&self) -> &MutationCoordinator<R> {
        &self.coordinator
    }

    /// Fetch the full collection and replace the store with it.
    ///
    /// Returns `Ok(None)` when a newer fetch landed first and this result was
    /// discarded. On error the store is left as it was.
    pub async fn refresh(&self) -> Result<Option<u64>, ApiError> {
        let ticket = self.store.begin_fetch();
        let records = match self.api.list().await {
            Ok(records) => records,
            Err(e) => {
                crate::log_warn!("fetching {} failed: {}", self.name, e);
                return Err(e);
            }
        };

        let landed = self.store.replace_from_fetch(ticket, records);
        match landed {
            Some(generation) => {
                crate::log_debug!(
                    "{} refreshed: {} records (generation {})",
                    self.name,
                    self.store.len(),
                    generation
                );
                self.coordinator.reconcile(generation);
            }
            None => crate::log_debug!("discarded stale {} fetch", self.name),
        }
        Ok(landed)
    }

    /// Queue a refresh after the debounce window. Another call inside the
    /// window replaces this one, so a burst costs a single fetch.
    pub fn schedule_refresh(self: &Arc<Self>) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Handle::try_current()?;
        let mine = self.scheduled.fetch_add(1, Ordering::SeqCst) + 1;
        let weak = Arc::downgrade(self);
        let debounce = self.debounce;

        runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            let Some(this) = weak.upgrade() else {
                return;
            };
            if this.scheduled.load(Ordering::SeqCst) != mine {
                return;
            }
            let _ = this.refresh().await;
        });
        Ok(())
    }

    /// Refetch whenever one of `events` arrives.
    pub fn bind(self: &Arc<Self>, router: &EventRouter, events: &[&str]) -> Subscription {
        let weak = Arc::downgrade(self);
        router.subscribe(
            events,
            Handler::new(move |_| match weak.upgrade() {
                Some(this) => this.schedule_refresh(),
                None => Ok(()),
            }),
        )
    }

    /// Apply `data` of a payload-bearing event as a point patch to the record
    /// it names. Events without a usable id or `data` fall back to a refetch.
    /// Events naming a record the store does not hold are ignored, so a
    /// locally deleted record is not brought back.
    pub fn bind_patch(self: &Arc<Self>, router: &EventRouter, events: &[&str]) -> Subscription {
        let weak = Arc::downgrade(self);
        router.subscribe(
            events,
            Handler::new(move |event| with_live(&weak, |this| this.apply_patch(event))),
        )
    }

    /// Remove the record named by `data.id`, then refetch.
    pub fn bind_remove(self: &Arc<Self>, router: &EventRouter, events: &[&str]) -> Subscription {
        let weak = Arc::downgrade(self);
        router.subscribe(
            events,
            Handler::new(move |event| {
                with_live(&weak, |this| {
                    if let Some(id) = event.record_id::<R::Id>() {
                        this.store.remove_one(&id);
                    }
                    this.schedule_refresh()
                })
            }),
        )
    }

    fn apply_patch(self: &Arc<Self>, event: &PushEvent) -> anyhow::Result<()> {
        let (Some(id), Some(data)) = (event.record_id::<R::Id>(), event.data()) else {
            return self.schedule_refresh();
        };
        if self.store.contains(&id) {
            self.store.patch_one(&id, data);
            Ok(())
        } else {
            crate::log_debug!("{} push for unknown record {}, ignoring", self.name, id);
            Ok(())
        }
    }
}

fn with_live<T>(
    weak: &Weak<T>,
    f: impl FnOnce(Arc<T>) -> anyhow::Result<()>,
) -> anyhow::Result<()> {
    match weak.upgrade() {
        Some(this) => f(this),
        None => Ok(()),
    }
}
