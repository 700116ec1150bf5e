//! End-to-end fetch / push / optimistic-mutation behavior over an in-memory
//! card endpoint.

mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use common::{card, cards, CardApi};
use labgate_client::presets::card_view;
use labgate_client::sync::DeleteAllOutcome;
use labgate_client::{EventRouter, ResourceSync};
use labgate_shared::{events, CardStatus};
use serde_json::json;

fn sync(api: &std::sync::Arc<CardApi>) -> std::sync::Arc<ResourceSync<labgate_shared::Card>> {
    ResourceSync::new("cards", api.clone(), Duration::from_millis(300))
}

#[tokio::test]
async fn stale_fetch_is_discarded() {
    let api = CardApi::with(Vec::new());
    let sync = sync(&api);
    let gate_a = api.gate();
    let gate_b = api.gate();
    let mut changes = sync.store().subscribe();

    let (a, b, ()) = tokio::join!(sync.refresh(), sync.refresh(), async {
        gate_b.send(cards(2)).unwrap();
        changes.changed().await.unwrap();
        gate_a.send(cards(7)).unwrap();
    });

    assert_eq!(b.unwrap(), Some(1));
    assert_eq!(a.unwrap(), None);
    assert_eq!(sync.store().len(), 2);
    assert_eq!(sync.store().generation(), 1);
}

#[tokio::test]
async fn failed_fetch_leaves_store_alone() {
    let api = CardApi::with(cards(3));
    let sync = sync(&api);
    sync.refresh().await.unwrap();

    drop(api.gate());
    assert!(sync.refresh().await.is_err());
    assert_eq!(sync.store().len(), 3);
    assert_eq!(sync.store().generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn push_for_optimistically_deleted_card_is_a_no_op() {
    let api = CardApi::with(cards(3));
    let sync = sync(&api);
    sync.refresh().await.unwrap();
    let router = EventRouter::new();
    let _patches = sync.bind_patch(&router, events::CARD_UPDATED);

    sync.mutations().delete(&2).await.unwrap();
    assert!(!sync.store().contains(&2));

    for name in ["card_updated", "CardUpdated", "CARD_UPDATED"] {
        let handled = router.dispatch(
            name,
            Some(json!({ "eventType": "updated", "data": { "id": 2, "status": "lost" } })),
        );
        assert_eq!(handled, 1);
    }
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert!(!sync.store().contains(&2));
    assert_eq!(sync.store().len(), 2);
    assert!(sync.mutations().pending().is_empty());
}

#[tokio::test]
async fn delete_all_with_filter_only_touches_filtered_cards() {
    let mut records = cards(100);
    for id in [7, 42, 99] {
        records[id as usize - 1] = card(id, CardStatus::Lost);
    }
    let api = CardApi::with(records);
    let sync = sync(&api);
    sync.refresh().await.unwrap();

    let mut view = card_view(sync.store().clone(), 15);
    view.set_filter("status", "lost");
    assert_eq!(view.filtered_ids(), vec![7, 42, 99]);

    let outcome = sync
        .mutations()
        .delete_all(view.filtered_ids(), view.filters_active())
        .await;

    assert!(outcome.is_complete());
    assert_eq!(api.deletes.lock().unwrap().len(), 3);
    assert_eq!(api.bulk_deletes.load(Ordering::SeqCst), 0);
    assert_eq!(sync.store().len(), 97);
    assert!(view.filtered_ids().is_empty());
}

#[tokio::test]
async fn delete_all_reports_partial_failure() {
    let mut records = cards(10);
    for id in [2, 4, 6] {
        records[id as usize - 1] = card(id, CardStatus::Inactive);
    }
    let api = CardApi::with(records);
    api.rejected.lock().unwrap().insert(4);
    let sync = sync(&api);
    sync.refresh().await.unwrap();

    let mut view = card_view(sync.store().clone(), 15);
    view.set_filter("status", "inactive");
    let outcome = sync
        .mutations()
        .delete_all(view.filtered_ids(), view.filters_active())
        .await;

    assert!(outcome.is_partial());
    if let DeleteAllOutcome::Batch { deleted, failed } = outcome {
        assert_eq!(deleted, vec![2, 6]);
        assert_eq!(failed[0].1.user_message(), "card is in use");
    }
    assert_eq!(view.filtered_ids(), vec![4]);
    assert_eq!(sync.store().len(), 8);
}

#[tokio::test]
async fn delete_all_without_filter_is_one_bulk_call() {
    let api = CardApi::with(cards(20));
    let sync = sync(&api);
    sync.refresh().await.unwrap();
    let mut view = card_view(sync.store().clone(), 15);

    let outcome = sync
        .mutations()
        .delete_all(view.filtered_ids(), view.filters_active())
        .await;

    assert_eq!(outcome, DeleteAllOutcome::Cleared);
    assert_eq!(api.bulk_deletes.load(Ordering::SeqCst), 1);
    assert!(api.deletes.lock().unwrap().is_empty());
    assert!(sync.store().is_empty());
}

#[tokio::test]
async fn local_delete_shrinks_pages_and_clamps() {
    let api = CardApi::with(cards(16));
    let sync = sync(&api);
    sync.refresh().await.unwrap();
    let mut view = card_view(sync.store().clone(), 15);

    assert_eq!(view.page().meta.total_pages, 2);
    assert!(view.go_to_page(2));
    assert_eq!(view.page().items.len(), 1);

    sync.mutations().delete(&16).await.unwrap();
    let page = view.page();
    assert_eq!(page.meta.total_pages, 1);
    assert_eq!(page.meta.current_page, 1);
    assert_eq!(page.items.len(), 15);
}
