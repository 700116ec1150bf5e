//! Derived views over a [`CollectionStore`].
//!
//! Nothing here is stored independently: every filtered set, page and
//! aggregate is recomputed from the store's current records and the view's
//! filter and pagination state. The filtered set is memoized per store
//! revision and filter snapshot, which only saves work and never changes a
//! result.

pub mod filter;
pub mod pagination;
pub mod stats;

use std::collections::BTreeMap;
use std::sync::Arc;

use labgate_shared::Record;

use crate::export::{build_sheet, Sheet, SheetColumn};
use crate::stores::CollectionStore;

pub use filter::{CheckStatus, FilterSpec, FilterState, MatchRule};
pub use pagination::{PageMeta, PageView, PaginationState, Paginator};
pub use stats::{AccessStats, StatsFields};

struct Memo<R> {
    revision: u64,
    filters: FilterState,
    records: Vec<R>,
}

/// Everything a page renders, computed in one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewSnapshot<R> {
    pub page: PageView<R>,
    pub stats: Option<AccessStats>,
    pub options: BTreeMap<String, Vec<String>>,
    pub filters: FilterState,
}

pub struct CollectionView<R: Record> {
    store: Arc<CollectionStore<R>>,
    spec: FilterSpec,
    filters: FilterState,
    paginator: Paginator,
    stats_fields: Option<StatsFields>,
    memo: Option<Memo<R>>,
}

impl<R: Record> CollectionView<R> {
    pub fn new(store: Arc<CollectionStore<R>>, spec: FilterSpec, paginator: Paginator) -> Self {
        Self {
            store,
            spec,
            filters: FilterState::default(),
            paginator,
            stats_fields: None,
            memo: None,
        }
    }

    pub fn with_stats(mut self, fields: StatsFields) -> Self {
        self.stats_fields = Some(fields);
        self
    }

    pub fn store(&self) -> &Arc<CollectionStore<R>> {
        &self.store
    }

    // --- filtering ---

    pub fn filter_state(&self) -> &FilterState {
        &self.filters
    }

    /// Replace the filter snapshot with one dimension changed. Any change
    /// returns the view to page 1.
    pub fn set_filter(&mut self, dimension: &str, value: &str) {
        let next = self.filters.with(dimension, value);
        if next != self.filters {
            self.filters = next;
            self.paginator.reset_page();
        }
    }

    pub fn clear_filters(&mut self) {
        if self.filters.is_active() {
            self.filters = FilterState::default();
            self.paginator.reset_page();
        }
    }

    pub fn filters_active(&self) -> bool {
        self.filters.is_active()
    }

    /// Dropdown options for the exact-match dimensions, from the full collection.
    pub fn options(&self) -> BTreeMap<String, Vec<String>> {
        self.store.with_records(|records| self.spec.options(records))
    }

    fn memo_is_fresh(&self, revision: u64) -> bool {
        self.memo
            .as_ref()
            .is_some_and(|m| m.revision == revision && m.filters == self.filters)
    }

    fn refresh_memo(&mut self) {
        let recomputed = self.store.with_revision(|revision, records| {
            (!self.memo_is_fresh(revision)).then(|| (revision, self.spec.apply(records, &self.filters)))
        });
        if let Some((revision, records)) = recomputed {
            self.install(revision, records);
        }
    }

    fn install(&mut self, revision: u64, records: Vec<R>) {
        self.memo = Some(Memo {
            revision,
            filters: self.filters.clone(),
            records,
        });
    }

    fn filtered_slice(&mut self) -> &[R] {
        self.refresh_memo();
        self.memo.as_ref().map(|m| m.records.as_slice()).unwrap_or(&[])
    }

    /// The filtered set, before search and pagination.
    pub fn filtered(&mut self) -> Vec<R> {
        self.filtered_slice().to_vec()
    }

    pub fn filtered_ids(&mut self) -> Vec<R::Id> {
        self.filtered_slice().iter().map(|r| r.id()).collect()
    }

    // --- paging ---

    pub fn pagination(&self) -> &PaginationState {
        self.paginator.state()
    }

    pub fn set_search_term(&mut self, term: &str) {
        self.paginator.set_search_term(term);
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        self.paginator.set_page_size(page_size);
    }

    pub fn go_to_page(&mut self, n: usize) -> bool {
        self.page();
        self.paginator.go_to_page(n)
    }

    pub fn next_page(&mut self) -> bool {
        self.page();
        self.paginator.next_page()
    }

    pub fn prev_page(&mut self) -> bool {
        self.page();
        self.paginator.prev_page()
    }

    /// Visible rows plus page metadata. Clamps the current page as part of
    /// the same derivation.
    pub fn page(&mut self) -> PageView<R> {
        self.refresh_memo();
        let filtered = self.memo.as_ref().map(|m| m.records.as_slice()).unwrap_or(&[]);
        self.paginator.derive(filtered)
    }

    // --- aggregates ---

    pub fn stats(&mut self) -> Option<AccessStats> {
        let fields = self.stats_fields.clone()?;
        Some(stats::aggregate(self.filtered_slice(), &fields))
    }

    /// Page, stats and options from one consistent read of the store.
    pub fn snapshot(&mut self) -> ViewSnapshot<R> {
        let (revision, recomputed, options) = self.store.with_revision(|revision, records| {
            let recomputed =
                (!self.memo_is_fresh(revision)).then(|| self.spec.apply(records, &self.filters));
            (revision, recomputed, self.spec.options(records))
        });
        if let Some(records) = recomputed {
            self.install(revision, records);
        }

        let filtered = self.memo.as_ref().map(|m| m.records.as_slice()).unwrap_or(&[]);
        let page = self.paginator.derive(filtered);
        let stats = self
            .stats_fields
            .as_ref()
            .map(|fields| stats::aggregate(filtered, fields));
        ViewSnapshot {
            page,
            stats,
            options,
            filters: self.filters.clone(),
        }
    }

    /// Export always works from the filtered, unpaginated set.
    pub fn export(&mut self, columns: &[SheetColumn<R>]) -> Sheet {
        build_sheet(self.filtered_slice(), columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use labgate_shared::time::parse_timestamp;
    use labgate_shared::AccessLog;

    fn log(id: i64, lab_id: i64) -> AccessLog {
        AccessLog {
            id,
            card_uid: format!("UID{id}"),
            user_id: None,
            user_name: Some(format!("user {id}")),
            lab_id,
            lab_name: Some(format!("Lab {lab_id}")),
            class_id: None,
            class_name: None,
            check_in_at: parse_timestamp("2024-05-10T08:00:00").unwrap(),
            check_out_at: parse_timestamp("2024-05-10T09:00:00"),
        }
    }

    fn view(store: Arc<CollectionStore<AccessLog>>) -> CollectionView<AccessLog> {
        CollectionView::new(
            store,
            FilterSpec::new().exact("lab", "labId"),
            Paginator::new(15, &["userName", "cardUid"]),
        )
        .with_stats(StatsFields::new("checkInAt", "checkOutAt", "labName"))
    }

    #[test]
    fn deleting_last_row_of_page_two_clamps_to_page_one() {
        let store = Arc::new(CollectionStore::new());
        store.replace((1..=16).map(|id| log(id, 1)).collect());
        let mut view = view(store.clone());

        assert_eq!(view.page().meta.total_pages, 2);
        assert!(view.go_to_page(2));

        store.remove_one(&16);
        let page = view.page();
        assert_eq!(page.meta.total_pages, 1);
        assert_eq!(page.meta.current_page, 1);
        assert_eq!(page.items.len(), 15);
    }

    #[test]
    fn filter_change_returns_to_first_page() {
        let store = Arc::new(CollectionStore::new());
        store.replace((1..=40).map(|id| log(id, id % 2)).collect());
        let mut view = view(store);

        assert!(view.go_to_page(2));
        view.set_filter("lab", "1");
        let snapshot = view.snapshot();
        assert_eq!(snapshot.page.meta.current_page, 1);
        assert_eq!(snapshot.page.meta.total_items, 20);
        assert_eq!(snapshot.stats.unwrap().total, 20);
        assert_eq!(snapshot.options["lab"], vec!["0".to_string(), "1".to_string()]);
    }

    #[test]
    fn stats_ignore_search_and_paging() {
        let store = Arc::new(CollectionStore::new());
        store.replace((1..=30).map(|id| log(id, 1)).collect());
        let mut view = view(store);

        view.set_search_term("user 3");
        let page = view.page();
        assert_eq!(page.meta.total_items, 2);
        assert_eq!(view.stats().unwrap().total, 30);
    }

    #[test]
    fn export_uses_filtered_not_paged_rows() {
        let store = Arc::new(CollectionStore::new());
        store.replace((1..=40).map(|id| log(id, id % 2)).collect());
        let mut view = view(store);
        view.set_filter("lab", "0");
        view.set_search_term("user 2");

        let sheet = view.export(&[
            SheetColumn::field("Card", "cardUid"),
            SheetColumn::new("Lab", |r: &AccessLog| r.lab_name.clone().unwrap_or_default()),
        ]);
        assert_eq!(sheet.headers, vec!["Card", "Lab"]);
        assert_eq!(sheet.rows.len(), 20);
        assert_eq!(sheet.rows[0], vec!["UID2".to_string(), "Lab 0".to_string()]);
    }

    #[test]
    fn snapshot_reads_one_revision_while_store_is_replaced() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let store = Arc::new(CollectionStore::new());
        let small: Vec<AccessLog> = (1..=10).map(|id| log(id, 1)).collect();
        let large: Vec<AccessLog> = (1..=20).map(|id| log(id, id % 2)).collect();
        store.replace(small.clone());
        let mut view = view(store.clone());
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                let mut flip = false;
                while !done.load(Ordering::Relaxed) {
                    store.replace(if flip { small.clone() } else { large.clone() });
                    flip = !flip;
                }
            });

            let seen: Vec<_> = (0..500)
                .map(|_| {
                    let snapshot = view.snapshot();
                    (
                        snapshot.page.meta.total_items,
                        snapshot.stats.map(|s| s.total),
                        snapshot.options["lab"].len(),
                    )
                })
                .collect();
            done.store(true, Ordering::Relaxed);

            for (total, stats_total, labs) in seen {
                assert_eq!(stats_total, Some(total));
                assert_eq!(labs, if total == 10 { 1 } else { 2 });
            }
        });
    }
}
