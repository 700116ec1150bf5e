//! View and export layouts for each console page.

use std::sync::Arc;

use labgate_shared::{AccessLog, Card, ClassGroup, Lab, User};

use crate::export::SheetColumn;
use crate::stores::CollectionStore;
use crate::view::{CheckStatus, CollectionView, FilterSpec, Paginator, StatsFields};

/// Access history: lab, class, status and check-in date filters, with the
/// duration / presence stats above the table.
pub fn access_log_view(
    store: Arc<CollectionStore<AccessLog>>,
    page_size: usize,
) -> CollectionView<AccessLog> {
    let spec = FilterSpec::new()
        .exact("lab", "labName")
        .exact("class", "className")
        .status("status", "checkInAt", "checkOutAt")
        .date_range("date", "checkInAt");
    let paginator = Paginator::new(page_size, &["userName", "cardUid", "labName", "className"]);
    CollectionView::new(store, spec, paginator)
        .with_stats(StatsFields::new("checkInAt", "checkOutAt", "labName"))
}

pub fn access_log_columns() -> Vec<SheetColumn<AccessLog>> {
    vec![
        SheetColumn::field("Card UID", "cardUid"),
        SheetColumn::field("User", "userName"),
        SheetColumn::field("Lab", "labName"),
        SheetColumn::field("Class", "className"),
        SheetColumn::field("Check in", "checkInAt"),
        SheetColumn::field("Check out", "checkOutAt"),
        SheetColumn::new("Status", |log: &AccessLog| {
            CheckStatus::of(Some(log.check_in_at), log.check_out_at)
                .as_str()
                .to_string()
        }),
    ]
}

pub fn card_view(store: Arc<CollectionStore<Card>>, page_size: usize) -> CollectionView<Card> {
    let spec = FilterSpec::new()
        .exact("status", "status")
        .date_range("created", "createdAt");
    CollectionView::new(store, spec, Paginator::new(page_size, &["uid", "userName"]))
}

pub fn card_columns() -> Vec<SheetColumn<Card>> {
    vec![
        SheetColumn::field("UID", "uid"),
        SheetColumn::field("Owner", "userName"),
        SheetColumn::field("Status", "status"),
        SheetColumn::field("Created", "createdAt"),
    ]
}

pub fn user_view(store: Arc<CollectionStore<User>>, page_size: usize) -> CollectionView<User> {
    let spec = FilterSpec::new().exact("role", "role").exact("class", "classId");
    let paginator = Paginator::new(page_size, &["fullName", "email", "studentCode"]);
    CollectionView::new(store, spec, paginator)
}

pub fn lab_view(store: Arc<CollectionStore<Lab>>, page_size: usize) -> CollectionView<Lab> {
    let paginator = Paginator::new(page_size, &["name", "location"]);
    CollectionView::new(store, FilterSpec::new(), paginator)
}

pub fn class_view(
    store: Arc<CollectionStore<ClassGroup>>,
    page_size: usize,
) -> CollectionView<ClassGroup> {
    let spec = FilterSpec::new().exact("lab", "labId");
    let paginator = Paginator::new(page_size, &["name", "teacherName"]);
    CollectionView::new(store, spec, paginator)
}
