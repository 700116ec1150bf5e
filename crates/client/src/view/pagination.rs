//! Search and pagination over a filtered record set.
//!
//! [`Paginator::derive`] is the single derivation step: it applies the search
//! term, clamps the current page into range and slices the visible rows, so a
//! shrinking collection never leaves the view on a page past the end.

use labgate_shared::Record;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationState {
    pub current_page: usize,
    pub page_size: usize,
    pub search_term: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageMeta {
    pub current_page: usize,
    pub page_size: usize,
    pub total_items: usize,
    /// At least 1, even when there are no items.
    pub total_pages: usize,
    pub has_next_page: bool,
    pub has_prev_page: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PageView<R> {
    pub items: Vec<R>,
    pub meta: PageMeta,
}

/// `max(1, ceil(total_items / page_size))`.
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    total_items.div_ceil(page_size.max(1)).max(1)
}

/// Records where any of `fields` contains `term`, case-insensitively.
/// A blank term matches everything.
pub fn search<'a, R: Record>(records: &'a [R], term: &str, fields: &[String]) -> Vec<&'a R> {
    let term = term.trim().to_lowercase();
    if term.is_empty() {
        return records.iter().collect();
    }
    records
        .iter()
        .filter(|r| {
            fields.iter().any(|f| {
                r.field(f)
                    .is_some_and(|v| v.to_lowercase().contains(&term))
            })
        })
        .collect()
}

#[derive(Debug, Clone)]
pub struct Paginator {
    state: PaginationState,
    search_fields: Vec<String>,
    total_pages: usize,
}

impl Paginator {
    pub fn new(page_size: usize, search_fields: &[&str]) -> Self {
        Self {
            state: PaginationState {
                current_page: 1,
                page_size: page_size.max(1),
                search_term: String::new(),
            },
            search_fields: search_fields.iter().map(|f| f.to_string()).collect(),
            total_pages: 1,
        }
    }

    pub fn state(&self) -> &PaginationState {
        &self.state
    }

    pub fn current_page(&self) -> usize {
        self.state.current_page
    }

    /// Page count as of the last derivation.
    pub fn total_pages(&self) -> usize {
        self.total_pages
    }

    /// Always returns to page 1.
    pub fn set_search_term(&mut self, term: &str) {
        self.state.search_term = term.to_string();
        self.state.current_page = 1;
    }

    pub fn set_page_size(&mut self, page_size: usize) {
        if page_size == 0 || page_size == self.state.page_size {
            return;
        }
        self.state.page_size = page_size;
        self.state.current_page = 1;
    }

    /// Back to page 1; used when the filter selection changes.
    pub fn reset_page(&mut self) {
        self.state.current_page = 1;
    }

    /// Jump to page `n`. Outside `[1, total_pages]` this is a no-op.
    pub fn go_to_page(&mut self, n: usize) -> bool {
        if n < 1 || n > self.total_pages {
            return false;
        }
        self.state.current_page = n;
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.go_to_page(self.state.current_page + 1)
    }

    pub fn prev_page(&mut self) -> bool {
        match self.state.current_page.checked_sub(1) {
            Some(n) => self.go_to_page(n),
            None => false,
        }
    }

    /// Search, clamp and slice `filtered` in one step.
    pub fn derive<R: Record>(&mut self, filtered: &[R]) -> PageView<R> {
        let matched = search(filtered, &self.state.search_term, &self.search_fields);
        let page_size = self.state.page_size;
        let total_items = matched.len();
        let total_pages = total_pages(total_items, page_size);

        self.total_pages = total_pages;
        if self.state.current_page > total_pages {
            self.state.current_page = total_pages;
        }
        if self.state.current_page == 0 {
            self.state.current_page = 1;
        }
        let current_page = self.state.current_page;

        let start = (current_page - 1) * page_size;
        let items = matched
            .into_iter()
            .skip(start)
            .take(page_size)
            .cloned()
            .collect();

        PageView {
            items,
            meta: PageMeta {
                current_page,
                page_size,
                total_items,
                total_pages,
                has_next_page: current_page < total_pages,
                has_prev_page: current_page > 1,
            },
        }
    }
}
