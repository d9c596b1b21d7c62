//! Bounded result windows.

use serde::Serialize;

/// A validated 1-based page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PageRequest {
    pub page: i64,
    pub size: i64,
}

impl PageRequest {
    /// Zero-based row offset of this window.
    pub(crate) fn offset(&self) -> i64 {
        (self.page - 1) * self.size
    }
}

/// One page of results plus the total count across all pages.
///
/// The total counts distinct root entities, independent of any join
/// fan-out the page's eager loads produced.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    items: Vec<T>,
    page: i64,
    page_size: i64,
    total: u64,
}

impl<T> Page<T> {
    pub(crate) fn new(items: Vec<T>, page: i64, page_size: i64, total: u64) -> Self {
        debug_assert!(items.len() as i64 <= page_size);
        debug_assert!(total >= items.len() as u64);
        Self {
            items,
            page,
            page_size,
            total,
        }
    }

    /// Items in this window, in query order.
    pub fn items(&self) -> &[T] {
        &self.items
    }

    /// Consume the page, keeping the items.
    pub fn into_items(self) -> Vec<T> {
        self.items
    }

    /// The 1-based page number that was requested.
    pub fn page(&self) -> i64 {
        self.page
    }

    /// The requested page size (the window bound, not the item count).
    pub fn page_size(&self) -> i64 {
        self.page_size
    }

    /// Total distinct root entities across all pages.
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Number of pages the total spans.
    pub fn page_count(&self) -> u64 {
        self.total.div_ceil(self.page_size as u64)
    }
}

impl<T> IntoIterator for Page<T> {
    type Item = T;
    type IntoIter = std::vec::IntoIter<T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}
