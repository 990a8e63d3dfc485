//! Offset pagination utilities.

use serde::Serialize;

/// Default page size when the client does not ask for one.
pub const DEFAULT_PER_PAGE: i64 = 50;

/// Upper bound on the page size a client may request.
pub const MAX_PER_PAGE: i64 = 200;

/// A normalized page request. `page` is 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: i64,
    pub per_page: i64,
}

impl PageRequest {
    /// Builds a page request from optional query values, clamping out-of-range input.
    pub fn from_query(page: Option<i64>, per_page: Option<i64>) -> Self {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE);
        Self { page, per_page }
    }

    /// Number of items to skip.
    pub fn offset(&self) -> usize {
        let skipped = (self.page - 1).saturating_mul(self.per_page);
        usize::try_from(skipped).unwrap_or(usize::MAX)
    }

    pub fn limit(&self) -> usize {
        self.per_page as usize
    }

    /// Slices an already-materialized list into the requested page.
    pub fn apply<T>(&self, items: Vec<T>) -> Page<T> {
        let total = items.len() as i64;
        let data: Vec<T> = items
            .into_iter()
            .skip(self.offset())
            .take(self.limit())
            .collect();
        Page {
            data,
            pagination: Pagination::new(*self, total),
        }
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::from_query(None, None)
    }
}

/// Pagination info for list responses.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Pagination {
    pub page: i64,
    pub per_page: i64,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(request: PageRequest, total: i64) -> Self {
        let total_pages = if total == 0 {
            0
        } else {
            (total + request.per_page - 1) / request.per_page
        };
        Self {
            page: request.page,
            per_page: request.per_page,
            total,
            total_pages,
        }
    }
}

/// A page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let req = PageRequest::from_query(None, None);
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, DEFAULT_PER_PAGE);
        assert_eq!(req.offset(), 0);
    }

    #[test]
    fn test_clamps_out_of_range_values() {
        let req = PageRequest::from_query(Some(0), Some(10_000));
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, MAX_PER_PAGE);

        let req = PageRequest::from_query(Some(-3), Some(0));
        assert_eq!(req.page, 1);
        assert_eq!(req.per_page, 1);
    }

    #[test]
    fn test_apply_slices_and_counts() {
        let req = PageRequest::from_query(Some(2), Some(3));
        let page = req.apply((1..=8).collect::<Vec<_>>());

        assert_eq!(page.data, vec![4, 5, 6]);
        assert_eq!(page.pagination.total, 8);
        assert_eq!(page.pagination.total_pages, 3);
    }

    #[test]
    fn test_apply_past_the_end_is_empty() {
        let req = PageRequest::from_query(Some(5), Some(10));
        let page = req.apply(vec!["a", "b"]);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.total_pages, 1);
    }

    #[test]
    fn test_huge_page_number_yields_empty_page() {
        let req = PageRequest::from_query(Some(i64::MAX), Some(MAX_PER_PAGE));
        assert!(req.offset() > u32::MAX as usize);

        let page = req.apply(vec![1, 2, 3]);
        assert!(page.data.is_empty());
        assert_eq!(page.pagination.page, i64::MAX);
        assert_eq!(page.pagination.total, 3);
    }

    #[test]
    fn test_empty_total_has_no_pages() {
        let page = PageRequest::default().apply(Vec::<u8>::new());
        assert_eq!(page.pagination.total_pages, 0);
    }
}
