//! Pagination and query result envelopes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Hard cap on the number of records a single page may return.
pub const MAX_RESULTS: u32 = 100;

/// Page size used when the caller does not ask for one.
pub const DEFAULT_PER_PAGE: u32 = 25;

/// Errors raised for malformed pagination requests.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PaginationError {
    #[error("page must be at least 1 (got {0})")]
    InvalidPage(u32),

    #[error("perPage must be at least 1 (got {0})")]
    InvalidPerPage(u32),
}

/// A requested page, 1-based.
///
/// `per_page` is always within `1..=max_results`; larger requests are capped
/// when the value is built, so the capped size is what callers see echoed
/// back in [`PaginationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: DEFAULT_PER_PAGE,
        }
    }
}

impl Pagination {
    /// Build a page request using the default [`MAX_RESULTS`] cap.
    pub fn new(page: u32, per_page: u32) -> Result<Self, PaginationError> {
        Self::with_max(page, per_page, MAX_RESULTS)
    }

    /// Build a page request with an explicit cap.
    pub fn with_max(page: u32, per_page: u32, max_results: u32) -> Result<Self, PaginationError> {
        if page < 1 {
            return Err(PaginationError::InvalidPage(page));
        }
        if per_page < 1 {
            return Err(PaginationError::InvalidPerPage(per_page));
        }

        Ok(Self {
            page,
            per_page: per_page.min(max_results.max(1)),
        })
    }

    /// Build a page request from optional query parameters.
    pub fn from_query(
        page: Option<u32>,
        per_page: Option<u32>,
        default_per_page: u32,
        max_results: u32,
    ) -> Result<Self, PaginationError> {
        Self::with_max(
            page.unwrap_or(1),
            per_page.unwrap_or(default_per_page),
            max_results,
        )
    }

    /// Number of items preceding this page.
    pub fn skip(&self) -> usize {
        (self.page.saturating_sub(1) as usize) * self.per_page as usize
    }

    /// Maximum number of items on this page.
    pub fn limit(&self) -> usize {
        self.per_page as usize
    }

    /// Slice an already ordered collection down to this page.
    pub fn apply<T: Clone>(&self, items: &[T]) -> Vec<T> {
        items
            .iter()
            .skip(self.skip())
            .take(self.limit())
            .cloned()
            .collect()
    }
}

/// Ordering direction reported back to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Sorting metadata. Audit trails are always newest first.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sorting {
    pub sort_by: String,
    pub order: SortOrder,
}

impl Default for Sorting {
    fn default() -> Self {
        Self {
            sort_by: "createdAt".to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Pagination metadata echoed alongside a page of results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginationResult {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u64,
}

impl PaginationResult {
    pub fn new(pagination: Pagination, total_items: u64) -> Self {
        Self {
            page: pagination.page,
            per_page: pagination.per_page,
            total_items,
            total_pages: total_items.div_ceil(u64::from(pagination.per_page)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryMeta {
    pub pagination: PaginationResult,
    pub sorting: Sorting,
}

/// Response shape for audit queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditQueryResult<T> {
    pub audit_records: Vec<T>,
    pub meta: QueryMeta,
}

impl<T> AuditQueryResult<T> {
    pub fn new(audit_records: Vec<T>, total_items: u64, pagination: Pagination) -> Self {
        Self {
            audit_records,
            meta: QueryMeta {
                pagination: PaginationResult::new(pagination, total_items),
                sorting: Sorting::default(),
            },
        }
    }

    pub fn total_items(&self) -> u64 {
        self.meta.pagination.total_items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_per_page_is_capped() {
        let pagination = Pagination::new(1, 500).unwrap();
        assert_eq!(pagination.per_page, MAX_RESULTS);

        let result = PaginationResult::new(pagination, 250);
        assert_eq!(result.per_page, 100);
        assert_eq!(result.total_pages, 3);
    }

    #[test]
    fn test_rejects_zero_values() {
        assert_eq!(Pagination::new(0, 10), Err(PaginationError::InvalidPage(0)));
        assert_eq!(
            Pagination::new(1, 0),
            Err(PaginationError::InvalidPerPage(0))
        );
    }

    #[test]
    fn test_defaults_from_query() {
        let pagination = Pagination::from_query(None, None, DEFAULT_PER_PAGE, MAX_RESULTS).unwrap();
        assert_eq!(pagination, Pagination::default());
    }

    #[test]
    fn test_pages_partition_the_collection() {
        let items: Vec<u32> = (0..23).collect();
        let per_page = 5;

        let mut rebuilt = Vec::new();
        for page in 1..=5 {
            let pagination = Pagination::new(page, per_page).unwrap();
            let chunk = pagination.apply(&items);
            let start = ((page - 1) * per_page) as usize;
            assert_eq!(chunk, items[start..(start + 5).min(23)].to_vec());
            rebuilt.extend(chunk);
        }

        assert_eq!(rebuilt, items);
        assert!(Pagination::new(6, per_page).unwrap().apply(&items).is_empty());
    }

    #[test]
    fn test_query_result_serialization() {
        let result = AuditQueryResult::new(vec![1, 2], 2, Pagination::default());
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(value["auditRecords"], serde_json::json!([1, 2]));
        assert_eq!(value["meta"]["pagination"]["perPage"], 25);
        assert_eq!(value["meta"]["pagination"]["totalPages"], 1);
        assert_eq!(value["meta"]["sorting"]["sortBy"], "createdAt");
        assert_eq!(value["meta"]["sorting"]["order"], "desc");
    }
}
