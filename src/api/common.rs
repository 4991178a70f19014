//! Common API utilities and shared types

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::middleware::{AppState, AuthenticatedUser};
use crate::models::{ListParams, PagedResult};

/// Default page number (1-indexed)
pub fn default_page() -> u32 {
    1
}

/// Default page size
pub fn default_per_page() -> u32 {
    10
}

/// Basic pagination query parameters
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct PaginationQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

impl Default for PaginationQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            per_page: default_per_page(),
        }
    }
}

impl PaginationQuery {
    pub fn params(&self) -> ListParams {
        ListParams::new(self.page, self.per_page)
    }
}

/// Body of every list endpoint
#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub total_pages: u32,
}

impl<T> From<PagedResult<T>> for ListResponse<T> {
    fn from(result: PagedResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            items: result.items,
            total: result.total,
            page: result.page,
            per_page: result.per_page,
            total_pages,
        }
    }
}

/// Body carrying an ordered id list
#[derive(Debug, Deserialize)]
pub struct OrderRequest {
    pub ids: Vec<i64>,
}

/// Record an admin action; failures are only logged
pub async fn audit(state: &AppState, user: &AuthenticatedUser, action: &str, metadata: Value) {
    if let Err(e) = state
        .analytics_service
        .audit(action, Some(&user.0.username), metadata)
        .await
    {
        tracing::warn!(action, error = %e, "Failed to record audit event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_response_total_pages() {
        let result = PagedResult::new(vec![1, 2, 3], 23, &ListParams::new(1, 10));
        let response = ListResponse::from(result);
        assert_eq!(response.total_pages, 3);
        assert_eq!(response.items, vec![1, 2, 3]);
    }

    #[test]
    fn test_pagination_query_clamps() {
        let query = PaginationQuery {
            page: 0,
            per_page: 1000,
        };
        assert_eq!(query.params(), ListParams::new(1, 100));
        assert_eq!(PaginationQuery::default().params(), ListParams::default());
    }
}
