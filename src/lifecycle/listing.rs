//! Listing queries: pagination, sorting and visibility scope.

use serde::{Deserialize, Serialize};

use super::status::AchievementStatus;
use crate::types::Result;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Query parameters as received from the client, before clamping.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub sort: Option<String>,
    pub order: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Status,
}

impl SortField {
    /// Whitelisted column name; never built from client input.
    pub fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Status => "status",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// A normalized listing query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub limit: u32,
    pub sort: SortField,
    pub order: SortOrder,
    pub status: Option<AchievementStatus>,
}

impl Default for ListQuery {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
            sort: SortField::CreatedAt,
            order: SortOrder::Desc,
            status: None,
        }
    }
}

impl ListQuery {
    /// Clamp and whitelist raw parameters.
    ///
    /// Out-of-range pages and limits are clamped, unknown sort fields and
    /// orders fall back to `created_at DESC`. An unknown status filter is a
    /// validation error, since silently widening a filter changes the answer.
    pub fn from_params(params: &ListParams) -> Result<Self> {
        let page = params.page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let limit = params
            .limit
            .unwrap_or(DEFAULT_PAGE_LIMIT as i64)
            .clamp(1, MAX_PAGE_LIMIT as i64) as u32;

        let sort = match params.sort.as_deref() {
            Some("status") => SortField::Status,
            _ => SortField::CreatedAt,
        };
        let order = match params.order.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("asc") => SortOrder::Asc,
            _ => SortOrder::Desc,
        };
        let status = match params.status.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(raw.parse::<AchievementStatus>()?),
        };

        Ok(Self {
            page,
            limit,
            sort,
            order,
            status,
        })
    }

    pub fn offset(&self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

/// Which references a listing may see.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// Every reference.
    All,
    /// References owned by students advised by this lecturer.
    Advisees { lecturer_id: String },
    /// References owned by this student.
    Student { student_id: String },
}

/// One page of results.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: u64, query: &ListQuery) -> Self {
        let total_pages = total.div_ceil(query.limit as u64);
        Self {
            items,
            total,
            page: query.page,
            limit: query.limit,
            total_pages,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MeritError;

    fn params(page: Option<i64>, limit: Option<i64>) -> ListParams {
        ListParams {
            page,
            limit,
            ..Default::default()
        }
    }

    #[test]
    fn test_defaults() {
        let q = ListQuery::from_params(&ListParams::default()).unwrap();
        assert_eq!(q, ListQuery::default());
        assert_eq!(q.offset(), 0);
    }

    #[test]
    fn test_limit_and_page_are_clamped() {
        let q = ListQuery::from_params(&params(Some(0), Some(1000))).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 100);

        let q = ListQuery::from_params(&params(Some(-4), Some(0))).unwrap();
        assert_eq!(q.page, 1);
        assert_eq!(q.limit, 1);

        let q = ListQuery::from_params(&params(Some(3), Some(20))).unwrap();
        assert_eq!(q.offset(), 40);
    }

    #[test]
    fn test_unknown_sort_and_order_fall_back() {
        let q = ListQuery::from_params(&ListParams {
            sort: Some("title; DROP TABLE users".into()),
            order: Some("sideways".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.sort, SortField::CreatedAt);
        assert_eq!(q.order, SortOrder::Desc);

        let q = ListQuery::from_params(&ListParams {
            sort: Some("status".into()),
            order: Some("ASC".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.sort, SortField::Status);
        assert_eq!(q.order, SortOrder::Asc);
    }

    #[test]
    fn test_status_filter() {
        let q = ListQuery::from_params(&ListParams {
            status: Some("submitted".into()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(q.status, Some(AchievementStatus::Submitted));

        let err = ListQuery::from_params(&ListParams {
            status: Some("pending".into()),
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, MeritError::Validation(_)));
    }

    #[test]
    fn test_page_total_pages() {
        let q = ListQuery {
            limit: 10,
            ..Default::default()
        };
        let page: Page<u8> = Page::new(vec![], 21, &q);
        assert_eq!(page.total_pages, 3);
        let empty: Page<u8> = Page::new(vec![], 0, &q);
        assert_eq!(empty.total_pages, 0);
    }
}
