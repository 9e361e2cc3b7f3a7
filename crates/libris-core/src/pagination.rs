//! Shared pagination rules.
//!
//! Every paged read (library detail, reading-history library, virtual uploads,
//! book and reading-record listings) goes through [`PageQuery::paging`] so the
//! clamp/default behavior cannot drift between endpoints.

use serde::{Deserialize, Serialize};

use crate::defaults::{PAGE_LIMIT, PAGE_LIMIT_MAX, PAGE_OFFSET};

/// Effective window of a paged read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub take: i64,
    pub skip: i64,
}

impl Page {
    /// Clamp raw client values into an effective window.
    ///
    /// - `limit` absent or `<= 0` → [`PAGE_LIMIT`]; above [`PAGE_LIMIT_MAX`] → clamped
    /// - `offset` absent or negative → [`PAGE_OFFSET`]
    pub fn normalize(limit: Option<i64>, offset: Option<i64>) -> Self {
        let take = match limit {
            Some(l) if l > PAGE_LIMIT_MAX => PAGE_LIMIT_MAX,
            Some(l) if l > 0 => l,
            _ => PAGE_LIMIT,
        };
        let skip = match offset {
            Some(o) if o >= 0 => o,
            _ => PAGE_OFFSET,
        };
        Self { take, skip }
    }
}

/// Raw `?limit&offset` query parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn new(limit: Option<i64>, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    /// `None` when neither parameter was supplied (return everything),
    /// otherwise the normalized window.
    pub fn paging(&self) -> Option<Page> {
        if self.limit.is_none() && self.offset.is_none() {
            None
        } else {
            Some(Page::normalize(self.limit, self.offset))
        }
    }

    /// Always a window, for listings that are never returned in full.
    pub fn page(&self) -> Page {
        Page::normalize(self.limit, self.offset)
    }
}

/// A page of results with the effective window and total count.
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Paged<T> {
    pub fn new(items: Vec<T>, total: i64, page: Page) -> Self {
        Self {
            items,
            total,
            limit: page.take,
            offset: page.skip,
        }
    }
}
