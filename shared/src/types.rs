//! Common types used across the ledger

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Offset pagination parameters (zero-based page)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub per_page: u32,
}

impl Pagination {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self { page, per_page }
    }

    /// Clamp the page size into `1..=max_per_page`
    pub fn clamped(self, max_per_page: u32) -> Self {
        Self {
            page: self.page,
            per_page: self.per_page.clamp(1, max_per_page.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page) * u64::from(self.per_page)
    }

    pub fn limit(&self) -> u64 {
        u64::from(self.per_page)
    }
}

/// Paginated response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub data: Vec<T>,
    pub pagination: PaginationMeta,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, pagination: Pagination, total_items: u64) -> Self {
        Self {
            data,
            pagination: PaginationMeta::new(pagination, total_items),
        }
    }
}

/// Pagination metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaginationMeta {
    pub page: u32,
    pub per_page: u32,
    pub total_items: u64,
    pub total_pages: u32,
}

impl PaginationMeta {
    pub fn new(pagination: Pagination, total_items: u64) -> Self {
        let per_page = u64::from(pagination.per_page.max(1));
        let total_pages = total_items.div_ceil(per_page);
        Self {
            page: pagination.page,
            per_page: pagination.per_page,
            total_items,
            total_pages: u32::try_from(total_pages).unwrap_or(u32::MAX),
        }
    }
}

/// Position of the last row seen in a (date DESC, id DESC) ordering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysetCursor {
    pub last_date: DateTime<Utc>,
    pub last_id: i64,
}

impl KeysetCursor {
    pub fn new(last_date: DateTime<Utc>, last_id: i64) -> Self {
        Self { last_date, last_id }
    }

    /// Whether a row sorts strictly after the cursor, i.e. belongs to the next page
    pub fn admits(&self, date: DateTime<Utc>, id: i64) -> bool {
        date < self.last_date || (date == self.last_date && id < self.last_id)
    }
}

/// One page of a keyset-paginated listing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeysetPage<T> {
    pub data: Vec<T>,
    /// Cursor to pass back for the following page
    pub next_cursor: Option<KeysetCursor>,
    pub has_more: bool,
}

/// Midnight UTC at the start of `date`
pub fn start_of_day(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// Exclusive upper bound for a range ending on `date`
pub fn start_of_next_day(date: NaiveDate) -> DateTime<Utc> {
    date.succ_opt()
        .map(start_of_day)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
