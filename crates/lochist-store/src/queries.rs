//! Query builder for stored locations.
//!
//! [`LocationQuery`] follows the builder pattern. Time bounds are half-open:
//! `since` is inclusive and `until` is exclusive, so adjacent ranges never
//! share a record.
//!
//! # Example
//!
//! ```
//! use lochist_store::{LocationQuery, Store};
//!
//! let store = Store::open_in_memory()?;
//!
//! // Second page of a day, newest first
//! let query = LocationQuery::range(1_714_521_600_000, 1_714_608_000_000)
//!     .limit(50)
//!     .offset(50);
//! let records = store.query(&query)?;
//! assert!(records.is_empty());
//! # Ok::<(), lochist_store::Error>(())
//! ```

use crate::models::LOCATION_COLUMNS;

/// Fluent query builder for location records.
///
/// By default, results are ordered newest first: `captured_at_millis`
/// descending, then `id` descending for equal timestamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationQuery {
    /// Include records captured at or after this time (epoch ms).
    pub since: Option<i64>,
    /// Include records captured strictly before this time (epoch ms).
    pub until: Option<i64>,
    /// Maximum number of results.
    pub limit: Option<u32>,
    /// Offset for pagination.
    pub offset: Option<u32>,
    /// Order newest first (the default).
    pub newest_first: bool,
}

impl Default for LocationQuery {
    fn default() -> Self {
        Self {
            since: None,
            until: None,
            limit: None,
            offset: None,
            newest_first: true,
        }
    }
}

impl LocationQuery {
    /// Create a query over all records, newest first.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a query over `[from_inclusive, to_exclusive)`.
    pub fn range(from_inclusive: i64, to_exclusive: i64) -> Self {
        Self::new().since(from_inclusive).until(to_exclusive)
    }

    /// Only records captured at or after `millis`.
    pub fn since(mut self, millis: i64) -> Self {
        self.since = Some(millis);
        self
    }

    /// Only records captured before `millis`.
    pub fn until(mut self, millis: i64) -> Self {
        self.until = Some(millis);
        self
    }

    /// Limit the maximum number of results returned.
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first N results.
    ///
    /// Use with `limit()` for pagination.
    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Order results oldest first (`captured_at_millis` then `id`, ascending).
    pub fn oldest_first(mut self) -> Self {
        self.newest_first = false;
        self
    }

    /// Build the SQL WHERE clause and parameters.
    pub(crate) fn build_where(&self) -> (String, Vec<i64>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some(since) = self.since {
            conditions.push("captured_at_millis >= ?");
            params.push(since);
        }

        if let Some(until) = self.until {
            conditions.push("captured_at_millis < ?");
            params.push(until);
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        (where_clause, params)
    }

    /// Build the full SQL query.
    pub(crate) fn build_sql(&self) -> String {
        let (where_clause, _) = self.build_where();
        let order = if self.newest_first { "DESC" } else { "ASC" };

        let mut sql = format!(
            "SELECT {LOCATION_COLUMNS} FROM locations {} \
             ORDER BY captured_at_millis {order}, id {order}",
            where_clause
        );

        // SQLite only accepts OFFSET after LIMIT; -1 means unbounded
        if self.limit.is_some() || self.offset.is_some() {
            let limit = self.limit.map_or(-1, i64::from);
            sql.push_str(&format!(" LIMIT {}", limit));
        }

        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }

        sql
    }
}
