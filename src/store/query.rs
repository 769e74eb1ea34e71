//! Filter and paging helpers shared by the built-in stores' query operations.

use crate::api::{QueryParams, QueryResponse};
use crate::error::{AuthError, AuthResult};

pub const DEFAULT_PAGE_SIZE: usize = 100;

/// `pattern` matches exactly, or by prefix when it ends with `*`.
pub fn name_matches(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => value == pattern,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    /// Read `offset` / `limit`; a limit above `max` is clamped, zero is rejected.
    pub fn from_query(query: &QueryParams, max: usize) -> AuthResult<Self> {
        let offset = query.parse::<usize>("offset")?.unwrap_or(0);
        let limit = query.parse::<usize>("limit")?.unwrap_or(max);
        if limit == 0 {
            return Err(AuthError::validation("limit must be positive"));
        }
        Ok(Self { offset, limit: limit.min(max) })
    }

    /// Total is counted before paging.
    pub fn apply<T>(&self, items: Vec<T>) -> QueryResponse<T> {
        let total = items.len();
        let items = items.into_iter().skip(self.offset).take(self.limit).collect();
        QueryResponse { total, items }
    }
}
