use serde::{Deserialize, Serialize};

use super::Marker;

pub const DEFAULT_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1000;

/// Pagination request. `continuation` is the id of the last item of the previous page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub continuation: Option<String>,
    pub count: usize,
    pub marker: Marker,
    pub newest_first: bool,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            continuation: None,
            count: DEFAULT_PAGE_SIZE,
            marker: Marker::Any,
            newest_first: false,
        }
    }
}

impl Page {
    pub fn new(count: usize) -> Self {
        Self {
            count,
            ..Default::default()
        }
    }

    pub fn with_marker(mut self, marker: Marker) -> Self {
        self.marker = marker;
        self
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn after(mut self, continuation: impl Into<String>) -> Self {
        self.continuation = Some(continuation.into());
        self
    }

    /// Page size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn limit(&self) -> usize {
        self.count.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results. An empty `next` means there is nothing more.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub next: String,
}

impl<T> Listing<T> {
    pub fn is_last(&self) -> bool {
        self.next.is_empty()
    }
}
