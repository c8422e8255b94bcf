use serde::{Deserialize, Serialize};

/// Paging envelope shared by every list endpoint. Items are server-sorted;
/// `total_pages` is always at least 1, even for an empty result set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: u64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, current_page: u32, total_items: u64, limit: u32) -> Self {
        Self {
            items,
            current_page,
            total_pages: total_pages_for(total_items, limit),
            total_items,
        }
    }

    /// The envelope for an empty result set: one (empty) page, zero items.
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            current_page: 1,
            total_pages: 1,
            total_items: 0,
        }
    }
}

/// `max(1, ceil(total_items / limit))`.
pub fn total_pages_for(total_items: u64, limit: u32) -> u32 {
    if total_items == 0 {
        return 1;
    }
    total_items.div_ceil(u64::from(limit)) as u32
}
