use serde::Serialize;

/// Paginated response envelope shared by every listing endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
    pub has_next: bool,
    pub has_prev: bool,
}

impl<T> Page<T> {
    /// `page` is 1-based. An empty result still reports one page so
    /// `total_pages` never reads as zero.
    pub fn new(items: Vec<T>, total: u64, page: u64, page_size: u64) -> Self {
        let total_pages = if page_size == 0 {
            1
        } else {
            std::cmp::max(1, total.div_ceil(page_size))
        };
        Self {
            has_next: page < total_pages,
            has_prev: page > 1,
            items,
            total,
            page,
            page_size,
            total_pages,
        }
    }

    pub fn empty(page: u64, page_size: u64) -> Self {
        Self::new(Vec::new(), 0, page, page_size)
    }
}
