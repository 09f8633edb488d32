use serde::{Deserialize, Serialize};

/// Requested page, 1-based
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self { page, page_size }
    }

    /// Clamp to `page >= 1` and `1 <= page_size <= max_page_size`
    pub fn normalized(self, max_page_size: u32) -> Self {
        Self {
            page: self.page.max(1),
            page_size: self.page_size.clamp(1, max_page_size.max(1)),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page.saturating_sub(1)) * u64::from(self.page_size)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub entries: Vec<T>,
    pub page_number: u32,
    pub page_size: u32,
    pub total_entries: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(entries: Vec<T>, request: PageRequest, total_entries: u64) -> Self {
        let size = u64::from(request.page_size.max(1));
        let total_pages = total_entries.div_ceil(size).max(1);
        Self {
            entries,
            page_number: request.page,
            page_size: request.page_size,
            total_entries,
            total_pages,
        }
    }

    /// Transform entries while keeping order and pagination metadata
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            entries: self.entries.into_iter().map(f).collect(),
            page_number: self.page_number,
            page_size: self.page_size,
            total_entries: self.total_entries,
            total_pages: self.total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_counts() {
        let page = Page::new(vec![1, 2], PageRequest::new(3, 2), 6);
        assert_eq!(page.total_pages, 3);

        let empty: Page<u8> = Page::new(Vec::new(), PageRequest::new(1, 20), 0);
        assert_eq!(empty.total_pages, 1);

        let partial = Page::new(vec![1], PageRequest::new(2, 20), 21);
        assert_eq!(partial.total_pages, 2);
    }

    #[test]
    fn test_request_normalization() {
        let request = PageRequest::new(0, 500).normalized(100);
        assert_eq!(request, PageRequest::new(1, 100));
        assert_eq!(PageRequest::new(3, 0).normalized(100).page_size, 1);
        assert_eq!(PageRequest::new(3, 10).offset(), 20);
    }

    #[test]
    fn test_map_keeps_metadata() {
        let page = Page::new(vec![1, 2, 3], PageRequest::new(2, 3), 9).map(|n| n * 10);
        assert_eq!(page.entries, vec![10, 20, 30]);
        assert_eq!(page.page_number, 2);
        assert_eq!(page.total_pages, 3);
    }
}
