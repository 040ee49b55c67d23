use serde::Serialize;

pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// 1-based page selection, clamped to sane bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self {
            page: page.unwrap_or(1).max(1),
            limit: limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT),
        }
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(None, None)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub page: u32,
    pub limit: u32,
    pub count: usize,
    pub data: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(request: PageRequest, data: Vec<T>) -> Self {
        Self {
            page: request.page,
            limit: request.limit,
            count: data.len(),
            data,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            page: self.page,
            limit: self.limit,
            count: self.count,
            data: self.data.into_iter().map(f).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let req = PageRequest::new(None, None);
        assert_eq!((req.page, req.limit, req.offset()), (1, 10, 0));

        let req = PageRequest::new(Some(0), Some(10_000));
        assert_eq!((req.page, req.limit), (1, MAX_PAGE_LIMIT));

        assert_eq!(PageRequest::new(Some(3), Some(20)).offset(), 40);
    }
}
