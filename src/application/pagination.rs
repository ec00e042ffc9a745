//! Page-number pagination over ranked sets.

use serde::Serialize;
use thiserror::Error;

pub const MAX_PAGE_SIZE: u32 = 10;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PaginationError {
    #[error("page numbers start at 1")]
    InvalidPage,
    #[error("page size must be between 1 and {max}, got {got}")]
    InvalidPageSize { got: u32, max: u32 },
}

/// A validated one-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PageRequest {
    page: u32,
    page_size: u32,
}

impl PageRequest {
    pub fn new(page: u32, page_size: u32) -> Result<Self, PaginationError> {
        if page == 0 {
            return Err(PaginationError::InvalidPage);
        }
        if page_size == 0 || page_size > MAX_PAGE_SIZE {
            return Err(PaginationError::InvalidPageSize {
                got: page_size,
                max: MAX_PAGE_SIZE,
            });
        }
        Ok(Self { page, page_size })
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// First rank on the page, zero-based.
    pub fn start(&self) -> i64 {
        i64::from(self.page - 1) * i64::from(self.page_size)
    }

    /// Last rank on the page, inclusive.
    pub fn stop(&self) -> i64 {
        self.start() + i64::from(self.page_size) - 1
    }

    /// Row offset for stores addressed by offset and limit.
    pub fn offset(&self) -> u32 {
        (self.page - 1).saturating_mul(self.page_size)
    }
}

/// One page of results with the size of the whole collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            total: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ranks_follow_page_arithmetic() {
        let request = PageRequest::new(3, 4).expect("valid");
        assert_eq!(request.start(), 8);
        assert_eq!(request.stop(), 11);
        assert_eq!(request.offset(), 8);
    }

    #[test]
    fn out_of_range_requests_are_rejected() {
        assert_eq!(PageRequest::new(0, 5), Err(PaginationError::InvalidPage));
        assert_eq!(
            PageRequest::new(1, 11),
            Err(PaginationError::InvalidPageSize { got: 11, max: 10 })
        );
        assert!(PageRequest::new(1, 0).is_err());
    }
}
