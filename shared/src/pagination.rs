//! Pagination helpers

use serde::{Deserialize, Serialize};

/// Default page size when the caller passes none (or a non-positive one)
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Upper bound for a single page
pub const MAX_PAGE_SIZE: u32 = 100;

/// Normalize a raw (page, size) pair: page < 1 becomes 1, size < 1 becomes
/// [`DEFAULT_PAGE_SIZE`]. Sizes above [`MAX_PAGE_SIZE`] are left for the caller
/// to reject.
pub fn normalize(page: i64, size: i64) -> (u32, u32) {
    let page = if page <= 0 {
        1
    } else {
        u32::try_from(page).unwrap_or(u32::MAX)
    };
    let size = if size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        u32::try_from(size).unwrap_or(u32::MAX)
    };
    (page, size)
}

/// 分页响应
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    /// 数据列表
    pub data: Vec<T>,
    /// 总记录数
    pub total: u64,
    /// 当前页码
    pub page: u32,
    /// 每页数量
    pub limit: u32,
    /// 总页数
    pub total_pages: u32,
}

impl<T> PaginatedResponse<T> {
    pub fn new(data: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        let total_pages = if limit > 0 {
            total.div_ceil(u64::from(limit)) as u32
        } else {
            1
        };

        Self {
            data,
            total,
            page,
            limit,
            total_pages,
        }
    }
}
