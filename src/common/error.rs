use thiserror::Error;

use super::types::PageId;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum SiltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("backing file is out of space (maximum page id exceeded)")]
    OutOfSpace,

    #[error("buffer pool exhausted, no evictable frames available")]
    PoolExhausted,

    #[error("page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("corrupt page {page_id}: {reason}")]
    CorruptPage {
        page_id: PageId,
        reason: &'static str,
    },

    #[error("key already exists in index")]
    KeyAlreadyExists,

    #[error("index roots page is full")]
    IndexRootsFull,

    #[error("disk scheduler error: {0}")]
    DiskScheduler(String),
}

pub type Result<T> = std::result::Result<T, SiltError>;
