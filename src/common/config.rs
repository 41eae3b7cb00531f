use super::types::{FrameId, PageId};

/// Size of a page in bytes (4 KiB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Invalid frame ID constant
pub const INVALID_FRAME_ID: FrameId = FrameId(u32::MAX);

/// Bytes reserved at the start of a bitmap page for its counters
pub const BITMAP_PAGE_HEADER_SIZE: usize = 8;

/// Number of data pages tracked by one bitmap page, i.e. the capacity of an extent
pub const EXTENT_SIZE: u32 = (8 * (PAGE_SIZE - BITMAP_PAGE_HEADER_SIZE)) as u32;

/// Bytes reserved at the start of the file metadata page for its counters
pub const META_PAGE_HEADER_SIZE: usize = 8;

/// Maximum number of extents the metadata page can track
pub const MAX_EXTENT_COUNT: u32 = ((PAGE_SIZE - META_PAGE_HEADER_SIZE) / 4) as u32;

/// Logical page ids must stay below this bound
pub const MAX_VALID_PAGE_ID: u32 = MAX_EXTENT_COUNT * EXTENT_SIZE;

/// Reserved logical page holding the index roots directory
pub const INDEX_ROOTS_PAGE_ID: PageId = PageId(0);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 64;
