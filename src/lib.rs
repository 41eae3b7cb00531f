//! siltdb - a single-node, disk-backed storage engine
//!
//! The engine persists fixed-size pages in a flat file and layers a cache
//! and an ordered index on top. SQL front ends and catalogs are clients of
//! these interfaces, not part of the crate.
//!
//! # Architecture
//!
//! - **Disk layer** (`storage::disk`): page I/O against the backing file
//!   - `DiskManager`: logical-to-physical page mapping plus the bitmap
//!     extent allocator, with file metadata in a reserved page
//!   - `DiskScheduler`: background worker funneling page transfers through
//!     a request queue
//!
//! - **Buffer pool** (`buffer`): fixed-capacity page cache
//!   - `BufferPoolManager`: page table, free list and pin/dirty bookkeeping
//!   - `LruReplacer`: least-recently-used eviction over unpinned frames
//!   - `ReadPageGuard`/`WritePageGuard`: scoped pins over page bytes
//!
//! - **Index** (`index`): disk-resident B+Tree
//!   - `BPlusTree`: point lookup, unique-key insert with split propagation,
//!     delete with merge/redistribute rebalancing, ordered iteration
//!   - `IndexRootsPage`: reserved directory page mapping index ids to their
//!     root pages across restarts
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use siltdb::buffer::BufferPoolManager;
//! use siltdb::common::RowId;
//! use siltdb::index::{BPlusTree, U32Comparator};
//! use siltdb::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let mut index = BPlusTree::new(1, Arc::clone(&bpm), Arc::new(U32Comparator), 4).unwrap();
//! index.insert(&42u32.to_le_bytes(), RowId::new(siltdb::PageId::new(7), 0)).unwrap();
//! assert_eq!(index.get_value(&42u32.to_le_bytes()).unwrap().len(), 1);
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{PageId, Result, RowId, SiltError};
