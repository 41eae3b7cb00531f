use std::sync::Arc;

use crate::buffer::BufferPoolManager;
use crate::common::{
    IndexId, PageId, Result, SiltError, INDEX_ROOTS_PAGE_ID, INVALID_PAGE_ID, PAGE_SIZE,
};

const ROOTS_MAGIC: u32 = 0x524F_4F54; // "ROOT"

const MAGIC_OFFSET: usize = 0;
const COUNT_OFFSET: usize = 4;
const ENTRIES_OFFSET: usize = 8;
const ENTRY_SIZE: usize = 8;

/// Maximum number of indexes the roots page can track
pub const MAX_ROOT_ENTRIES: usize = (PAGE_SIZE - ENTRIES_OFFSET) / ENTRY_SIZE;

/// The index roots directory lives in reserved logical page 0 and maps each
/// `index_id` to the current root page of that index, so every tree
/// survives a restart:
///
/// ```text
/// [magic: u32][count: u32][(index_id: u32, root_page_id: u32); count]
/// ```
///
/// The page is rewritten on every root change and consulted on reopen.
pub struct IndexRootsPage;

impl IndexRootsPage {
    /// Stamps an empty directory over the page.
    pub fn init(data: &mut [u8]) {
        assert_eq!(data.len(), PAGE_SIZE);
        data.fill(0);
        data[MAGIC_OFFSET..MAGIC_OFFSET + 4].copy_from_slice(&ROOTS_MAGIC.to_le_bytes());
    }

    /// Initializes a still-zeroed page in place; an already-initialized
    /// page is left alone, anything else is corruption.
    pub fn ensure_init(data: &mut [u8]) -> Result<()> {
        if Self::magic(data) == 0 {
            Self::init(data);
            return Ok(());
        }
        Self::check(data)
    }

    /// Current root of `index_id`, or None when the index has no root
    /// recorded (unknown index, or a tree that became empty).
    pub fn get(data: &[u8], index_id: IndexId) -> Result<Option<PageId>> {
        Self::check(data)?;
        for slot in 0..Self::count(data) {
            let off = ENTRIES_OFFSET + slot * ENTRY_SIZE;
            if Self::read_u32(data, off) == index_id {
                let root = Self::read_u32(data, off + 4);
                if root == INVALID_PAGE_ID.as_u32() {
                    return Ok(None);
                }
                return Ok(Some(PageId::new(root)));
            }
        }
        Ok(None)
    }

    /// Records `root` for `index_id`, updating the existing entry or
    /// appending a new one.
    pub fn set(data: &mut [u8], index_id: IndexId, root: PageId) -> Result<()> {
        Self::check(data)?;
        let count = Self::count(data);
        for slot in 0..count {
            let off = ENTRIES_OFFSET + slot * ENTRY_SIZE;
            if Self::read_u32(data, off) == index_id {
                data[off + 4..off + 8].copy_from_slice(&root.as_u32().to_le_bytes());
                return Ok(());
            }
        }

        if count >= MAX_ROOT_ENTRIES {
            return Err(SiltError::IndexRootsFull);
        }
        let off = ENTRIES_OFFSET + count * ENTRY_SIZE;
        data[off..off + 4].copy_from_slice(&index_id.to_le_bytes());
        data[off + 4..off + 8].copy_from_slice(&root.as_u32().to_le_bytes());
        data[COUNT_OFFSET..COUNT_OFFSET + 4].copy_from_slice(&((count + 1) as u32).to_le_bytes());
        Ok(())
    }

    /// Drops the entry for `index_id`; no-op when absent.
    pub fn remove(data: &mut [u8], index_id: IndexId) -> Result<()> {
        Self::check(data)?;
        let count = Self::count(data);
        for slot in 0..count {
            let off = ENTRIES_OFFSET + slot * ENTRY_SIZE;
            if Self::read_u32(data, off) == index_id {
                let start = off + ENTRY_SIZE;
                let end = ENTRIES_OFFSET + count * ENTRY_SIZE;
                data.copy_within(start..end, off);
                data[end - ENTRY_SIZE..end].fill(0);
                data[COUNT_OFFSET..COUNT_OFFSET + 4]
                    .copy_from_slice(&((count - 1) as u32).to_le_bytes());
                return Ok(());
            }
        }
        Ok(())
    }

    /// Makes sure the reserved roots page exists and is initialized. On a
    /// fresh file this allocates it; the ascending first-fit allocator
    /// guarantees a free page 0 is the next id handed out, so the reserved
    /// id never collides with data pages.
    pub fn bootstrap(bpm: &Arc<BufferPoolManager>) -> Result<()> {
        if bpm.is_page_free(INDEX_ROOTS_PAGE_ID)? {
            let (page_id, mut guard) = bpm.new_page()?;
            assert_eq!(
                page_id, INDEX_ROOTS_PAGE_ID,
                "roots page must be the first allocation"
            );
            Self::init(guard.data_mut());
        } else {
            let mut guard = bpm.fetch_write_page(INDEX_ROOTS_PAGE_ID)?;
            Self::ensure_init(guard.data_mut())?;
        }
        Ok(())
    }

    fn magic(data: &[u8]) -> u32 {
        Self::read_u32(data, MAGIC_OFFSET)
    }

    fn count(data: &[u8]) -> usize {
        Self::read_u32(data, COUNT_OFFSET) as usize
    }

    fn check(data: &[u8]) -> Result<()> {
        if Self::magic(data) != ROOTS_MAGIC {
            return Err(SiltError::CorruptPage {
                page_id: INDEX_ROOTS_PAGE_ID,
                reason: "bad index roots magic",
            });
        }
        Ok(())
    }

    fn read_u32(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeroed_page_bootstraps_empty() {
        let mut data = [0u8; PAGE_SIZE];
        IndexRootsPage::ensure_init(&mut data).unwrap();
        assert_eq!(IndexRootsPage::get(&data, 1).unwrap(), None);
    }

    #[test]
    fn test_bad_magic_is_corrupt() {
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 0xAB;
        assert!(matches!(
            IndexRootsPage::ensure_init(&mut data),
            Err(SiltError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_set_get_update() {
        let mut data = [0u8; PAGE_SIZE];
        IndexRootsPage::init(&mut data);

        IndexRootsPage::set(&mut data, 1, PageId::new(10)).unwrap();
        IndexRootsPage::set(&mut data, 2, PageId::new(20)).unwrap();
        assert_eq!(IndexRootsPage::get(&data, 1).unwrap(), Some(PageId::new(10)));
        assert_eq!(IndexRootsPage::get(&data, 2).unwrap(), Some(PageId::new(20)));

        IndexRootsPage::set(&mut data, 1, PageId::new(11)).unwrap();
        assert_eq!(IndexRootsPage::get(&data, 1).unwrap(), Some(PageId::new(11)));

        // An invalid root means the tree exists but is empty.
        IndexRootsPage::set(&mut data, 2, INVALID_PAGE_ID).unwrap();
        assert_eq!(IndexRootsPage::get(&data, 2).unwrap(), None);
    }

    #[test]
    fn test_remove_compacts_entries() {
        let mut data = [0u8; PAGE_SIZE];
        IndexRootsPage::init(&mut data);

        for id in 1..=3 {
            IndexRootsPage::set(&mut data, id, PageId::new(id * 10)).unwrap();
        }
        IndexRootsPage::remove(&mut data, 2).unwrap();

        assert_eq!(IndexRootsPage::get(&data, 2).unwrap(), None);
        assert_eq!(IndexRootsPage::get(&data, 1).unwrap(), Some(PageId::new(10)));
        assert_eq!(IndexRootsPage::get(&data, 3).unwrap(), Some(PageId::new(30)));

        // Removing a missing entry is a no-op.
        IndexRootsPage::remove(&mut data, 9).unwrap();
    }
}
