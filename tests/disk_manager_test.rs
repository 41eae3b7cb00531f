//! Integration tests for the disk manager and its extent allocator

use siltdb::common::{PageId, EXTENT_SIZE, PAGE_SIZE};
use siltdb::storage::disk::DiskManager;
use tempfile::NamedTempFile;

#[test]
fn test_allocate_never_returns_a_free_page() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    for _ in 0..64 {
        let page_id = dm.allocate_page().unwrap();
        assert!(!dm.is_page_free(page_id).unwrap());
    }
    assert_eq!(dm.num_allocated_pages(), 64);
}

#[test]
fn test_deallocate_frees_and_reuses_ids() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut ids = Vec::new();
    for _ in 0..16 {
        ids.push(dm.allocate_page().unwrap());
    }

    dm.deallocate_page(ids[5]).unwrap();
    dm.deallocate_page(ids[11]).unwrap();
    assert!(dm.is_page_free(ids[5]).unwrap());
    assert!(dm.is_page_free(ids[11]).unwrap());

    // Lowest free ids are handed back first.
    assert_eq!(dm.allocate_page().unwrap(), ids[5]);
    assert_eq!(dm.allocate_page().unwrap(), ids[11]);
    assert_eq!(dm.num_allocated_pages(), 16);
}

#[test]
fn test_double_free_is_idempotent() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();
    dm.deallocate_page(page_id).unwrap();
    dm.deallocate_page(page_id).unwrap();
    dm.deallocate_page(page_id).unwrap();

    assert_eq!(dm.num_allocated_pages(), 0);
    assert!(dm.is_page_free(page_id).unwrap());
}

#[test]
fn test_deallocate_beyond_extents_is_noop() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    dm.deallocate_page(PageId::new(EXTENT_SIZE * 3)).unwrap();
    assert_eq!(dm.num_allocated_pages(), 0);
    // A page beyond every extent reports free.
    assert!(dm.is_page_free(PageId::new(EXTENT_SIZE * 3)).unwrap());
}

#[test]
fn test_write_read_round_trip() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let mut pages = Vec::new();
    for i in 0..8u8 {
        let page_id = dm.allocate_page().unwrap();
        let mut data = [0u8; PAGE_SIZE];
        data[0] = i;
        data[PAGE_SIZE - 1] = 0xF0 | i;
        dm.write_page(page_id, &data).unwrap();
        pages.push((page_id, data));
    }

    for (page_id, expected) in pages {
        let mut data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut data).unwrap();
        assert_eq!(data, expected);
    }
}

#[test]
fn test_unwritten_page_reads_zero_filled() {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = DiskManager::new(temp_file.path()).unwrap();

    let page_id = dm.allocate_page().unwrap();
    let mut data = [0xAAu8; PAGE_SIZE];
    dm.read_page(page_id, &mut data).unwrap();
    assert!(data.iter().all(|&b| b == 0));
}

#[test]
fn test_physical_layout_of_first_extent() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let dm = DiskManager::new(&path).unwrap();

    // Logical pages 0 and 1 sit behind the metadata page and the first
    // extent's bitmap page, at physical pages 2 and 3.
    let p0 = dm.allocate_page().unwrap();
    let p1 = dm.allocate_page().unwrap();
    dm.write_page(p0, &[0x11u8; PAGE_SIZE]).unwrap();
    dm.write_page(p1, &[0x22u8; PAGE_SIZE]).unwrap();

    let raw = std::fs::read(&path).unwrap();
    assert!(raw.len() >= 4 * PAGE_SIZE);
    assert_eq!(raw[2 * PAGE_SIZE], 0x11);
    assert_eq!(raw[3 * PAGE_SIZE], 0x22);
    // The first extent's bitmap page records both allocations.
    let bitmap_header = &raw[PAGE_SIZE..PAGE_SIZE + 8];
    let allocated = u32::from_le_bytes(bitmap_header[0..4].try_into().unwrap());
    assert_eq!(allocated, 2);
}

#[test]
fn test_allocation_state_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = DiskManager::new(&path).unwrap();
        for _ in 0..10 {
            dm.allocate_page().unwrap();
        }
        dm.deallocate_page(PageId::new(4)).unwrap();
        dm.close().unwrap();
    }

    {
        let dm = DiskManager::new(&path).unwrap();
        assert_eq!(dm.num_allocated_pages(), 9);
        assert_eq!(dm.num_extents(), 1);
        assert!(dm.is_page_free(PageId::new(4)).unwrap());
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(4));
    }
}
