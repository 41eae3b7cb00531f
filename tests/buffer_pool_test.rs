//! Integration tests for the buffer pool manager

use std::sync::Arc;
use std::thread;

use siltdb::buffer::BufferPoolManager;
use siltdb::common::{PageId, SiltError};
use siltdb::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (Arc::new(BufferPoolManager::new(pool_size, dm)), temp_file)
}

#[test]
fn test_basic_write_then_read() {
    let (bpm, _temp) = create_bpm(10);

    let (page_id, mut guard) = bpm.new_page().unwrap();
    guard.data_mut()[0] = 0xDE;
    guard.data_mut()[1] = 0xAD;
    guard.data_mut()[2] = 0xBE;
    guard.data_mut()[3] = 0xEF;
    drop(guard);

    let guard = bpm.fetch_read_page(page_id).unwrap();
    assert_eq!(&guard.data()[0..4], &[0xDE, 0xAD, 0xBE, 0xEF]);
}

#[test]
fn test_flush_persists_across_pools() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();
    let page_id;
    let payload = b"persistence test payload";

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(10, dm));

        let (id, mut guard) = bpm.new_page().unwrap();
        guard.data_mut()[..payload.len()].copy_from_slice(payload);
        drop(guard);
        bpm.flush_page(id).unwrap();
        page_id = id;
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(10, dm));

        let guard = bpm.fetch_read_page(page_id).unwrap();
        assert_eq!(&guard.data()[..payload.len()], payload);
    }
}

#[test]
fn test_lru_eviction_picks_oldest_unpinned() {
    let (bpm, _temp) = create_bpm(3);

    // Fill the pool with three pages, unpinned in creation order.
    let mut ids = Vec::new();
    for marker in 0..3u8 {
        let (page_id, mut guard) = bpm.new_page().unwrap();
        guard.data_mut()[0] = marker;
        drop(guard);
        ids.push(page_id);
    }
    assert_eq!(bpm.free_frame_count(), 0);

    // The next page steals the frame of the first-unpinned page.
    let (_new_id, guard) = bpm.new_page().unwrap();
    drop(guard);

    assert_eq!(bpm.get_pin_count(ids[0]), None);
    assert!(bpm.get_pin_count(ids[1]).is_some());
    assert!(bpm.get_pin_count(ids[2]).is_some());
}

#[test]
fn test_evicted_dirty_page_is_written_back() {
    let (bpm, _temp) = create_bpm(3);

    let (first_id, mut guard) = bpm.new_page().unwrap();
    guard.data_mut()[0] = 0x5A;
    drop(guard);

    // Enough new pages to force the first one out of the pool.
    for _ in 0..3 {
        let (_, guard) = bpm.new_page().unwrap();
        drop(guard);
    }
    assert_eq!(bpm.get_pin_count(first_id), None);

    // Reloading from disk must observe the write-back.
    let guard = bpm.fetch_read_page(first_id).unwrap();
    assert_eq!(guard.data()[0], 0x5A);
}

#[test]
fn test_pinned_pages_are_not_evicted() {
    let (bpm, _temp) = create_bpm(2);

    let (_id1, _guard1) = bpm.new_page().unwrap();
    let (_id2, _guard2) = bpm.new_page().unwrap();

    assert!(matches!(bpm.new_page(), Err(SiltError::PoolExhausted)));
    assert!(matches!(
        bpm.fetch_read_page(PageId::new(99)),
        Err(SiltError::PoolExhausted)
    ));
}

#[test]
fn test_delete_page_contract() {
    let (bpm, _temp) = create_bpm(4);

    let (page_id, guard) = bpm.new_page().unwrap();

    // Busy while pinned.
    assert!(!bpm.delete_page(page_id).unwrap());
    drop(guard);

    assert!(bpm.delete_page(page_id).unwrap());
    assert_eq!(bpm.get_pin_count(page_id), None);
    assert!(bpm.is_page_free(page_id).unwrap());

    // Deleting an absent page succeeds trivially.
    assert!(bpm.delete_page(page_id).unwrap());
}

#[test]
fn test_unpin_past_zero_reports_success() {
    let (bpm, _temp) = create_bpm(4);

    let (page_id, guard) = bpm.new_page().unwrap();
    drop(guard);

    assert!(bpm.unpin_page(page_id, false));
    assert!(bpm.unpin_page(page_id, true));
    assert_eq!(bpm.get_pin_count(page_id), Some(0));
}

#[test]
fn test_flush_of_unresident_page_fails() {
    let (bpm, _temp) = create_bpm(4);
    assert!(!bpm.flush_page(PageId::new(42)).unwrap());
}

#[test]
fn test_check_all_unpinned_after_workload() {
    let (bpm, _temp) = create_bpm(4);

    for _ in 0..8 {
        let (page_id, mut guard) = bpm.new_page().unwrap();
        guard.data_mut()[0] = 1;
        drop(guard);
        let guard = bpm.fetch_read_page(page_id).unwrap();
        drop(guard);
    }
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_concurrent_writers_on_distinct_pages() {
    let (bpm, _temp) = create_bpm(16);

    let mut ids = Vec::new();
    for _ in 0..8 {
        let (page_id, guard) = bpm.new_page().unwrap();
        drop(guard);
        ids.push(page_id);
    }

    let mut handles = Vec::new();
    for (i, page_id) in ids.iter().copied().enumerate() {
        let bpm = Arc::clone(&bpm);
        handles.push(thread::spawn(move || {
            for round in 0..32u8 {
                let mut guard = bpm.fetch_write_page(page_id).unwrap();
                guard.data_mut()[0] = i as u8;
                guard.data_mut()[1] = round;
                drop(guard);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    for (i, page_id) in ids.iter().copied().enumerate() {
        let guard = bpm.fetch_read_page(page_id).unwrap();
        assert_eq!(guard.data()[0], i as u8);
        assert_eq!(guard.data()[1], 31);
    }
    assert!(bpm.check_all_unpinned());
}
