//! Integration tests for the B+Tree index

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;

use siltdb::buffer::BufferPoolManager;
use siltdb::common::{PageId, RowId, SiltError};
use siltdb::index::{BPlusTree, NodePage, U32Comparator};
use siltdb::storage::disk::DiskManager;
use tempfile::NamedTempFile;

fn create_bpm(pool_size: usize) -> (Arc<BufferPoolManager>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    (Arc::new(BufferPoolManager::new(pool_size, dm)), temp_file)
}

fn small_tree(bpm: &Arc<BufferPoolManager>) -> BPlusTree {
    // Tiny fan-out so a handful of keys already builds a deep tree.
    BPlusTree::with_max_sizes(1, Arc::clone(bpm), Arc::new(U32Comparator), 4, 4, 4).unwrap()
}

fn key(k: u32) -> [u8; 4] {
    k.to_le_bytes()
}

fn row(k: u32) -> RowId {
    RowId::new(PageId::new(k), k)
}

fn assert_contains(tree: &BPlusTree, k: u32) {
    assert_eq!(tree.get_value(&key(k)).unwrap(), vec![row(k)], "key {}", k);
}

fn assert_absent(tree: &BPlusTree, k: u32) {
    assert!(tree.get_value(&key(k)).unwrap().is_empty(), "key {}", k);
}

fn collect_keys(tree: &BPlusTree) -> Vec<u32> {
    tree.iter()
        .unwrap()
        .map(|item| {
            let (k, _) = item.unwrap();
            u32::from_le_bytes(k[..4].try_into().unwrap())
        })
        .collect()
}

#[test]
fn test_empty_tree() {
    let (bpm, _temp) = create_bpm(16);
    let mut tree = small_tree(&bpm);

    assert!(tree.is_empty());
    assert_absent(&tree, 1);
    tree.remove(&key(1)).unwrap();
    assert_eq!(tree.iter().unwrap().count(), 0);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_insert_and_lookup() {
    let (bpm, _temp) = create_bpm(16);
    let mut tree = small_tree(&bpm);

    for k in [30u32, 10, 50, 20, 40] {
        tree.insert(&key(k), row(k)).unwrap();
    }

    for k in [10u32, 20, 30, 40, 50] {
        assert_contains(&tree, k);
    }
    assert_absent(&tree, 35);
    assert!(!tree.is_empty());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_duplicate_insert_is_rejected() {
    let (bpm, _temp) = create_bpm(16);
    let mut tree = small_tree(&bpm);

    tree.insert(&key(7), row(7)).unwrap();
    assert!(matches!(
        tree.insert(&key(7), row(8)),
        Err(SiltError::KeyAlreadyExists)
    ));

    // The original mapping is untouched.
    assert_contains(&tree, 7);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_fifth_insert_splits_the_root_leaf() {
    let (bpm, _temp) = create_bpm(16);
    let mut tree = small_tree(&bpm);

    for k in 1..=4u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }
    let leaf_root = tree.root_page_id();

    tree.insert(&key(5), row(5)).unwrap();
    assert_ne!(tree.root_page_id(), leaf_root);

    // The root is now internal with two leaf children holding all 5 keys.
    let guard = bpm.fetch_read_page(tree.root_page_id()).unwrap();
    let (left_id, right_id) = match NodePage::parse(guard.data()).unwrap() {
        NodePage::Internal(node) => {
            assert_eq!(node.size(), 2);
            (node.child_at(0), node.child_at(1))
        }
        NodePage::Leaf(_) => panic!("root should be internal after the split"),
    };
    drop(guard);

    let mut total = 0;
    for child in [left_id, right_id] {
        let guard = bpm.fetch_read_page(child).unwrap();
        match NodePage::parse(guard.data()).unwrap() {
            NodePage::Leaf(leaf) => total += leaf.size(),
            NodePage::Internal(_) => panic!("children of the first split are leaves"),
        }
    }
    assert_eq!(total, 5);

    assert_eq!(collect_keys(&tree), vec![1, 2, 3, 4, 5]);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_many_inserts_stay_ordered() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);

    let mut keys: Vec<u32> = (0..200).collect();
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);
    keys.shuffle(&mut rng);

    for &k in &keys {
        tree.insert(&key(k), row(k)).unwrap();
    }

    for k in 0..200 {
        assert_contains(&tree, k);
    }
    assert_eq!(collect_keys(&tree), (0..200).collect::<Vec<_>>());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_iter_from_starts_mid_tree() {
    let (bpm, _temp) = create_bpm(32);
    let mut tree = small_tree(&bpm);

    for k in (0..50).map(|i| i * 2) {
        tree.insert(&key(k), row(k)).unwrap();
    }

    // From an existing key.
    let keys: Vec<u32> = tree
        .iter_from(&key(40))
        .unwrap()
        .map(|item| u32::from_le_bytes(item.unwrap().0[..4].try_into().unwrap()))
        .collect();
    assert_eq!(keys[0], 40);
    assert_eq!(keys.len(), 30);

    // From a key between two entries: starts at the next larger one.
    let keys: Vec<u32> = tree
        .iter_from(&key(41))
        .unwrap()
        .map(|item| u32::from_le_bytes(item.unwrap().0[..4].try_into().unwrap()))
        .collect();
    assert_eq!(keys[0], 42);

    // From past the end: nothing.
    assert_eq!(tree.iter_from(&key(999)).unwrap().count(), 0);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_remove_missing_key_is_noop() {
    let (bpm, _temp) = create_bpm(16);
    let mut tree = small_tree(&bpm);

    for k in 1..=8u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }
    tree.remove(&key(100)).unwrap();

    assert_eq!(collect_keys(&tree).len(), 8);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_remove_ascending_drains_leftmost_nodes() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);

    for k in 1..=50u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }

    // Removing in ascending order keeps underflowing the leftmost child,
    // exercising the right-sibling rebalance path.
    for k in 1..=50u32 {
        tree.remove(&key(k)).unwrap();
        assert_absent(&tree, k);
        if k < 50 {
            assert_contains(&tree, k + 1);
        }
    }

    assert!(tree.is_empty());
    assert_eq!(tree.iter().unwrap().count(), 0);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_remove_descending_drains_rightmost_nodes() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);

    for k in 1..=50u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }

    for k in (1..=50u32).rev() {
        tree.remove(&key(k)).unwrap();
        assert_absent(&tree, k);
    }

    assert!(tree.is_empty());
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_root_collapses_as_the_tree_shrinks() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);

    // Deep tree, then drain it down to a handful of keys.
    for k in 1..=100u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }
    for k in 4..=100u32 {
        tree.remove(&key(k)).unwrap();
    }

    // Three keys fit in a single root leaf again.
    let guard = bpm.fetch_read_page(tree.root_page_id()).unwrap();
    match NodePage::parse(guard.data()).unwrap() {
        NodePage::Leaf(leaf) => {
            assert_eq!(leaf.size(), 3);
            assert!(leaf.parent_page_id().is_none());
        }
        NodePage::Internal(_) => panic!("root should have collapsed back into a leaf"),
    }
    drop(guard);

    assert_eq!(collect_keys(&tree), vec![1, 2, 3]);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_reinsert_after_emptying() {
    let (bpm, _temp) = create_bpm(32);
    let mut tree = small_tree(&bpm);

    for k in 1..=20u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }
    for k in 1..=20u32 {
        tree.remove(&key(k)).unwrap();
    }
    assert!(tree.is_empty());

    for k in [5u32, 1, 9] {
        tree.insert(&key(k), row(k)).unwrap();
    }
    assert_eq!(collect_keys(&tree), vec![1, 5, 9]);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_random_insert_remove_soak() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);
    let mut rng = rand::rngs::StdRng::seed_from_u64(42);

    let mut keys: Vec<u32> = (0..300).collect();
    keys.shuffle(&mut rng);
    for &k in &keys {
        tree.insert(&key(k), row(k)).unwrap();
    }

    let (removed, kept) = keys.split_at(150);
    let mut removed = removed.to_vec();
    removed.shuffle(&mut rng);
    for &k in &removed {
        tree.remove(&key(k)).unwrap();
    }

    for &k in &removed {
        assert_absent(&tree, k);
    }
    for &k in kept {
        assert_contains(&tree, k);
    }

    let mut expected: Vec<u32> = kept.to_vec();
    expected.sort_unstable();
    assert_eq!(collect_keys(&tree), expected);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_root_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let path = temp_file.path().to_path_buf();

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, dm));
        let mut tree =
            BPlusTree::with_max_sizes(7, Arc::clone(&bpm), Arc::new(U32Comparator), 4, 4, 4)
                .unwrap();

        for k in 1..=30u32 {
            tree.insert(&key(k), row(k)).unwrap();
        }
        bpm.flush_all_pages().unwrap();
        // Dropping the pool flushes the rest and the disk manager writes
        // its metadata page on the way out.
    }

    {
        let dm = Arc::new(DiskManager::new(&path).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, dm));
        let tree = BPlusTree::with_max_sizes(7, Arc::clone(&bpm), Arc::new(U32Comparator), 4, 4, 4)
            .unwrap();

        assert!(!tree.is_empty());
        for k in 1..=30u32 {
            assert_contains(&tree, k);
        }
        assert_eq!(collect_keys(&tree), (1..=30).collect::<Vec<_>>());
    }
}

#[test]
fn test_two_indexes_share_the_roots_page() {
    let (bpm, _temp) = create_bpm(32);
    let mut first =
        BPlusTree::with_max_sizes(1, Arc::clone(&bpm), Arc::new(U32Comparator), 4, 4, 4).unwrap();
    let mut second =
        BPlusTree::with_max_sizes(2, Arc::clone(&bpm), Arc::new(U32Comparator), 4, 4, 4).unwrap();

    for k in 1..=10u32 {
        first.insert(&key(k), row(k)).unwrap();
        second.insert(&key(k * 100), row(k * 100)).unwrap();
    }

    assert_contains(&first, 3);
    assert_absent(&first, 300);
    assert_contains(&second, 300);
    assert_absent(&second, 3);
    assert!(bpm.check_all_unpinned());
}

#[test]
fn test_destroy_frees_every_tree_page() {
    let (bpm, _temp) = create_bpm(64);
    let mut tree = small_tree(&bpm);

    for k in 1..=60u32 {
        tree.insert(&key(k), row(k)).unwrap();
    }
    let allocated_before = bpm.disk_manager().num_allocated_pages();
    assert!(allocated_before > 1);

    tree.destroy().unwrap();

    assert!(tree.is_empty());
    // Only the reserved index roots page remains allocated.
    assert_eq!(bpm.disk_manager().num_allocated_pages(), 1);
    assert!(bpm.check_all_unpinned());
}
