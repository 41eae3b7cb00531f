use std::sync::Arc;

use siltdb::buffer::BufferPoolManager;
use siltdb::common::{RowId, DEFAULT_BUFFER_POOL_SIZE};
use siltdb::index::{BPlusTree, U32Comparator};
use siltdb::storage::disk::DiskManager;
use siltdb::PageId;

fn main() {
    env_logger::init();

    println!("siltdb - disk-backed storage engine");
    println!("===================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("failed to open backing file"));
    println!("Opened backing file: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(
        DEFAULT_BUFFER_POOL_SIZE,
        disk_manager,
    ));
    println!(
        "Created buffer pool with {} frames\n",
        DEFAULT_BUFFER_POOL_SIZE
    );

    let mut index = BPlusTree::new(1, Arc::clone(&bpm), Arc::new(U32Comparator), 4)
        .expect("failed to open index");

    // Insert a handful of keys out of order.
    for key in [30u32, 10, 50, 20, 40] {
        index
            .insert(&key.to_le_bytes(), RowId::new(PageId::new(100), key))
            .expect("insert failed");
        println!("Inserted key={}", key);
    }

    let hits = index
        .get_value(&20u32.to_le_bytes())
        .expect("lookup failed");
    println!("\nLookup key=20 -> {:?}", hits);

    println!("\nOrdered scan:");
    for item in index.iter().expect("failed to open cursor") {
        let (key, row_id) = item.expect("scan failed");
        let key = u32::from_le_bytes(key[..4].try_into().unwrap());
        println!("  key={} row={:?}", key, row_id);
    }

    index.remove(&30u32.to_le_bytes()).expect("remove failed");
    println!(
        "\nRemoved key=30; lookup now finds {} entries",
        index.get_value(&30u32.to_le_bytes()).unwrap().len()
    );

    index.destroy().expect("destroy failed");
    println!("Destroyed the index; empty={}", index.is_empty());

    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
