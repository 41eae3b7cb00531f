pub mod btree;
pub mod index_iterator;
pub mod index_roots;
pub mod key_comparator;
pub mod tree_page;

pub use btree::BPlusTree;
pub use index_iterator::IndexIterator;
pub use index_roots::IndexRootsPage;
pub use key_comparator::{BytewiseComparator, KeyComparator, U32Comparator};
pub use tree_page::{InternalView, InternalViewMut, LeafView, LeafViewMut, NodePage, NodeType};
