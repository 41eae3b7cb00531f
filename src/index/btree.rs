use std::sync::Arc;

use bytes::Bytes;
use log::warn;

use crate::buffer::{BufferPoolManager, WritePageGuard};
use crate::common::{
    IndexId, PageId, Result, RowId, SiltError, INDEX_ROOTS_PAGE_ID, INVALID_PAGE_ID,
};

use super::index_iterator::IndexIterator;
use super::index_roots::IndexRootsPage;
use super::key_comparator::KeyComparator;
use super::tree_page::{
    internal_capacity, leaf_capacity, InternalView, InternalViewMut, LeafView, LeafViewMut,
    NodePage, NodeType,
};
use super::tree_page;

/// Disk-resident B+Tree over fixed-size keys, with unique-key semantics.
///
/// Every node is one buffer-pool page; all traversal correctness rests on
/// pin/unpin discipline, which the page guards enforce by scope. The root
/// page id is mirrored into the index roots directory on every change so
/// the tree survives restarts.
///
/// Running out of frames or disk space in the middle of a structural
/// mutation aborts that operation with partial page linkage possibly
/// already written; callers must not assume atomicity across a split or
/// merge.
pub struct BPlusTree {
    index_id: IndexId,
    root_page_id: PageId,
    bpm: Arc<BufferPoolManager>,
    comparator: Arc<dyn KeyComparator>,
    key_size: usize,
    leaf_max_size: u32,
    internal_max_size: u32,
}

impl BPlusTree {
    /// Opens (or creates) the tree for `index_id`, with node fan-out
    /// derived from the page geometry. The recorded root, if any, is
    /// recovered from the index roots directory.
    pub fn new(
        index_id: IndexId,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
    ) -> Result<Self> {
        let leaf_max = leaf_capacity(key_size);
        let internal_max = internal_capacity(key_size);
        Self::with_max_sizes(index_id, bpm, comparator, key_size, leaf_max, internal_max)
    }

    /// Like [`BPlusTree::new`] with explicit node capacities; small values
    /// force deep trees out of few keys.
    pub fn with_max_sizes(
        index_id: IndexId,
        bpm: Arc<BufferPoolManager>,
        comparator: Arc<dyn KeyComparator>,
        key_size: usize,
        leaf_max_size: u32,
        internal_max_size: u32,
    ) -> Result<Self> {
        assert!(leaf_max_size >= 2 && internal_max_size >= 3);
        assert!(leaf_max_size <= leaf_capacity(key_size));
        assert!(internal_max_size <= internal_capacity(key_size));

        IndexRootsPage::bootstrap(&bpm)?;
        let root_page_id = {
            let guard = bpm.fetch_read_page(INDEX_ROOTS_PAGE_ID)?;
            IndexRootsPage::get(guard.data(), index_id)?.unwrap_or(INVALID_PAGE_ID)
        };

        Ok(Self {
            index_id,
            root_page_id,
            bpm,
            comparator,
            key_size,
            leaf_max_size,
            internal_max_size,
        })
    }

    pub fn index_id(&self) -> IndexId {
        self.index_id
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn is_empty(&self) -> bool {
        self.root_page_id == INVALID_PAGE_ID
    }

    /// Point lookup: the row ids associated with `key` (empty or a single
    /// entry under unique-key semantics).
    pub fn get_value(&self, key: &[u8]) -> Result<Vec<RowId>> {
        assert_eq!(key.len(), self.key_size, "key length must match the index");
        if self.is_empty() {
            return Ok(Vec::new());
        }

        let leaf_id = self.find_leaf_page(key, false)?;
        let guard = self.bpm.fetch_read_page(leaf_id)?;
        let leaf = LeafView::parse(guard.data())?;
        Ok(leaf
            .lookup(key, self.comparator.as_ref())
            .into_iter()
            .collect())
    }

    /// Inserts a unique key. Fails with `KeyAlreadyExists` on duplicates;
    /// splits propagate upward as far as needed, growing a new root when
    /// they bubble past the top.
    pub fn insert(&mut self, key: &[u8], row_id: RowId) -> Result<()> {
        assert_eq!(key.len(), self.key_size, "key length must match the index");
        if self.is_empty() {
            return self.start_new_tree(key, row_id);
        }
        self.insert_into_leaf(key, row_id)
    }

    /// Deletes `key` if present (a no-op otherwise), rebalancing with
    /// merges and redistributions whenever a node underflows.
    pub fn remove(&mut self, key: &[u8]) -> Result<()> {
        assert_eq!(key.len(), self.key_size, "key length must match the index");
        if self.is_empty() {
            return Ok(());
        }

        let leaf_id = self.find_leaf_page(key, false)?;
        let needs_rebalance = {
            let mut guard = self.bpm.fetch_write_page(leaf_id)?;
            let mut leaf = LeafViewMut::parse(guard.data_mut())?;
            if !leaf.remove(key, self.comparator.as_ref()) {
                return Ok(());
            }
            let size = leaf.size();
            // A root leaf has no minimum, but draining it empties the tree.
            size < leaf.min_size() || (leaf.is_root() && size == 0)
        };

        if needs_rebalance {
            self.coalesce_or_redistribute(leaf_id)?;
        }
        Ok(())
    }

    /// Cursor over the whole tree, starting at the leftmost leaf.
    pub fn iter(&self) -> Result<IndexIterator> {
        if self.is_empty() {
            return Ok(IndexIterator::exhausted(Arc::clone(&self.bpm)));
        }
        let leaf_id = self.find_leaf_page(&[], true)?;
        IndexIterator::new(Arc::clone(&self.bpm), leaf_id, 0)
    }

    /// Cursor positioned at the first entry whose key is >= `key`.
    pub fn iter_from(&self, key: &[u8]) -> Result<IndexIterator> {
        assert_eq!(key.len(), self.key_size, "key length must match the index");
        if self.is_empty() {
            return Ok(IndexIterator::exhausted(Arc::clone(&self.bpm)));
        }

        let leaf_id = self.find_leaf_page(key, false)?;
        let item_index = {
            let guard = self.bpm.fetch_read_page(leaf_id)?;
            LeafView::parse(guard.data())?.key_index(key, self.comparator.as_ref())
        };
        IndexIterator::new(Arc::clone(&self.bpm), leaf_id, item_index)
    }

    /// Frees every page the tree owns and drops its entry from the index
    /// roots directory.
    pub fn destroy(&mut self) -> Result<()> {
        if !self.is_empty() {
            let root = self.root_page_id;
            self.destroy_subtree(root)?;
            self.root_page_id = INVALID_PAGE_ID;
        }
        let mut guard = self.bpm.fetch_write_page(INDEX_ROOTS_PAGE_ID)?;
        IndexRootsPage::remove(guard.data_mut(), self.index_id)
    }

    /// Descends from the root to the leaf responsible for `key` (or the
    /// leftmost leaf), unpinning each level before stepping into the next.
    fn find_leaf_page(&self, key: &[u8], leftmost: bool) -> Result<PageId> {
        let mut page_id = self.root_page_id;
        loop {
            let guard = self.bpm.fetch_read_page(page_id)?;
            page_id = match NodePage::parse(guard.data())? {
                NodePage::Leaf(_) => return Ok(page_id),
                NodePage::Internal(node) => {
                    if leftmost {
                        node.child_at(0)
                    } else {
                        node.lookup(key, self.comparator.as_ref())
                    }
                }
            };
        }
    }

    fn start_new_tree(&mut self, key: &[u8], row_id: RowId) -> Result<()> {
        let (page_id, mut guard) = self.bpm.new_page()?;
        let mut leaf = LeafViewMut::init(
            guard.data_mut(),
            page_id,
            None,
            self.key_size,
            self.leaf_max_size,
        );
        leaf.insert(key, row_id, self.comparator.as_ref());
        drop(guard);
        self.set_root(page_id)
    }

    fn insert_into_leaf(&mut self, key: &[u8], row_id: RowId) -> Result<()> {
        let leaf_id = self.find_leaf_page(key, false)?;
        let mut guard = self.bpm.fetch_write_page(leaf_id)?;

        let needs_split = {
            let mut leaf = LeafViewMut::parse(guard.data_mut())?;
            if leaf.lookup(key, self.comparator.as_ref()).is_some() {
                return Err(SiltError::KeyAlreadyExists);
            }
            leaf.insert(key, row_id, self.comparator.as_ref());
            leaf.size() > leaf.max_size()
        };

        if needs_split {
            self.split_leaf(leaf_id, guard)?;
        }
        Ok(())
    }

    /// Splits an overflowing leaf: the upper half of its entries moves to a
    /// fresh leaf spliced into the chain, and the new leaf's first key
    /// becomes the separator pushed into the parent.
    fn split_leaf(&mut self, leaf_id: PageId, mut guard: WritePageGuard) -> Result<()> {
        let (new_leaf_id, mut new_guard) = self.bpm.new_page()?;

        let parent;
        let separator;
        {
            let mut leaf = LeafViewMut::parse(guard.data_mut())?;
            parent = leaf.parent_page_id();
            let old_next = leaf.next_page_id();
            let moved = leaf.split();
            leaf.set_next_page_id(Some(new_leaf_id));

            let mut new_leaf = LeafViewMut::init(
                new_guard.data_mut(),
                new_leaf_id,
                parent,
                self.key_size,
                self.leaf_max_size,
            );
            new_leaf.append_pairs(&moved);
            new_leaf.set_next_page_id(old_next);
            separator = moved[0].0.clone();
        }

        // Both halves must be unpinned before the split propagates: the
        // parent path below re-fetches them to rewrite parent links.
        drop(guard);
        drop(new_guard);
        self.insert_into_parent(leaf_id, parent, separator, new_leaf_id)
    }

    /// Splits an overflowing internal node. Moved children are re-parented
    /// onto the new node; the first moved key travels up as the separator.
    fn split_internal(&mut self, node_id: PageId, mut guard: WritePageGuard) -> Result<()> {
        let (new_node_id, mut new_guard) = self.bpm.new_page()?;

        let parent;
        let moved;
        {
            let mut node = InternalViewMut::parse(guard.data_mut())?;
            parent = node.parent_page_id();
            moved = node.split();

            let mut new_node = InternalViewMut::init(
                new_guard.data_mut(),
                new_node_id,
                parent,
                self.key_size,
                self.internal_max_size,
            );
            new_node.append_entries(&moved);
        }
        drop(guard);
        drop(new_guard);

        for (_, child) in &moved {
            self.set_node_parent(*child, Some(new_node_id))?;
        }

        let separator = moved[0].0.clone();
        self.insert_into_parent(node_id, parent, separator, new_node_id)
    }

    /// Records `right_id` (with `separator`) next to `left_id` in their
    /// parent, creating a new root when the split bubbled past the top and
    /// recursing when the parent overflows in turn.
    fn insert_into_parent(
        &mut self,
        left_id: PageId,
        parent: Option<PageId>,
        separator: Bytes,
        right_id: PageId,
    ) -> Result<()> {
        let Some(parent_id) = parent else {
            let (root_id, mut guard) = self.bpm.new_page()?;
            let mut root = InternalViewMut::init(
                guard.data_mut(),
                root_id,
                None,
                self.key_size,
                self.internal_max_size,
            );
            root.populate_new_root(left_id, &separator, right_id);
            drop(guard);

            self.set_node_parent(left_id, Some(root_id))?;
            self.set_node_parent(right_id, Some(root_id))?;
            return self.set_root(root_id);
        };

        let mut guard = self.bpm.fetch_write_page(parent_id)?;
        let needs_split = {
            let mut node = InternalViewMut::parse(guard.data_mut())?;
            node.insert_after(left_id, &separator, right_id)?;
            node.size() > node.max_size()
        };

        if needs_split {
            self.split_internal(parent_id, guard)?;
        }
        Ok(())
    }

    /// Rebalances an underflowing node: borrow from a sibling when the two
    /// together overflow one node, merge otherwise. The sibling is the left
    /// neighbour except for the leftmost child, which pairs with its right
    /// neighbour.
    fn coalesce_or_redistribute(&mut self, page_id: PageId) -> Result<()> {
        let (parent, node_size, kind) = {
            let guard = self.bpm.fetch_read_page(page_id)?;
            let node = NodePage::parse(guard.data())?;
            let kind = match node {
                NodePage::Leaf(_) => NodeType::Leaf,
                NodePage::Internal(_) => NodeType::Internal,
            };
            (node.parent_page_id(), node.size(), kind)
        };

        let Some(parent_id) = parent else {
            return self.adjust_root(page_id);
        };

        let (node_index, sibling_id) = {
            let guard = self.bpm.fetch_read_page(parent_id)?;
            let parent = InternalView::parse(guard.data())?;
            let index = parent.value_index(page_id).ok_or(SiltError::CorruptPage {
                page_id: parent_id,
                reason: "underflowing node missing from its parent",
            })?;
            let sibling_index = if index == 0 { 1 } else { index - 1 };
            (index, parent.child_at(sibling_index))
        };

        let sibling_size = {
            let guard = self.bpm.fetch_read_page(sibling_id)?;
            NodePage::parse(guard.data())?.size()
        };

        let max_size = match kind {
            NodeType::Leaf => self.leaf_max_size,
            NodeType::Internal => self.internal_max_size,
        } as usize;

        if node_size + sibling_size <= max_size {
            let (left_id, right_id, right_index) = if node_index == 0 {
                (page_id, sibling_id, 1)
            } else {
                (sibling_id, page_id, node_index)
            };
            self.merge(kind, left_id, right_id, parent_id, right_index)
        } else {
            self.redistribute(kind, page_id, sibling_id, parent_id, node_index)
        }
    }

    /// Absorbs `right_id` into `left_id`, deletes the absorbed page, drops
    /// its separator from the parent, and recurses when the parent itself
    /// underflows.
    fn merge(
        &mut self,
        kind: NodeType,
        left_id: PageId,
        right_id: PageId,
        parent_id: PageId,
        right_index: usize,
    ) -> Result<()> {
        match kind {
            NodeType::Leaf => {
                let (moved, right_next) = {
                    let mut guard = self.bpm.fetch_write_page(right_id)?;
                    let mut right = LeafViewMut::parse(guard.data_mut())?;
                    let next = right.next_page_id();
                    (right.take_all(), next)
                };
                let mut guard = self.bpm.fetch_write_page(left_id)?;
                let mut left = LeafViewMut::parse(guard.data_mut())?;
                left.append_pairs(&moved);
                left.set_next_page_id(right_next);
            }
            NodeType::Internal => {
                let separator = {
                    let guard = self.bpm.fetch_read_page(parent_id)?;
                    Bytes::copy_from_slice(InternalView::parse(guard.data())?.key_at(right_index))
                };
                let moved = {
                    let mut guard = self.bpm.fetch_write_page(right_id)?;
                    InternalViewMut::parse(guard.data_mut())?.take_entries()
                };
                {
                    let mut guard = self.bpm.fetch_write_page(left_id)?;
                    let mut left = InternalViewMut::parse(guard.data_mut())?;
                    // The separator comes down from the parent in place of
                    // the absorbed node's dummy key.
                    left.push_back(&separator, moved[0].1);
                    for (key, child) in &moved[1..] {
                        left.push_back(key, *child);
                    }
                }
                for (_, child) in &moved {
                    self.set_node_parent(*child, Some(left_id))?;
                }
            }
        }

        if !self.bpm.delete_page(right_id)? {
            warn!("absorbed page {} still pinned after merge", right_id);
        }

        let parent_underflow = {
            let mut guard = self.bpm.fetch_write_page(parent_id)?;
            let mut parent = InternalViewMut::parse(guard.data_mut())?;
            parent.remove_at(right_index);
            parent.size() < parent.min_size()
        };
        if parent_underflow {
            self.coalesce_or_redistribute(parent_id)?;
        }
        Ok(())
    }

    /// Moves one entry across the boundary between `node_id` and its
    /// sibling, rewriting the parent separator to match.
    fn redistribute(
        &mut self,
        kind: NodeType,
        node_id: PageId,
        sibling_id: PageId,
        parent_id: PageId,
        node_index: usize,
    ) -> Result<()> {
        match kind {
            NodeType::Leaf => {
                if node_index == 0 {
                    // Borrow the right sibling's first entry.
                    let (key, row_id, sibling_first) = {
                        let mut guard = self.bpm.fetch_write_page(sibling_id)?;
                        let mut sibling = LeafViewMut::parse(guard.data_mut())?;
                        let (key, row_id) = sibling.pop_front();
                        let first = Bytes::copy_from_slice(sibling.key_at(0));
                        (key, row_id, first)
                    };
                    {
                        let mut guard = self.bpm.fetch_write_page(node_id)?;
                        LeafViewMut::parse(guard.data_mut())?.push_back(&key, row_id);
                    }
                    let mut guard = self.bpm.fetch_write_page(parent_id)?;
                    InternalViewMut::parse(guard.data_mut())?.set_key_at(1, &sibling_first);
                } else {
                    // Borrow the left sibling's last entry.
                    let (key, row_id) = {
                        let mut guard = self.bpm.fetch_write_page(sibling_id)?;
                        LeafViewMut::parse(guard.data_mut())?.pop_back()
                    };
                    {
                        let mut guard = self.bpm.fetch_write_page(node_id)?;
                        LeafViewMut::parse(guard.data_mut())?.push_front(&key, row_id);
                    }
                    let mut guard = self.bpm.fetch_write_page(parent_id)?;
                    InternalViewMut::parse(guard.data_mut())?.set_key_at(node_index, &key);
                }
            }
            NodeType::Internal => {
                if node_index == 0 {
                    // The borrowed child takes the parent separator as its
                    // key; the sibling's vacated key replaces the separator.
                    let separator = {
                        let guard = self.bpm.fetch_read_page(parent_id)?;
                        Bytes::copy_from_slice(InternalView::parse(guard.data())?.key_at(1))
                    };
                    let (moved_child, new_separator) = {
                        let mut guard = self.bpm.fetch_write_page(sibling_id)?;
                        let mut sibling = InternalViewMut::parse(guard.data_mut())?;
                        let new_separator = Bytes::copy_from_slice(sibling.key_at(1));
                        let (_, child) = sibling.pop_front();
                        (child, new_separator)
                    };
                    {
                        let mut guard = self.bpm.fetch_write_page(node_id)?;
                        InternalViewMut::parse(guard.data_mut())?.push_back(&separator, moved_child);
                    }
                    self.set_node_parent(moved_child, Some(node_id))?;
                    let mut guard = self.bpm.fetch_write_page(parent_id)?;
                    InternalViewMut::parse(guard.data_mut())?.set_key_at(1, &new_separator);
                } else {
                    let separator = {
                        let guard = self.bpm.fetch_read_page(parent_id)?;
                        Bytes::copy_from_slice(
                            InternalView::parse(guard.data())?.key_at(node_index),
                        )
                    };
                    let (key, moved_child) = {
                        let mut guard = self.bpm.fetch_write_page(sibling_id)?;
                        InternalViewMut::parse(guard.data_mut())?.pop_back()
                    };
                    {
                        let mut guard = self.bpm.fetch_write_page(node_id)?;
                        InternalViewMut::parse(guard.data_mut())?.push_front(moved_child, &separator);
                    }
                    self.set_node_parent(moved_child, Some(node_id))?;
                    let mut guard = self.bpm.fetch_write_page(parent_id)?;
                    InternalViewMut::parse(guard.data_mut())?.set_key_at(node_index, &key);
                }
            }
        }
        Ok(())
    }

    /// Collapses the root when rebalancing drained it: an internal root
    /// with a single child hands the tree over to that child, and an empty
    /// root leaf empties the tree.
    fn adjust_root(&mut self, root_id: PageId) -> Result<()> {
        enum RootChange {
            Promote(PageId),
            Clear,
            Keep,
        }

        let change = {
            let guard = self.bpm.fetch_read_page(root_id)?;
            match NodePage::parse(guard.data())? {
                NodePage::Internal(node) if node.size() == 1 => {
                    RootChange::Promote(node.child_at(0))
                }
                NodePage::Leaf(leaf) if leaf.size() == 0 => RootChange::Clear,
                _ => RootChange::Keep,
            }
        };

        match change {
            RootChange::Promote(child) => {
                self.set_node_parent(child, None)?;
                if !self.bpm.delete_page(root_id)? {
                    warn!("old root {} still pinned after collapse", root_id);
                }
                self.set_root(child)
            }
            RootChange::Clear => {
                if !self.bpm.delete_page(root_id)? {
                    warn!("old root {} still pinned after collapse", root_id);
                }
                self.set_root(INVALID_PAGE_ID)
            }
            RootChange::Keep => Ok(()),
        }
    }

    fn destroy_subtree(&mut self, page_id: PageId) -> Result<()> {
        let children = {
            let guard = self.bpm.fetch_read_page(page_id)?;
            match NodePage::parse(guard.data())? {
                NodePage::Leaf(_) => Vec::new(),
                NodePage::Internal(node) => (0..node.size()).map(|i| node.child_at(i)).collect(),
            }
        };
        for child in children {
            self.destroy_subtree(child)?;
        }
        if !self.bpm.delete_page(page_id)? {
            return Err(SiltError::PageStillPinned(page_id));
        }
        Ok(())
    }

    fn set_node_parent(&self, page_id: PageId, parent: Option<PageId>) -> Result<()> {
        let mut guard = self.bpm.fetch_write_page(page_id)?;
        tree_page::set_parent(guard.data_mut(), parent)
    }

    /// Points the tree at a new root and mirrors the change into the index
    /// roots directory.
    fn set_root(&mut self, new_root: PageId) -> Result<()> {
        self.root_page_id = new_root;
        let mut guard = self.bpm.fetch_write_page(INDEX_ROOTS_PAGE_ID)?;
        IndexRootsPage::set(guard.data_mut(), self.index_id, new_root)
    }
}
