//! On-disk layout of B+Tree node pages.
//!
//! Both node kinds share one packed little-endian header:
//!
//! ```text
//! [page_type: u8][pad: 7][lsn: u64][size: u32][max_size: u32]
//! [parent_page_id: u32][page_id: u32][key_size: u32]
//! ```
//!
//! An internal node follows the header with `size` packed
//! `(key, child_page_id)` pairs, where `key[0]` is a dummy separator and
//! `child[i]`'s subtree holds keys in `[key[i], key[i+1])`. A leaf first
//! stores a `next_page_id: u32` link (the sorted leaf chain) and then
//! `size` packed `(key, row_id)` pairs.
//!
//! Page bytes are only ever exposed through the typed views below, each of
//! which validates the header tag before handing out accessors.

use std::cmp::Ordering;

use bytes::Bytes;

use crate::common::{PageId, Result, RowId, SiltError, INVALID_PAGE_ID, PAGE_SIZE};

use super::key_comparator::KeyComparator;

const PAGE_TYPE_OFFSET: usize = 0;
const LSN_OFFSET: usize = 8;
const SIZE_OFFSET: usize = 16;
const MAX_SIZE_OFFSET: usize = 20;
const PARENT_OFFSET: usize = 24;
const PAGE_ID_OFFSET: usize = 28;
const KEY_SIZE_OFFSET: usize = 32;

/// Header bytes shared by both node kinds
pub const NODE_HEADER_SIZE: usize = 36;
const NEXT_PAGE_OFFSET: usize = 36;
/// Header bytes of a leaf node (adds the chain link)
pub const LEAF_HEADER_SIZE: usize = 40;

/// Bytes of a serialized RowId (page id + slot)
pub const ROW_ID_SIZE: usize = 8;
const CHILD_ID_SIZE: usize = 4;

const NODE_TYPE_LEAF: u8 = 1;
const NODE_TYPE_INTERNAL: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Leaf,
    Internal,
}

/// Largest number of entries a leaf can hold while leaving room for the
/// transient extra entry present between an insert and the split it
/// triggers.
pub fn leaf_capacity(key_size: usize) -> u32 {
    ((PAGE_SIZE - LEAF_HEADER_SIZE) / (key_size + ROW_ID_SIZE) - 1) as u32
}

/// Internal-node counterpart of [`leaf_capacity`], counted in children.
pub fn internal_capacity(key_size: usize) -> u32 {
    ((PAGE_SIZE - NODE_HEADER_SIZE) / (key_size + CHILD_ID_SIZE) - 1) as u32
}

fn get_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

fn get_u64(data: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(data[offset..offset + 8].try_into().unwrap())
}

fn put_u64(data: &mut [u8], offset: usize, value: u64) {
    data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn get_page_ref(data: &[u8], offset: usize) -> Option<PageId> {
    let raw = get_u32(data, offset);
    if raw == INVALID_PAGE_ID.as_u32() {
        None
    } else {
        Some(PageId::new(raw))
    }
}

fn put_page_ref(data: &mut [u8], offset: usize, page_id: Option<PageId>) {
    put_u32(
        data,
        offset,
        page_id.unwrap_or(INVALID_PAGE_ID).as_u32(),
    );
}

fn corrupt(data: &[u8], reason: &'static str) -> SiltError {
    SiltError::CorruptPage {
        page_id: PageId::new(get_u32(data, PAGE_ID_OFFSET)),
        reason,
    }
}

/// Reads and validates the header tag of a node page.
pub fn node_type(data: &[u8]) -> Result<NodeType> {
    match data[PAGE_TYPE_OFFSET] {
        NODE_TYPE_LEAF => Ok(NodeType::Leaf),
        NODE_TYPE_INTERNAL => Ok(NodeType::Internal),
        _ => Err(corrupt(data, "unknown node type tag")),
    }
}

/// Rewrites the parent link of a node of either kind, after validating that
/// the page actually is a tree node.
pub fn set_parent(data: &mut [u8], parent: Option<PageId>) -> Result<()> {
    node_type(data)?;
    put_page_ref(data, PARENT_OFFSET, parent);
    Ok(())
}

fn stamp_header(
    data: &mut [u8],
    tag: u8,
    page_id: PageId,
    parent: Option<PageId>,
    key_size: usize,
    max_size: u32,
) {
    assert_eq!(data.len(), PAGE_SIZE, "node must cover a whole page");
    data.fill(0);
    data[PAGE_TYPE_OFFSET] = tag;
    put_u32(data, SIZE_OFFSET, 0);
    put_u32(data, MAX_SIZE_OFFSET, max_size);
    put_page_ref(data, PARENT_OFFSET, parent);
    put_u32(data, PAGE_ID_OFFSET, page_id.as_u32());
    put_u32(data, KEY_SIZE_OFFSET, key_size as u32);
}

/// LSN carried for the logging layer; not interpreted here.
pub fn lsn(data: &[u8]) -> u64 {
    get_u64(data, LSN_OFFSET)
}

pub fn set_lsn(data: &mut [u8], lsn: u64) {
    put_u64(data, LSN_OFFSET, lsn);
}

/// Read-only dispatch over the two node kinds.
pub enum NodePage<'a> {
    Leaf(LeafView<'a>),
    Internal(InternalView<'a>),
}

impl<'a> NodePage<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        match node_type(data)? {
            NodeType::Leaf => Ok(NodePage::Leaf(LeafView { data })),
            NodeType::Internal => Ok(NodePage::Internal(InternalView { data })),
        }
    }

    pub fn size(&self) -> usize {
        match self {
            NodePage::Leaf(leaf) => leaf.size(),
            NodePage::Internal(node) => node.size(),
        }
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        match self {
            NodePage::Leaf(leaf) => leaf.parent_page_id(),
            NodePage::Internal(node) => node.parent_page_id(),
        }
    }

    pub fn min_size(&self) -> usize {
        match self {
            NodePage::Leaf(leaf) => leaf.min_size(),
            NodePage::Internal(node) => node.min_size(),
        }
    }
}

/// Read-only view of a leaf node.
pub struct LeafView<'a> {
    data: &'a [u8],
}

impl<'a> LeafView<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE);
        match node_type(data)? {
            NodeType::Leaf => Ok(Self { data }),
            NodeType::Internal => Err(corrupt(data, "expected a leaf node")),
        }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        get_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn key_size(&self) -> usize {
        get_u32(self.data, KEY_SIZE_OFFSET) as usize
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        get_page_ref(self.data, PARENT_OFFSET)
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id().is_none()
    }

    /// A root leaf has no minimum; any other leaf must stay at or above
    /// half of its capacity.
    pub fn min_size(&self) -> usize {
        if self.is_root() {
            0
        } else {
            self.max_size() / 2
        }
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        get_page_ref(self.data, NEXT_PAGE_OFFSET)
    }

    fn pair_size(&self) -> usize {
        self.key_size() + ROW_ID_SIZE
    }

    fn pair_offset(&self, index: usize) -> usize {
        LEAF_HEADER_SIZE + index * self.pair_size()
    }

    pub fn key_at(&self, index: usize) -> &'a [u8] {
        let off = self.pair_offset(index);
        &self.data[off..off + self.key_size()]
    }

    pub fn row_at(&self, index: usize) -> RowId {
        let off = self.pair_offset(index) + self.key_size();
        RowId::new(
            PageId::new(get_u32(self.data, off)),
            get_u32(self.data, off + 4),
        )
    }

    /// First index whose key is >= `key`; `size()` when every key is
    /// smaller.
    pub fn key_index(&self, key: &[u8], comparator: &dyn KeyComparator) -> usize {
        let mut left = 0;
        let mut right = self.size();
        while left < right {
            let mid = left + (right - left) / 2;
            if comparator.compare(self.key_at(mid), key) == Ordering::Less {
                left = mid + 1;
            } else {
                right = mid;
            }
        }
        left
    }

    /// Exact-match lookup.
    pub fn lookup(&self, key: &[u8], comparator: &dyn KeyComparator) -> Option<RowId> {
        let index = self.key_index(key, comparator);
        if index < self.size() && comparator.compare(self.key_at(index), key) == Ordering::Equal {
            Some(self.row_at(index))
        } else {
            None
        }
    }
}

/// Mutable view of a leaf node.
pub struct LeafViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> LeafViewMut<'a> {
    pub fn parse(data: &'a mut [u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE);
        match node_type(data)? {
            NodeType::Leaf => Ok(Self { data }),
            NodeType::Internal => Err(corrupt(data, "expected a leaf node")),
        }
    }

    /// Stamps a fresh, empty leaf over the page.
    pub fn init(
        data: &'a mut [u8],
        page_id: PageId,
        parent: Option<PageId>,
        key_size: usize,
        max_size: u32,
    ) -> Self {
        stamp_header(data, NODE_TYPE_LEAF, page_id, parent, key_size, max_size);
        put_page_ref(data, NEXT_PAGE_OFFSET, None);
        Self { data }
    }

    fn as_view(&self) -> LeafView<'_> {
        LeafView { data: self.data }
    }

    pub fn page_id(&self) -> PageId {
        self.as_view().page_id()
    }

    pub fn size(&self) -> usize {
        self.as_view().size()
    }

    pub fn max_size(&self) -> usize {
        self.as_view().max_size()
    }

    pub fn key_size(&self) -> usize {
        self.as_view().key_size()
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        self.as_view().parent_page_id()
    }

    pub fn min_size(&self) -> usize {
        self.as_view().min_size()
    }

    pub fn is_root(&self) -> bool {
        self.as_view().is_root()
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        self.as_view().next_page_id()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let off = self.pair_offset(index);
        let key_size = self.key_size();
        &self.data[off..off + key_size]
    }

    pub fn row_at(&self, index: usize) -> RowId {
        self.as_view().row_at(index)
    }

    pub fn key_index(&self, key: &[u8], comparator: &dyn KeyComparator) -> usize {
        self.as_view().key_index(key, comparator)
    }

    pub fn lookup(&self, key: &[u8], comparator: &dyn KeyComparator) -> Option<RowId> {
        self.as_view().lookup(key, comparator)
    }

    pub fn set_parent_page_id(&mut self, parent: Option<PageId>) {
        put_page_ref(self.data, PARENT_OFFSET, parent);
    }

    pub fn set_next_page_id(&mut self, next: Option<PageId>) {
        put_page_ref(self.data, NEXT_PAGE_OFFSET, next);
    }

    fn set_size(&mut self, size: usize) {
        put_u32(self.data, SIZE_OFFSET, size as u32);
    }

    fn pair_size(&self) -> usize {
        self.as_view().pair_size()
    }

    fn pair_offset(&self, index: usize) -> usize {
        self.as_view().pair_offset(index)
    }

    fn write_pair(&mut self, index: usize, key: &[u8], row_id: RowId) {
        let key_size = self.key_size();
        assert_eq!(key.len(), key_size, "key length must match the node");
        let off = self.pair_offset(index);
        self.data[off..off + key_size].copy_from_slice(key);
        put_u32(self.data, off + key_size, row_id.page_id.as_u32());
        put_u32(self.data, off + key_size + 4, row_id.slot);
    }

    /// Inserts the pair at its sorted position and returns the new size.
    /// The caller checks for duplicates first.
    pub fn insert(&mut self, key: &[u8], row_id: RowId, comparator: &dyn KeyComparator) -> usize {
        let size = self.size();
        let index = self.key_index(key, comparator);
        let pair = self.pair_size();
        let start = self.pair_offset(index);
        let end = self.pair_offset(size);
        self.data.copy_within(start..end, start + pair);
        self.write_pair(index, key, row_id);
        self.set_size(size + 1);
        size + 1
    }

    /// Deletes the pair matching `key`; false when the key is absent.
    pub fn remove(&mut self, key: &[u8], comparator: &dyn KeyComparator) -> bool {
        let size = self.size();
        let index = self.key_index(key, comparator);
        if index >= size || comparator.compare(self.key_at(index), key) != Ordering::Equal {
            return false;
        }
        let start = self.pair_offset(index);
        let end = self.pair_offset(size);
        let pair = self.pair_size();
        self.data.copy_within(start + pair..end, start);
        self.set_size(size - 1);
        true
    }

    /// Moves the upper half of the entries out (for the new sibling during
    /// a split) and truncates this leaf to the lower half.
    pub fn split(&mut self) -> Vec<(Bytes, RowId)> {
        let size = self.size();
        let start = size / 2;
        let moved = (start..size)
            .map(|i| (Bytes::copy_from_slice(self.key_at(i)), self.row_at(i)))
            .collect();
        self.set_size(start);
        moved
    }

    /// Moves every entry out, leaving this leaf empty (merge support).
    pub fn take_all(&mut self) -> Vec<(Bytes, RowId)> {
        let size = self.size();
        let moved = (0..size)
            .map(|i| (Bytes::copy_from_slice(self.key_at(i)), self.row_at(i)))
            .collect();
        self.set_size(0);
        moved
    }

    /// Appends one pair, which must sort after every existing key.
    pub fn push_back(&mut self, key: &[u8], row_id: RowId) {
        let size = self.size();
        self.write_pair(size, key, row_id);
        self.set_size(size + 1);
    }

    /// Prepends one pair, which must sort before every existing key.
    pub fn push_front(&mut self, key: &[u8], row_id: RowId) {
        let size = self.size();
        let pair = self.pair_size();
        let start = self.pair_offset(0);
        let end = self.pair_offset(size);
        self.data.copy_within(start..end, start + pair);
        self.write_pair(0, key, row_id);
        self.set_size(size + 1);
    }

    /// Removes and returns the first pair.
    pub fn pop_front(&mut self) -> (Bytes, RowId) {
        let size = self.size();
        let first = (Bytes::copy_from_slice(self.key_at(0)), self.row_at(0));
        let pair = self.pair_size();
        let start = self.pair_offset(0);
        let end = self.pair_offset(size);
        self.data.copy_within(start + pair..end, start);
        self.set_size(size - 1);
        first
    }

    /// Removes and returns the last pair.
    pub fn pop_back(&mut self) -> (Bytes, RowId) {
        let size = self.size();
        let last = (
            Bytes::copy_from_slice(self.key_at(size - 1)),
            self.row_at(size - 1),
        );
        self.set_size(size - 1);
        last
    }

    pub fn append_pairs(&mut self, pairs: &[(Bytes, RowId)]) {
        for (key, row_id) in pairs {
            self.push_back(key, *row_id);
        }
    }
}

/// Read-only view of an internal node. `size` counts children; the key at
/// index 0 is the dummy separator.
pub struct InternalView<'a> {
    data: &'a [u8],
}

impl<'a> InternalView<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE);
        match node_type(data)? {
            NodeType::Internal => Ok(Self { data }),
            NodeType::Leaf => Err(corrupt(data, "expected an internal node")),
        }
    }

    pub fn page_id(&self) -> PageId {
        PageId::new(get_u32(self.data, PAGE_ID_OFFSET))
    }

    pub fn size(&self) -> usize {
        get_u32(self.data, SIZE_OFFSET) as usize
    }

    pub fn max_size(&self) -> usize {
        get_u32(self.data, MAX_SIZE_OFFSET) as usize
    }

    pub fn key_size(&self) -> usize {
        get_u32(self.data, KEY_SIZE_OFFSET) as usize
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        get_page_ref(self.data, PARENT_OFFSET)
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id().is_none()
    }

    /// An internal root needs at least two children; any other internal
    /// node must stay at or above half of its capacity.
    pub fn min_size(&self) -> usize {
        if self.is_root() {
            2
        } else {
            self.max_size() / 2
        }
    }

    fn pair_size(&self) -> usize {
        self.key_size() + CHILD_ID_SIZE
    }

    fn pair_offset(&self, index: usize) -> usize {
        NODE_HEADER_SIZE + index * self.pair_size()
    }

    pub fn key_at(&self, index: usize) -> &'a [u8] {
        let off = self.pair_offset(index);
        &self.data[off..off + self.key_size()]
    }

    pub fn child_at(&self, index: usize) -> PageId {
        let off = self.pair_offset(index) + self.key_size();
        PageId::new(get_u32(self.data, off))
    }

    /// Position of `child` among this node's children, or None.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.child_at(i) == child)
    }

    /// Child whose subtree covers `key`. On an exact separator match the
    /// matched child is taken, not the one left of it.
    pub fn lookup(&self, key: &[u8], comparator: &dyn KeyComparator) -> PageId {
        let mut left = 1;
        let mut right = self.size() - 1;
        while left <= right {
            let mid = (left + right) / 2;
            match comparator.compare(key, self.key_at(mid)) {
                Ordering::Equal => return self.child_at(mid),
                Ordering::Less => {
                    if mid == 1 {
                        break;
                    }
                    right = mid - 1;
                }
                Ordering::Greater => left = mid + 1,
            }
        }
        self.child_at(left - 1)
    }
}

/// Mutable view of an internal node.
pub struct InternalViewMut<'a> {
    data: &'a mut [u8],
}

impl<'a> InternalViewMut<'a> {
    pub fn parse(data: &'a mut [u8]) -> Result<Self> {
        assert_eq!(data.len(), PAGE_SIZE);
        match node_type(data)? {
            NodeType::Internal => Ok(Self { data }),
            NodeType::Leaf => Err(corrupt(data, "expected an internal node")),
        }
    }

    /// Stamps a fresh, empty internal node over the page.
    pub fn init(
        data: &'a mut [u8],
        page_id: PageId,
        parent: Option<PageId>,
        key_size: usize,
        max_size: u32,
    ) -> Self {
        stamp_header(data, NODE_TYPE_INTERNAL, page_id, parent, key_size, max_size);
        Self { data }
    }

    fn as_view(&self) -> InternalView<'_> {
        InternalView { data: self.data }
    }

    pub fn page_id(&self) -> PageId {
        self.as_view().page_id()
    }

    pub fn size(&self) -> usize {
        self.as_view().size()
    }

    pub fn max_size(&self) -> usize {
        self.as_view().max_size()
    }

    pub fn key_size(&self) -> usize {
        self.as_view().key_size()
    }

    pub fn parent_page_id(&self) -> Option<PageId> {
        self.as_view().parent_page_id()
    }

    pub fn min_size(&self) -> usize {
        self.as_view().min_size()
    }

    pub fn key_at(&self, index: usize) -> &[u8] {
        let off = self.pair_offset(index);
        let key_size = self.key_size();
        &self.data[off..off + key_size]
    }

    pub fn child_at(&self, index: usize) -> PageId {
        self.as_view().child_at(index)
    }

    pub fn value_index(&self, child: PageId) -> Option<usize> {
        self.as_view().value_index(child)
    }

    pub fn set_parent_page_id(&mut self, parent: Option<PageId>) {
        put_page_ref(self.data, PARENT_OFFSET, parent);
    }

    fn set_size(&mut self, size: usize) {
        put_u32(self.data, SIZE_OFFSET, size as u32);
    }

    fn pair_size(&self) -> usize {
        self.as_view().pair_size()
    }

    fn pair_offset(&self, index: usize) -> usize {
        self.as_view().pair_offset(index)
    }

    fn write_pair(&mut self, index: usize, key: &[u8], child: PageId) {
        let key_size = self.key_size();
        assert_eq!(key.len(), key_size, "key length must match the node");
        let off = self.pair_offset(index);
        self.data[off..off + key_size].copy_from_slice(key);
        put_u32(self.data, off + key_size, child.as_u32());
    }

    fn write_child(&mut self, index: usize, child: PageId) {
        let off = self.pair_offset(index) + self.key_size();
        put_u32(self.data, off, child.as_u32());
    }

    pub fn set_key_at(&mut self, index: usize, key: &[u8]) {
        let key_size = self.key_size();
        assert_eq!(key.len(), key_size, "key length must match the node");
        let off = self.pair_offset(index);
        self.data[off..off + key_size].copy_from_slice(key);
    }

    /// Fills a brand-new root after a split: the old node on the left, the
    /// new node on the right, separated by `key`.
    pub fn populate_new_root(&mut self, left: PageId, key: &[u8], right: PageId) {
        self.write_child(0, left);
        self.write_pair(1, key, right);
        self.set_size(2);
    }

    /// Inserts `(key, new_child)` immediately after the pair whose child is
    /// `old_child`, keeping separators aligned with their subtrees.
    pub fn insert_after(&mut self, old_child: PageId, key: &[u8], new_child: PageId) -> Result<usize> {
        let size = self.size();
        let index = self
            .value_index(old_child)
            .ok_or_else(|| corrupt(self.data, "child to insert after is missing"))?;

        let pair = self.pair_size();
        let start = self.pair_offset(index + 1);
        let end = self.pair_offset(size);
        self.data.copy_within(start..end, start + pair);
        self.write_pair(index + 1, key, new_child);
        self.set_size(size + 1);
        Ok(size + 1)
    }

    /// Removes the pair at `index`, keeping the rest packed.
    pub fn remove_at(&mut self, index: usize) {
        let size = self.size();
        let pair = self.pair_size();
        let start = self.pair_offset(index);
        let end = self.pair_offset(size);
        self.data.copy_within(start + pair..end, start);
        self.set_size(size - 1);
    }

    /// Moves the upper half of the pairs out (for the new sibling during a
    /// split). The first moved key is the separator that travels up to the
    /// parent; inside the new node it becomes the dummy key at index 0.
    pub fn split(&mut self) -> Vec<(Bytes, PageId)> {
        let size = self.size();
        let start = size / 2;
        let moved = (start..size)
            .map(|i| (Bytes::copy_from_slice(self.key_at(i)), self.child_at(i)))
            .collect();
        self.set_size(start);
        moved
    }

    /// Moves every pair out, leaving this node empty (merge support). The
    /// first pair carries the dummy key; the caller substitutes the
    /// separator pulled down from the parent.
    pub fn take_entries(&mut self) -> Vec<(Bytes, PageId)> {
        let size = self.size();
        let moved = (0..size)
            .map(|i| (Bytes::copy_from_slice(self.key_at(i)), self.child_at(i)))
            .collect();
        self.set_size(0);
        moved
    }

    /// Appends one pair at the end.
    pub fn push_back(&mut self, key: &[u8], child: PageId) {
        let size = self.size();
        self.write_pair(size, key, child);
        self.set_size(size + 1);
    }

    /// Prepends a child. The old first child's subtree is now bounded below
    /// by `separator`, which lands in the key slot at index 1.
    pub fn push_front(&mut self, child: PageId, separator: &[u8]) {
        let size = self.size();
        let pair = self.pair_size();
        let start = self.pair_offset(0);
        let end = self.pair_offset(size);
        self.data.copy_within(start..end, start + pair);
        // Key slot 0 is the dummy separator; only the child matters.
        let key_size = self.key_size();
        self.data[start..start + key_size].fill(0);
        self.write_child(0, child);
        self.set_key_at(1, separator);
        self.set_size(size + 1);
    }

    /// Removes and returns the first pair (dummy key and leftmost child).
    pub fn pop_front(&mut self) -> (Bytes, PageId) {
        let size = self.size();
        let first = (Bytes::copy_from_slice(self.key_at(0)), self.child_at(0));
        let pair = self.pair_size();
        let start = self.pair_offset(0);
        let end = self.pair_offset(size);
        self.data.copy_within(start + pair..end, start);
        self.set_size(size - 1);
        first
    }

    /// Removes and returns the last pair.
    pub fn pop_back(&mut self) -> (Bytes, PageId) {
        let size = self.size();
        let last = (
            Bytes::copy_from_slice(self.key_at(size - 1)),
            self.child_at(size - 1),
        );
        self.set_size(size - 1);
        last
    }

    /// Bulk-fills an empty node with pairs moved from a sibling; the first
    /// pair's key occupies the dummy slot.
    pub fn append_entries(&mut self, pairs: &[(Bytes, PageId)]) {
        for (key, child) in pairs {
            self.push_back(key, *child);
        }
    }
}
