use std::sync::Arc;

use bytes::Bytes;

use crate::buffer::{BufferPoolManager, ReadPageGuard};
use crate::common::{PageId, Result, RowId};

use super::tree_page::LeafView;

/// Forward cursor over the sorted leaf chain.
///
/// The iterator keeps the current leaf pinned through a read guard and
/// remembers an item index into it. Advancing past the last entry of a leaf
/// drops the guard (unpinning the page) and follows the chain link to the
/// next leaf, re-pinning it, until the chain ends. An exhausted iterator is
/// the end of the scan; there is no separate end sentinel.
pub struct IndexIterator {
    bpm: Arc<BufferPoolManager>,
    /// Pinned current leaf; None once the chain is exhausted
    guard: Option<ReadPageGuard>,
    item_index: usize,
}

impl IndexIterator {
    /// Cursor positioned at `item_index` within the given leaf.
    pub(crate) fn new(
        bpm: Arc<BufferPoolManager>,
        leaf_page_id: PageId,
        item_index: usize,
    ) -> Result<Self> {
        let guard = bpm.fetch_read_page(leaf_page_id)?;
        Ok(Self {
            bpm,
            guard: Some(guard),
            item_index,
        })
    }

    /// Cursor over an empty tree.
    pub(crate) fn exhausted(bpm: Arc<BufferPoolManager>) -> Self {
        Self {
            bpm,
            guard: None,
            item_index: 0,
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Result<(Bytes, RowId)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            enum Step {
                Item(Bytes, RowId),
                NextLeaf(Option<PageId>),
                Fail(crate::common::SiltError),
            }

            let step = {
                let guard = self.guard.as_ref()?;
                match LeafView::parse(guard.data()) {
                    Err(e) => Step::Fail(e),
                    Ok(leaf) => {
                        if self.item_index < leaf.size() {
                            Step::Item(
                                Bytes::copy_from_slice(leaf.key_at(self.item_index)),
                                leaf.row_at(self.item_index),
                            )
                        } else {
                            Step::NextLeaf(leaf.next_page_id())
                        }
                    }
                }
            };

            match step {
                Step::Fail(e) => {
                    self.guard = None;
                    return Some(Err(e));
                }
                Step::Item(key, row_id) => {
                    self.item_index += 1;
                    return Some(Ok((key, row_id)));
                }
                Step::NextLeaf(next) => {
                    // Unpin the exhausted leaf before touching the next one.
                    self.guard = None;
                    let next_page_id = next?;
                    match self.bpm.fetch_read_page(next_page_id) {
                        Ok(guard) => {
                            self.guard = Some(guard);
                            self.item_index = 0;
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
            }
        }
    }
}
