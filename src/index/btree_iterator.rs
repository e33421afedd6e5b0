use std::sync::Arc;

use crate::buffer::PageFrame;
use crate::common::{PageId, Result};
use crate::storage::page::MixedPage;
use crate::transaction::{LockGuard, LockMode, Transaction};
use crate::tuple::RowHolder;

use super::btree_index::BTreeCollection;
use super::btree_page::NodeKind;

/// One node on the traversal stack. The shared lock lives as long as the
/// entry does.
struct StackEntry {
    frame: Arc<PageFrame>,
    kind: NodeKind,
    row_count: usize,
    leftmost: Option<PageId>,
    leftmost_pushed: bool,
    /// Next row to yield
    position: usize,
    /// Right child of the row yielded last, still to be descended into
    pending_child: Option<PageId>,
    _lock: LockGuard,
}

/// In-order traversal of a `BTreeCollection` driven by an explicit stack.
///
/// A node's lock is released only after its last row has been yielded and
/// the subtree right of that row has been pushed. Errors are yielded once,
/// after which the iterator is exhausted.
pub struct BTreeIterator<'a> {
    tree: &'a BTreeCollection,
    tran: &'a dyn Transaction,
    stack: Vec<StackEntry>,
    started: bool,
    done: bool,
}

impl<'a> BTreeIterator<'a> {
    pub(crate) fn new(tree: &'a BTreeCollection, tran: &'a dyn Transaction) -> Self {
        Self {
            tree,
            tran,
            stack: Vec::new(),
            started: false,
            done: false,
        }
    }

    fn push(&mut self, page_id: PageId) -> Result<()> {
        let lock = self.tran.acquire_lock(page_id, LockMode::Shared)?;
        let frame = self
            .tree
            .allocator()
            .get_mixed_page(page_id, self.tran, self.tree.node_schema())?;
        let (kind, row_count, leftmost) = {
            let data = frame.read();
            let page = MixedPage::new(&data[..], Arc::clone(self.tree.node_schema()));
            (page.node_kind(), page.row_count(), page.prev_page_id())
        };
        self.stack.push(StackEntry {
            frame,
            kind,
            row_count,
            leftmost,
            leftmost_pushed: false,
            position: 0,
            pending_child: None,
            _lock: lock,
        });
        Ok(())
    }

    fn advance(&mut self) -> Result<Option<RowHolder>> {
        if !self.started {
            self.started = true;
            self.push(self.tree.root_page_id())?;
        }

        loop {
            let top = match self.stack.last_mut() {
                Some(top) => top,
                None => return Ok(None),
            };

            if let Some(child) = top.pending_child.take() {
                let exhausted = top.position >= top.row_count;
                self.push(child)?;
                if exhausted {
                    // the child is locked now, so the parent can go
                    let parent = self.stack.len() - 2;
                    self.stack.remove(parent);
                }
                continue;
            }

            if top.kind == NodeKind::Internal && !top.leftmost_pushed {
                top.leftmost_pushed = true;
                if let Some(leftmost) = top.leftmost {
                    self.push(leftmost)?;
                    continue;
                }
            }

            if top.position >= top.row_count {
                self.stack.pop();
                continue;
            }

            let row = {
                let data = top.frame.read();
                let page = MixedPage::new(&data[..], Arc::clone(self.tree.node_schema()));
                page.row(top.position)
            };
            top.position += 1;
            if top.kind == NodeKind::Internal {
                top.pending_child = row.get_page_pointer(self.tree.schema().column_count());
            }
            return Ok(Some(self.tree.strip(&row)));
        }
    }
}

impl Iterator for BTreeIterator<'_> {
    type Item = Result<RowHolder>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.advance() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                self.stack.clear();
                Some(Err(e))
            }
        }
    }
}
