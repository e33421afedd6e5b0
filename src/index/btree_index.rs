use std::cmp::Ordering;
use std::sync::Arc;

use tracing::debug;

use crate::buffer::{AllocateMixedPage, PageFrame};
use crate::common::{PageId, Result, StoreError};
use crate::storage::page::MixedPage;
use crate::transaction::{LockMode, Transaction};
use crate::tuple::{ColumnInfo, ColumnSchema, RowHolder, Value};

use super::btree_iterator::BTreeIterator;
use super::btree_page::NodeKind;
use super::RowComparer;

/// Smallest node capacity that still leaves both halves of a split
/// internal node non-empty.
const MIN_ELEMS_PER_PAGE: usize = 5;

/// Applies the user comparer to node rows with the trailing pointer
/// column stripped, so child pointers never take part in ordering.
struct NodeComparer<'a> {
    inner: &'a dyn RowComparer,
    columns: &'a [usize],
    schema: &'a Arc<ColumnSchema>,
}

impl RowComparer for NodeComparer<'_> {
    fn compare(&self, a: &RowHolder, b: &RowHolder) -> Ordering {
        let a = a.project_into(self.columns, self.schema);
        let b = b.project_into(self.columns, self.schema);
        self.inner.compare(&a, &b)
    }
}

/// Where a split left things.
struct Split {
    pivot: RowHolder,
    right_page_id: PageId,
    parent_page_id: PageId,
}

/// Ordered collection of unique rows.
///
/// Rows live in every node, internal ones included. Each stored row is the
/// user row plus a trailing page pointer column: in internal nodes it
/// points at the subtree right of the row, and the node's prev link points
/// at the subtree left of its first row. Leaf rows carry a null pointer.
///
/// Inserts split any internal node that has reached
/// `max_elems_per_page - 2` rows on the way down, so a parent always has
/// room for the row promoted out of a full leaf.
pub struct BTreeCollection {
    allocator: Arc<dyn AllocateMixedPage>,
    schema: Arc<ColumnSchema>,
    node_schema: Arc<ColumnSchema>,
    /// User column positions, used to strip the pointer column
    columns: Vec<usize>,
    comparer: Arc<dyn RowComparer>,
    indexed_column: usize,
    root_page_id: PageId,
    max_elems_per_page: usize,
}

impl BTreeCollection {
    /// Creates an empty tree with a single leaf root. `comparer` orders
    /// user rows and must agree with the order of `indexed_column`.
    pub fn create(
        allocator: Arc<dyn AllocateMixedPage>,
        schema: Arc<ColumnSchema>,
        tran: &dyn Transaction,
        comparer: Arc<dyn RowComparer>,
        indexed_column: usize,
    ) -> Result<Self> {
        let mut tree = Self::build(allocator, schema, comparer, indexed_column, PageId::new(0))?;
        let root = tree
            .allocator
            .allocate_mixed_page(&tree.node_schema, None, None, tran)?;
        {
            let _lock = tran.acquire_lock(root.page_id(), LockMode::Exclusive)?;
            let mut data = root.write();
            MixedPage::new(&mut data[..], Arc::clone(&tree.node_schema)).set_node_kind(NodeKind::Leaf);
        }
        tree.root_page_id = root.page_id();
        debug!(root = %tree.root_page_id, max_elems = tree.max_elems_per_page, "created b-tree");
        Ok(tree)
    }

    /// Reopens a tree whose root page is `root_page_id`.
    pub fn open(
        allocator: Arc<dyn AllocateMixedPage>,
        schema: Arc<ColumnSchema>,
        comparer: Arc<dyn RowComparer>,
        indexed_column: usize,
        root_page_id: PageId,
    ) -> Result<Self> {
        Self::build(allocator, schema, comparer, indexed_column, root_page_id)
    }

    fn build(
        allocator: Arc<dyn AllocateMixedPage>,
        schema: Arc<ColumnSchema>,
        comparer: Arc<dyn RowComparer>,
        indexed_column: usize,
        root_page_id: PageId,
    ) -> Result<Self> {
        if indexed_column >= schema.column_count() {
            return Err(StoreError::InvalidArgument(format!(
                "indexed column {} out of range for {} columns",
                indexed_column,
                schema.column_count()
            )));
        }
        let node_schema = Arc::new(schema.extend(&[ColumnInfo::page_pointer()]));
        let capacity = MixedPage::<&[u8]>::max_row_count_for(allocator.page_size(), node_schema.row_size());
        // odd, so a full leaf splits into two equal halves around the pivot
        let max_elems_per_page = if capacity % 2 == 0 {
            capacity.saturating_sub(1)
        } else {
            capacity
        };
        if max_elems_per_page < MIN_ELEMS_PER_PAGE {
            return Err(StoreError::InvalidArgument(format!(
                "pages of {} bytes hold only {} rows of {} bytes",
                allocator.page_size(),
                capacity,
                node_schema.row_size()
            )));
        }

        Ok(Self {
            allocator,
            columns: (0..schema.column_count()).collect(),
            schema,
            node_schema,
            comparer,
            indexed_column,
            root_page_id,
            max_elems_per_page,
        })
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn max_elems_per_page(&self) -> usize {
        self.max_elems_per_page
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub(crate) fn node_schema(&self) -> &Arc<ColumnSchema> {
        &self.node_schema
    }

    pub(crate) fn allocator(&self) -> &Arc<dyn AllocateMixedPage> {
        &self.allocator
    }

    fn pointer_column(&self) -> usize {
        self.columns.len()
    }

    fn node_comparer(&self) -> NodeComparer<'_> {
        NodeComparer {
            inner: self.comparer.as_ref(),
            columns: &self.columns,
            schema: &self.schema,
        }
    }

    /// Drops the pointer column of a node row.
    pub(crate) fn strip(&self, row: &RowHolder) -> RowHolder {
        row.project_into(&self.columns, &self.schema)
    }

    fn node(&self, page_id: PageId, tran: &dyn Transaction) -> Result<Arc<PageFrame>> {
        self.allocator.get_mixed_page(page_id, tran, &self.node_schema)
    }

    fn child_at(&self, page: &MixedPage<&[u8]>, position: usize) -> Result<PageId> {
        let child = if position == 0 {
            page.prev_page_id()
        } else {
            page.row(position - 1).get_page_pointer(self.pointer_column())
        };
        child.ok_or_else(|| StoreError::corrupted(page.page_id(), "internal node is missing a child"))
    }

    /// Inserts `row`. Fails with `KeyAlreadyExists` if a row comparing
    /// equal is already stored.
    pub fn add(&mut self, row: &RowHolder, tran: &dyn Transaction) -> Result<()> {
        if row.schema().as_ref() != self.schema.as_ref() {
            return Err(StoreError::InvalidArgument(
                "row schema does not match the tree schema".to_string(),
            ));
        }
        let mut node_row = row.project_into(&self.columns, &self.node_schema);
        node_row.set_page_pointer(self.pointer_column(), None);

        let mut parent: Option<PageId> = None;
        let mut current = self.root_page_id;
        loop {
            // read under a shared lock that is gone before anything below
            // asks for an exclusive one
            let (kind, row_count, child) = {
                let _lock = tran.acquire_lock(current, LockMode::Shared)?;
                let frame = self.node(current, tran)?;
                let data = frame.read();
                let page = MixedPage::new(&data[..], Arc::clone(&self.node_schema));
                let position = match page.search(&node_row, &self.node_comparer()) {
                    Ok(_) => return Err(StoreError::KeyAlreadyExists),
                    Err(position) => position,
                };
                let child = match page.node_kind() {
                    NodeKind::Internal => Some(self.child_at(&page, position)?),
                    NodeKind::Leaf => None,
                };
                (page.node_kind(), page.row_count(), child)
            };

            match kind {
                NodeKind::Internal if row_count >= self.max_elems_per_page - 2 => {
                    let split = self.split_node(current, parent, tran)?;
                    parent = Some(split.parent_page_id);
                    match self.node_comparer().compare(&node_row, &split.pivot) {
                        Ordering::Equal => return Err(StoreError::KeyAlreadyExists),
                        Ordering::Less => {}
                        Ordering::Greater => current = split.right_page_id,
                    }
                }
                NodeKind::Internal => {
                    parent = Some(current);
                    current = child.ok_or_else(|| {
                        StoreError::corrupted(current, "internal node is missing a child")
                    })?;
                }
                NodeKind::Leaf if row_count < self.max_elems_per_page => {
                    return self.insert_into(current, &node_row, tran);
                }
                NodeKind::Leaf => {
                    let split = self.split_node(current, parent, tran)?;
                    let target = match self.node_comparer().compare(&node_row, &split.pivot) {
                        Ordering::Equal => return Err(StoreError::KeyAlreadyExists),
                        Ordering::Less => current,
                        Ordering::Greater => split.right_page_id,
                    };
                    return self.insert_into(target, &node_row, tran);
                }
            }
        }
    }

    fn insert_into(&self, page_id: PageId, node_row: &RowHolder, tran: &dyn Transaction) -> Result<()> {
        let _lock = tran.acquire_lock(page_id, LockMode::Exclusive)?;
        let frame = self.node(page_id, tran)?;
        let mut data = frame.write();
        MixedPage::new(&mut data[..], Arc::clone(&self.node_schema))
            .insert_ordered(node_row, &self.node_comparer())?;
        Ok(())
    }

    /// Moves the upper half of `page_id` to a new right sibling and
    /// promotes the middle row into `parent`, or into a new root when
    /// `page_id` is the root.
    fn split_node(&mut self, page_id: PageId, parent: Option<PageId>, tran: &dyn Transaction) -> Result<Split> {
        let right = self
            .allocator
            .allocate_mixed_page(&self.node_schema, None, None, tran)?;
        let right_page_id = right.page_id();

        let pivot = {
            let _node_lock = tran.acquire_lock(page_id, LockMode::Exclusive)?;
            let _right_lock = tran.acquire_lock(right_page_id, LockMode::Exclusive)?;
            let frame = self.node(page_id, tran)?;

            let mut node_data = frame.write();
            let mut right_data = right.write();
            let mut node = MixedPage::new(&mut node_data[..], Arc::clone(&self.node_schema));
            let mut sibling = MixedPage::new(&mut right_data[..], Arc::clone(&self.node_schema));

            let split_index = node.row_count() / 2;
            let mut pivot = node.split_page(&mut sibling, split_index)?;
            sibling.set_node_kind(node.node_kind());
            sibling.set_prev_page_id(pivot.get_page_pointer(self.pointer_column()));
            pivot.set_page_pointer(self.pointer_column(), Some(right_page_id));
            pivot
        };

        let parent_page_id = match parent {
            Some(parent_page_id) => {
                self.insert_into(parent_page_id, &pivot, tran)?;
                parent_page_id
            }
            None => {
                let root = self
                    .allocator
                    .allocate_mixed_page(&self.node_schema, None, None, tran)?;
                let _lock = tran.acquire_lock(root.page_id(), LockMode::Exclusive)?;
                {
                    let mut data = root.write();
                    let mut page = MixedPage::new(&mut data[..], Arc::clone(&self.node_schema));
                    page.set_node_kind(NodeKind::Internal);
                    page.set_prev_page_id(Some(page_id));
                    page.insert_ordered(&pivot, &self.node_comparer())?;
                }
                debug!(old_root = %page_id, new_root = %root.page_id(), "split b-tree root");
                self.root_page_id = root.page_id();
                root.page_id()
            }
        };

        Ok(Split {
            pivot,
            right_page_id,
            parent_page_id,
        })
    }

    /// Returns the row whose indexed column equals `key`, without the
    /// pointer column, or `KeyNotFound`.
    pub fn seek(&self, key: &Value, tran: &dyn Transaction) -> Result<RowHolder> {
        let mut probe = RowHolder::new(Arc::clone(&self.node_schema));
        probe.set_value(self.indexed_column, key)?;

        let mut current = self.root_page_id;
        loop {
            let _lock = tran.acquire_lock(current, LockMode::Shared)?;
            let frame = self.node(current, tran)?;
            let data = frame.read();
            let page = MixedPage::new(&data[..], Arc::clone(&self.node_schema));
            match page.search(&probe, &self.node_comparer()) {
                Ok(position) => return Ok(self.strip(&page.row(position))),
                Err(_) if page.node_kind().is_leaf() => return Err(StoreError::KeyNotFound),
                Err(position) => current = self.child_at(&page, position)?,
            }
        }
    }

    /// Lazily yields every row in ascending order.
    pub fn iter<'a>(&'a self, tran: &'a dyn Transaction) -> BTreeIterator<'a> {
        BTreeIterator::new(self, tran)
    }

    /// Number of stored rows.
    pub fn count(&self, tran: &dyn Transaction) -> Result<usize> {
        self.iter(tran).try_fold(0, |count, row| row.map(|_| count + 1))
    }
}
