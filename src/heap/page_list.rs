use std::sync::Arc;

use tracing::debug;

use crate::buffer::{AllocateMixedPage, PageFrame};
use crate::common::{PageId, Result, StoreError};
use crate::storage::page::MixedPage;
use crate::transaction::{LockMode, Transaction};
use crate::tuple::{ColumnSchema, RowHolder, RowsetHolder};

/// Unordered collection of rows kept in a doubly linked chain of Mixed
/// pages. New rows go to the first page with room; a new tail page is
/// linked in only when every page is full.
pub struct PageListCollection {
    allocator: Arc<dyn AllocateMixedPage>,
    schema: Arc<ColumnSchema>,
    root_page_id: PageId,
}

impl PageListCollection {
    pub fn create(
        allocator: Arc<dyn AllocateMixedPage>,
        schema: Arc<ColumnSchema>,
        tran: &dyn Transaction,
    ) -> Result<Self> {
        if MixedPage::<&[u8]>::max_row_count_for(allocator.page_size(), schema.row_size()) == 0 {
            return Err(StoreError::InvalidArgument(format!(
                "rows of {} bytes do not fit in pages of {} bytes",
                schema.row_size(),
                allocator.page_size()
            )));
        }
        let root = allocator.allocate_mixed_page(&schema, None, None, tran)?;
        let root_page_id = root.page_id();
        debug!(root = %root_page_id, "created page list");
        Ok(Self {
            allocator,
            schema,
            root_page_id,
        })
    }

    pub fn open(allocator: Arc<dyn AllocateMixedPage>, schema: Arc<ColumnSchema>, root_page_id: PageId) -> Self {
        Self {
            allocator,
            schema,
            root_page_id,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    fn page(&self, page_id: PageId, tran: &dyn Transaction) -> Result<Arc<PageFrame>> {
        self.allocator.get_mixed_page(page_id, tran, &self.schema)
    }

    /// Free row slots and next link of a page, read under a shared lock.
    fn probe(&self, page_id: PageId, tran: &dyn Transaction) -> Result<(usize, Option<PageId>)> {
        let _lock = tran.acquire_lock(page_id, LockMode::Shared)?;
        let frame = self.page(page_id, tran)?;
        let data = frame.read();
        let page = MixedPage::new(&data[..], Arc::clone(&self.schema));
        Ok((page.max_row_count() - page.row_count(), page.next_page_id()))
    }

    pub fn add(&self, row: &RowHolder, tran: &dyn Transaction) -> Result<()> {
        let rows = RowsetHolder::from_rows(Arc::clone(&self.schema), [row])?;
        self.add_rowset(&rows, tran)
    }

    /// Appends `rows`, filling free space front to back and splitting the
    /// batch across pages where needed.
    pub fn add_rowset(&self, rows: &RowsetHolder, tran: &dyn Transaction) -> Result<()> {
        if rows.schema().as_ref() != self.schema.as_ref() {
            return Err(StoreError::InvalidArgument(
                "rowset schema does not match collection schema".to_string(),
            ));
        }

        let mut start = 0;
        let mut current = self.root_page_id;
        while start < rows.len() {
            let (free, next) = self.probe(current, tran)?;
            if free > 0 {
                let _lock = tran.acquire_lock(current, LockMode::Exclusive)?;
                let frame = self.page(current, tran)?;
                let mut data = frame.write();
                let mut page = MixedPage::new(&mut data[..], Arc::clone(&self.schema));
                // another writer may have taken the space since the probe
                let free = page.max_row_count() - page.row_count();
                if free > 0 {
                    let end = (start + free).min(rows.len());
                    page.merge(&rows.slice(start, end))?;
                    start = end;
                    continue;
                }
            }

            current = match next {
                Some(next) => next,
                None => self.extend_tail(current, tran)?,
            };
        }
        Ok(())
    }

    /// Links a new page after `tail`, or returns the page someone else
    /// linked there first.
    fn extend_tail(&self, tail: PageId, tran: &dyn Transaction) -> Result<PageId> {
        let _lock = tran.acquire_lock(tail, LockMode::Exclusive)?;
        let next = {
            let frame = self.page(tail, tran)?;
            let data = frame.read();
            let page = MixedPage::new(&data[..], Arc::clone(&self.schema));
            page.next_page_id()
        };
        if let Some(next) = next {
            return Ok(next);
        }
        let frame = self
            .allocator
            .allocate_mixed_page(&self.schema, Some(tail), None, tran)?;
        Ok(frame.page_id())
    }

    /// Rows in page order, one page buffered at a time. Each page is read
    /// under a shared lock that is released before its rows are yielded.
    pub fn iter<'a>(&'a self, tran: &'a dyn Transaction) -> PageListIterator<'a> {
        PageListIterator {
            collection: self,
            tran,
            next_page: Some(self.root_page_id),
            buffer: RowsetHolder::new(Arc::clone(&self.schema)),
            position: 0,
            done: false,
        }
    }

    pub fn where_<'a, P>(
        &'a self,
        predicate: P,
        tran: &'a dyn Transaction,
    ) -> impl Iterator<Item = Result<RowHolder>> + 'a
    where
        P: Fn(&RowHolder) -> bool + 'a,
    {
        self.iter(tran).filter(move |row| match row {
            Ok(row) => predicate(row),
            Err(_) => true,
        })
    }

    /// Largest projected value, or `start` if no row projects above it.
    pub fn max<T, F>(&self, projector: F, start: T, tran: &dyn Transaction) -> Result<T>
    where
        T: PartialOrd,
        F: Fn(&RowHolder) -> T,
    {
        self.iter(tran).try_fold(start, |max, row| {
            let value = projector(&row?);
            Ok(if value > max { value } else { max })
        })
    }

    /// Row count summed over page headers, without copying rows out.
    pub fn count(&self, tran: &dyn Transaction) -> Result<usize> {
        let mut total = 0;
        let mut current = Some(self.root_page_id);
        while let Some(page_id) = current {
            let _lock = tran.acquire_lock(page_id, LockMode::Shared)?;
            let frame = self.page(page_id, tran)?;
            let data = frame.read();
            let page = MixedPage::new(&data[..], Arc::clone(&self.schema));
            total += page.row_count();
            current = page.next_page_id();
        }
        Ok(total)
    }
}

pub struct PageListIterator<'a> {
    collection: &'a PageListCollection,
    tran: &'a dyn Transaction,
    next_page: Option<PageId>,
    buffer: RowsetHolder,
    position: usize,
    done: bool,
}

impl PageListIterator<'_> {
    fn load(&mut self, page_id: PageId) -> Result<()> {
        let _lock = self.tran.acquire_lock(page_id, LockMode::Shared)?;
        let frame = self.collection.page(page_id, self.tran)?;
        let data = frame.read();
        let page = MixedPage::new(&data[..], Arc::clone(&self.collection.schema));
        self.buffer = page.deserialize();
        self.position = 0;
        self.next_page = page.next_page_id();
        Ok(())
    }
}

impl Iterator for PageListIterator<'_> {
    type Item = Result<RowHolder>;

    fn next(&mut self) -> Option<Self::Item> {
        while !self.done {
            if let Some(row) = self.buffer.get(self.position) {
                self.position += 1;
                return Some(Ok(row));
            }
            let page_id = match self.next_page {
                Some(page_id) => page_id,
                None => {
                    self.done = true;
                    break;
                }
            };
            if let Err(e) = self.load(page_id) {
                self.done = true;
                return Some(Err(e));
            }
        }
        None
    }
}
