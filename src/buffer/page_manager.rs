use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::common::{PageId, Result, StorageConfig, StoreError, BOOT_PAGE_ID, PAGE_HEADER_SIZE};
use crate::storage::disk::{FileStream, IoScheduler, MemoryStream, PersistedStream};
use crate::storage::page::{MixedPage, PageType, RawPage};
use crate::transaction::{LockMode, LogRecord, Transaction};
use crate::tuple::ColumnSchema;

use super::{AllocationMap, BufferPool, EvictionPolicy, FifoEvictionPolicy, PageFrame};

/// Allocation and lookup of Mixed pages, all a row collection needs from
/// the page manager.
pub trait AllocateMixedPage: Send + Sync {
    fn page_size(&self) -> usize;

    fn allocate_mixed_page(
        &self,
        schema: &ColumnSchema,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
        tran: &dyn Transaction,
    ) -> Result<Arc<PageFrame>>;

    fn get_mixed_page(
        &self,
        page_id: PageId,
        tran: &dyn Transaction,
        schema: &ColumnSchema,
    ) -> Result<Arc<PageFrame>>;
}

/// Allocation and lookup of String pages.
pub trait AllocateStringPage: Send + Sync {
    fn page_size(&self) -> usize;

    fn allocate_string_page(
        &self,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
        tran: &dyn Transaction,
    ) -> Result<Arc<PageFrame>>;

    fn get_string_page(&self, page_id: PageId, tran: &dyn Transaction) -> Result<Arc<PageFrame>>;
}

/// PageManager owns page id allocation and the allocation bitmap, and
/// resolves page ids to frames through the buffer pool, loading from the
/// persisted stream on a miss. Every touch goes through the eviction
/// policy; victims are flushed if dirty before they leave the pool.
///
/// Callers must not hold a frame latch while calling into the manager.
pub struct PageManager {
    config: StorageConfig,
    pool: BufferPool,
    eviction_policy: Box<dyn EvictionPolicy>,
    io: IoScheduler,
    /// Choosing, recording and persisting ids happen under this lock
    allocation: Mutex<AllocationMap>,
    /// Serializes pool misses against evictions so a load never races a
    /// flush of the same page
    residency: Mutex<()>,
}

impl PageManager {
    /// Opens a page manager over `stream`. An uninitialized stream gets a
    /// fresh boot page; an initialized one is recovered and its allocation
    /// bitmap reloaded.
    pub fn new(
        config: StorageConfig,
        stream: Arc<dyn PersistedStream>,
        eviction_policy: Box<dyn EvictionPolicy>,
    ) -> Result<Self> {
        config.validate()?;
        let page_size = config.page_size;
        let io = IoScheduler::new(Arc::clone(&stream))?;

        let allocation = if stream.is_initialized() {
            stream.recover()?;
            let map = Self::load_allocation_map(&io, page_size)?;
            debug!(
                next_page_id = %map.next_id(),
                bitmap_pages = map.pages().len(),
                "opened existing store"
            );
            map
        } else {
            let map = AllocationMap::bootstrap(page_size)?;
            for frame in map.pages() {
                Self::write_frame(&io, page_size, frame)?;
            }
            io.sync()?;
            stream.mark_initialized()?;
            debug!(page_size, "initialized new store");
            map
        };

        Ok(Self {
            config,
            pool: BufferPool::new(),
            eviction_policy,
            io,
            allocation: Mutex::new(allocation),
            residency: Mutex::new(()),
        })
    }

    /// Page manager over a fresh in-memory stream with FIFO eviction.
    pub fn in_memory(config: StorageConfig) -> Result<Self> {
        let policy = Box::new(FifoEvictionPolicy::from_config(&config));
        Self::new(config, Arc::new(MemoryStream::new()), policy)
    }

    /// Page manager over the store file at `path` with FIFO eviction,
    /// creating the file if needed.
    pub fn open_file<P: AsRef<Path>>(path: P, config: StorageConfig) -> Result<Self> {
        config.validate()?;
        let stream = Arc::new(FileStream::open(path, config.page_size)?);
        let policy = Box::new(FifoEvictionPolicy::from_config(&config));
        Self::new(config, stream, policy)
    }

    fn load_allocation_map(io: &IoScheduler, page_size: usize) -> Result<AllocationMap> {
        let mut chain = Vec::new();
        let mut next = Some(BOOT_PAGE_ID);
        while let Some(page_id) = next {
            let data = io.read(page_id.as_u64() * page_size as u64, page_size)?;
            let frame = PageFrame::from_bytes(page_id, data, page_size)?;
            next = RawPage::new(&frame.read()[..]).next_page_id();
            if let Some(next_id) = next {
                // ids only grow along the chain, so this also rules out cycles
                if next_id <= page_id {
                    return Err(StoreError::InvalidStoreFile(format!(
                        "bitmap chain links {} back to {}",
                        page_id, next_id
                    )));
                }
            }
            chain.push(frame);
        }
        AllocationMap::load(page_size, chain)
    }

    pub fn config(&self) -> &StorageConfig {
        &self.config
    }

    pub fn page_size(&self) -> usize {
        self.config.page_size
    }

    pub fn eviction_policy(&self) -> &dyn EvictionPolicy {
        self.eviction_policy.as_ref()
    }

    /// Number of frames currently in the buffer pool.
    pub fn resident_page_count(&self) -> usize {
        self.pool.len()
    }

    pub fn is_resident(&self, page_id: PageId) -> bool {
        self.pool.contains(page_id)
    }

    pub fn is_allocated(&self, page_id: PageId) -> bool {
        self.allocation.lock().is_allocated(page_id)
    }

    /// Number of ids handed out by `allocate_page`.
    pub fn allocated_page_count(&self) -> usize {
        self.allocation.lock().allocated_count()
    }

    pub fn bitmap_page_count(&self) -> usize {
        self.allocation.lock().pages().len()
    }

    /// Allocates a new page of `page_type` and links it between
    /// `prev_page_id` and `next_page_id`, which must currently point at
    /// each other (or at nothing). Mixed pages need the schema of the rows
    /// they will hold.
    pub fn allocate_page(
        &self,
        page_type: PageType,
        schema: Option<&ColumnSchema>,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
        tran: &dyn Transaction,
    ) -> Result<Arc<PageFrame>> {
        if page_type == PageType::Mixed {
            let row_size = schema.map_or(0, ColumnSchema::row_size);
            if MixedPage::<&[u8]>::max_row_count_for(self.page_size(), row_size) == 0 {
                return Err(StoreError::InvalidArgument(format!(
                    "a schema with rows of 1..={} bytes is required for Mixed pages",
                    self.page_size() - PAGE_HEADER_SIZE
                )));
            }
        }

        let _prev_lock = prev_page_id
            .map(|id| tran.acquire_lock(id, LockMode::Exclusive))
            .transpose()?;
        let _next_lock = next_page_id
            .map(|id| tran.acquire_lock(id, LockMode::Exclusive))
            .transpose()?;
        let prev = prev_page_id.map(|id| self.fetch_frame(id)).transpose()?;
        let next = next_page_id.map(|id| self.fetch_frame(id)).transpose()?;

        if let Some(prev) = &prev {
            let linked = RawPage::new(&prev.read()[..]).next_page_id();
            if linked != next_page_id {
                return Err(StoreError::InvalidArgument(format!(
                    "{} links to {:?}, not {:?}",
                    prev.page_id(),
                    linked,
                    next_page_id
                )));
            }
        }
        if let Some(next) = &next {
            let linked = RawPage::new(&next.read()[..]).prev_page_id();
            if linked != prev_page_id {
                return Err(StoreError::InvalidArgument(format!(
                    "{} links back to {:?}, not {:?}",
                    next.page_id(),
                    linked,
                    prev_page_id
                )));
            }
        }

        // The id is reserved under the allocation mutex, but its lock is
        // taken outside it: a holder of the id's lock only stalls this
        // caller. A reserved id that is never marked is skipped for good.
        let page_id = self.allocation.lock().take_id();
        let _lock = tran.acquire_lock(page_id, LockMode::Exclusive)?;
        tran.add_record(LogRecord::AllocatePage {
            page_id,
            page_type,
            prev_page_id,
            next_page_id,
        })?;

        let frame = {
            let mut allocation = self.allocation.lock();
            if allocation.is_allocated(page_id) || self.pool.contains(page_id) {
                return Err(StoreError::corrupted(page_id, "page id is already allocated"));
            }
            allocation.mark(page_id)?;
            self.pool.add(PageFrame::new(page_id, page_type, self.page_size()))
        };

        {
            let mut data = frame.write();
            let mut page = RawPage::new(&mut data[..]);
            page.set_prev_page_id(prev_page_id);
            page.set_next_page_id(next_page_id);
        }
        if let Some(prev) = &prev {
            RawPage::new(&mut prev.write()[..]).set_next_page_id(Some(page_id));
        }
        if let Some(next) = &next {
            RawPage::new(&mut next.write()[..]).set_prev_page_id(Some(page_id));
        }

        debug!(%page_id, ?page_type, txn = %tran.id(), "allocated page");
        self.touch(page_id)?;
        Ok(frame)
    }

    /// Returns the frame of `page_id`, which must hold a `page_type` page.
    /// The caller must already hold at least a shared lock on the page.
    /// For Mixed pages, `schema` is checked against the stored row count.
    pub fn get_page(
        &self,
        page_id: PageId,
        tran: &dyn Transaction,
        page_type: PageType,
        schema: Option<&ColumnSchema>,
    ) -> Result<Arc<PageFrame>> {
        debug_assert!(
            tran.verify_lock(page_id, LockMode::Shared),
            "{} reads {} without holding a lock on it",
            tran.id(),
            page_id
        );
        let frame = self.fetch_frame(page_id)?;
        frame.expect_type(page_type)?;

        if let (PageType::Mixed, Some(schema)) = (page_type, schema) {
            let max_rows = MixedPage::<&[u8]>::max_row_count_for(self.page_size(), schema.row_size());
            let row_count = RawPage::new(&frame.read()[..]).row_count();
            if row_count > max_rows {
                return Err(StoreError::corrupted(
                    page_id,
                    format!(
                        "{} rows do not fit a page of {}-byte rows (max {})",
                        row_count,
                        schema.row_size(),
                        max_rows
                    ),
                ));
            }
        }
        Ok(frame)
    }

    fn fetch_frame(&self, page_id: PageId) -> Result<Arc<PageFrame>> {
        if !self.is_allocated(page_id) {
            return Err(StoreError::PageNotFound(page_id));
        }
        let frame = match self.pool.get(page_id) {
            Some(frame) => frame,
            None => {
                let _residency = self.residency.lock();
                match self.pool.get(page_id) {
                    Some(frame) => frame,
                    None => {
                        trace!(%page_id, "loading page from stream");
                        let data = self.io.read(self.position(page_id), self.page_size())?;
                        let frame = PageFrame::from_bytes(page_id, data, self.page_size())?;
                        self.pool.add(frame)
                    }
                }
            }
        };
        self.touch(page_id)?;
        Ok(frame)
    }

    fn position(&self, page_id: PageId) -> u64 {
        page_id.as_u64() * self.page_size() as u64
    }

    /// Records the touch and evicts whatever the policy hands back. A
    /// victim still referenced outside the pool stays resident and goes
    /// back into the policy.
    fn touch(&self, page_id: PageId) -> Result<()> {
        let victims = self.eviction_policy.record_usage_and_evict(page_id);
        for (index, victim) in victims.iter().enumerate() {
            if let Err(e) = self.evict(*victim) {
                for remaining in &victims[index..] {
                    self.eviction_policy.reinstate(*remaining);
                }
                return Err(e);
            }
        }
        Ok(())
    }

    fn evict(&self, page_id: PageId) -> Result<()> {
        let _residency = self.residency.lock();
        let frame = match self.pool.get(page_id) {
            Some(frame) => frame,
            None => return Ok(()),
        };
        // one reference is the pool's, one is ours
        if Arc::strong_count(&frame) > 2 {
            self.eviction_policy.reinstate(page_id);
            return Ok(());
        }
        self.flush(&frame)?;
        drop(frame);
        if self.pool.evict_if_idle(page_id) {
            trace!(%page_id, "evicted page");
        } else {
            self.eviction_policy.reinstate(page_id);
        }
        Ok(())
    }

    /// Writes the frame if it is dirty and clears the flag afterwards.
    fn flush(&self, frame: &PageFrame) -> Result<()> {
        if !frame.is_dirty() {
            return Ok(());
        }
        let data = frame.read();
        self.io.write(self.position(frame.page_id()), data.to_vec())?;
        frame.set_dirty(false);
        Ok(())
    }

    fn write_frame(io: &IoScheduler, page_size: usize, frame: &PageFrame) -> Result<()> {
        let data = frame.read();
        io.write(frame.page_id().as_u64() * page_size as u64, data.to_vec())?;
        frame.set_dirty(false);
        Ok(())
    }

    /// Flushes every dirty resident page and every dirty bitmap page, then
    /// syncs the stream.
    pub fn checkpoint(&self) -> Result<()> {
        let mut flushed = 0usize;
        for frame in self.pool.dirty_pages() {
            self.flush(&frame)?;
            flushed += 1;
        }
        let bitmap: Vec<_> = self.allocation.lock().pages().to_vec();
        for frame in bitmap.iter().filter(|frame| frame.is_dirty()) {
            self.flush(frame)?;
            flushed += 1;
        }
        self.io.sync()?;
        debug!(flushed, "checkpoint complete");
        Ok(())
    }
}

impl AllocateMixedPage for PageManager {
    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn allocate_mixed_page(
        &self,
        schema: &ColumnSchema,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
        tran: &dyn Transaction,
    ) -> Result<Arc<PageFrame>> {
        self.allocate_page(PageType::Mixed, Some(schema), prev_page_id, next_page_id, tran)
    }

    fn get_mixed_page(
        &self,
        page_id: PageId,
        tran: &dyn Transaction,
        schema: &ColumnSchema,
    ) -> Result<Arc<PageFrame>> {
        self.get_page(page_id, tran, PageType::Mixed, Some(schema))
    }
}

impl AllocateStringPage for PageManager {
    fn page_size(&self) -> usize {
        self.config.page_size
    }

    fn allocate_string_page(
        &self,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
        tran: &dyn Transaction,
    ) -> Result<Arc<PageFrame>> {
        self.allocate_page(PageType::String, None, prev_page_id, next_page_id, tran)
    }

    fn get_string_page(&self, page_id: PageId, tran: &dyn Transaction) -> Result<Arc<PageFrame>> {
        self.get_page(page_id, tran, PageType::String, None)
    }
}
