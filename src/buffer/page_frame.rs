use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::{PageId, Result, StoreError};
use crate::storage::page::{validate_header, PageType, RawPage};

/// An in-memory page: its identity, transient dirty flag and the page
/// bytes behind a latch. The buffer is always exactly one page long.
pub struct PageFrame {
    page_id: PageId,
    page_type: PageType,
    /// Whether the page has been modified since it was last flushed
    is_dirty: AtomicBool,
    data: RwLock<Box<[u8]>>,
}

impl PageFrame {
    /// Creates a freshly initialized page. New pages start dirty since
    /// they do not exist in the stream yet.
    pub fn new(page_id: PageId, page_type: PageType, page_size: usize) -> Self {
        let mut data = vec![0u8; page_size].into_boxed_slice();
        RawPage::new(&mut data[..]).init(page_id, page_type);
        Self {
            page_id,
            page_type,
            is_dirty: AtomicBool::new(true),
            data: RwLock::new(data),
        }
    }

    /// Wraps page bytes read back from storage after validating the header.
    pub fn from_bytes(page_id: PageId, data: Vec<u8>, page_size: usize) -> Result<Self> {
        let page_type = validate_header(&data, page_id, page_size)?;
        Ok(Self {
            page_id,
            page_type,
            is_dirty: AtomicBool::new(false),
            data: RwLock::new(data.into_boxed_slice()),
        })
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn page_type(&self) -> PageType {
        self.page_type
    }

    /// Fails with `PageTypeMismatch` unless this frame holds `expected`.
    pub fn expect_type(&self, expected: PageType) -> Result<()> {
        if self.page_type != expected {
            return Err(StoreError::PageTypeMismatch {
                page_id: self.page_id,
                expected,
                actual: self.page_type,
            });
        }
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    pub fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    /// Shared latch on the page bytes.
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    /// Exclusive latch on the page bytes. Marks the page dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        let guard = self.data.write();
        self.set_dirty(true);
        guard
    }

    /// Non-blocking shared latch.
    pub fn try_read(&self) -> Option<RwLockReadGuard<'_, Box<[u8]>>> {
        self.data.try_read()
    }
}

impl std::fmt::Debug for PageFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageFrame")
            .field("page_id", &self.page_id)
            .field("page_type", &self.page_type)
            .field("is_dirty", &self.is_dirty())
            .finish()
    }
}
