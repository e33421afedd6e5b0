use std::sync::Arc;

use tracing::debug;

use crate::buffer::{AllocateStringPage, PageFrame};
use crate::common::{PageId, Result, StoreError, StringPointer, PAGE_HEADER_SIZE};
use crate::storage::page::StringPage;
use crate::transaction::{LockMode, Transaction};

/// Append-only store of NUL-free byte strings in a chain of String pages.
/// Each string is addressed by the page it landed in and its offset there.
pub struct StringHeapCollection {
    allocator: Arc<dyn AllocateStringPage>,
    root_page_id: PageId,
}

impl StringHeapCollection {
    pub fn create(allocator: Arc<dyn AllocateStringPage>, tran: &dyn Transaction) -> Result<Self> {
        let root = allocator.allocate_string_page(None, None, tran)?;
        let root_page_id = root.page_id();
        debug!(root = %root_page_id, "created string heap");
        Ok(Self {
            allocator,
            root_page_id,
        })
    }

    pub fn open(allocator: Arc<dyn AllocateStringPage>, root_page_id: PageId) -> Self {
        Self {
            allocator,
            root_page_id,
        }
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Longest string a single page can hold.
    pub fn max_string_len(&self) -> usize {
        self.allocator.page_size() - PAGE_HEADER_SIZE - 1
    }

    fn page(&self, page_id: PageId, tran: &dyn Transaction) -> Result<Arc<PageFrame>> {
        self.allocator.get_string_page(page_id, tran)
    }

    /// Stores `bytes` in the first page with room for it.
    pub fn add(&self, bytes: &[u8], tran: &dyn Transaction) -> Result<StringPointer> {
        if bytes.contains(&0) {
            return Err(StoreError::InvalidArgument(
                "strings may not contain NUL bytes".to_string(),
            ));
        }
        if bytes.len() > self.max_string_len() {
            return Err(StoreError::NotEnoughSpace {
                needed: bytes.len() + 1,
                available: self.max_string_len() + 1,
            });
        }

        let mut current = self.root_page_id;
        loop {
            let (fits, next) = {
                let _lock = tran.acquire_lock(current, LockMode::Shared)?;
                let frame = self.page(current, tran)?;
                let data = frame.read();
                let page = StringPage::new(&data[..]);
                (page.can_fit(bytes.len()), page.next_page_id())
            };

            if fits {
                let _lock = tran.acquire_lock(current, LockMode::Exclusive)?;
                let frame = self.page(current, tran)?;
                let mut data = frame.write();
                let mut page = StringPage::new(&mut data[..]);
                if page.can_fit(bytes.len()) {
                    let offset = page.merge_with_offset_fetch(bytes)?;
                    return Ok(StringPointer::new(current, offset));
                }
            }

            current = match next {
                Some(next) => next,
                None => {
                    let _lock = tran.acquire_lock(current, LockMode::Exclusive)?;
                    let linked = {
                        let frame = self.page(current, tran)?;
                        let data = frame.read();
                        let page = StringPage::new(&data[..]);
                        page.next_page_id()
                    };
                    match linked {
                        Some(next) => next,
                        None => self
                            .allocator
                            .allocate_string_page(Some(current), None, tran)?
                            .page_id(),
                    }
                }
            };
        }
    }

    pub fn fetch(&self, pointer: StringPointer, tran: &dyn Transaction) -> Result<Vec<u8>> {
        let _lock = tran.acquire_lock(pointer.page_id, LockMode::Shared)?;
        let frame = self.page(pointer.page_id, tran)?;
        let data = frame.read();
        let value = StringPage::new(&data[..]).fetch_with_offset(pointer.offset);
        value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PageManager;
    use crate::common::{StorageConfig, TransactionId};
    use crate::transaction::{LockingTransaction, PageLockManager};
    use std::time::Duration;

    fn create_heap(page_size: usize) -> (StringHeapCollection, Arc<PageManager>, LockingTransaction) {
        let config = StorageConfig::default().with_page_size(page_size);
        let manager = Arc::new(PageManager::in_memory(config).unwrap());
        let locks = Arc::new(PageLockManager::new(Duration::from_millis(100)));
        let tran = LockingTransaction::new(TransactionId::new(1), locks);
        let heap = StringHeapCollection::create(manager.clone(), &tran).unwrap();
        (heap, manager, tran)
    }

    #[test]
    fn test_add_and_fetch() {
        let (heap, _manager, tran) = create_heap(4096);
        let pointer = heap.add(b"one", &tran).unwrap();
        assert_eq!(pointer.page_id, heap.root_page_id());
        assert_eq!(pointer.offset as usize, PAGE_HEADER_SIZE);
        assert_eq!(heap.fetch(pointer, &tran).unwrap(), b"one");

        let second = heap.add(b"two", &tran).unwrap();
        assert_eq!(second.offset as usize, PAGE_HEADER_SIZE + 4);
        assert_eq!(heap.fetch(second, &tran).unwrap(), b"two");
    }

    #[test]
    fn test_overflow_moves_to_new_page() {
        let (heap, manager, tran) = create_heap(128);
        // 91 usable bytes: two 40 byte strings fit, the third does not
        let value = vec![b'x'; 40];
        let pointers: Vec<_> = (0..3).map(|_| heap.add(&value, &tran).unwrap()).collect();
        assert_eq!(pointers[0].page_id, pointers[1].page_id);
        assert_ne!(pointers[1].page_id, pointers[2].page_id);
        assert_eq!(manager.allocated_page_count(), 2);

        // a short string still lands in the first page's remaining space
        let short = heap.add(b"abc", &tran).unwrap();
        assert_eq!(short.page_id, heap.root_page_id());
        for pointer in pointers {
            assert_eq!(heap.fetch(pointer, &tran).unwrap(), value);
        }
    }

    #[test]
    fn test_rejects_invalid_strings() {
        let (heap, _manager, tran) = create_heap(128);
        assert!(matches!(heap.add(b"a\0b", &tran), Err(StoreError::InvalidArgument(_))));
        let too_long = vec![b'x'; heap.max_string_len() + 1];
        assert!(matches!(
            heap.add(&too_long, &tran),
            Err(StoreError::NotEnoughSpace { .. })
        ));
        assert!(heap.add(&vec![b'x'; heap.max_string_len()], &tran).is_ok());
    }

    #[test]
    fn test_fetch_off_boundary_is_corrupted() {
        let (heap, _manager, tran) = create_heap(4096);
        let pointer = heap.add(b"hello", &tran).unwrap();
        let inside = StringPointer::new(pointer.page_id, pointer.offset + 2);
        assert!(matches!(
            heap.fetch(inside, &tran),
            Err(StoreError::PageCorrupted { .. })
        ));
    }
}
