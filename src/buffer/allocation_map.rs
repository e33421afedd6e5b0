use std::sync::Arc;

use tracing::debug;

use crate::common::{PageId, Result, StoreError, BOOT_PAGE_ID};
use crate::storage::page::{IntPage, PageType};

use super::PageFrame;

const BITS_PER_ELEMENT: u64 = 32;

/// Allocation bitmap stored across a chain of Int pages starting at the
/// boot page. Bit `id % bits_per_page` of page `id / bits_per_page` is set
/// once `id` has been handed out. Bitmap pages do not set their own bits.
///
/// Not synchronized: the page manager keeps it behind its allocation mutex
/// so that choosing an id and recording it happen as one step.
pub struct AllocationMap {
    page_size: usize,
    bits_per_page: u64,
    /// Chain in link order; element 0 is the boot page
    pages: Vec<Arc<PageFrame>>,
    next_id: u64,
}

impl AllocationMap {
    pub fn bits_per_page_for(page_size: usize) -> u64 {
        IntPage::<&[u8]>::max_row_count_for(page_size) as u64 * BITS_PER_ELEMENT
    }

    /// Creates the boot bitmap page of an empty store.
    pub fn bootstrap(page_size: usize) -> Result<Self> {
        let boot = Self::new_bitmap_page(BOOT_PAGE_ID, None, page_size)?;
        Ok(Self {
            page_size,
            bits_per_page: Self::bits_per_page_for(page_size),
            pages: vec![Arc::new(boot)],
            next_id: BOOT_PAGE_ID.as_u64() + 1,
        })
    }

    /// Rebuilds the map from a persisted chain, boot page first. The next
    /// id follows the highest id that is either allocated or a bitmap page.
    pub fn load(page_size: usize, chain: Vec<PageFrame>) -> Result<Self> {
        if chain.is_empty() {
            return Err(StoreError::InvalidStoreFile(
                "allocation bitmap chain is empty".to_string(),
            ));
        }
        let bits_per_page = Self::bits_per_page_for(page_size);
        let mut highest = BOOT_PAGE_ID.as_u64();
        for (index, frame) in chain.iter().enumerate() {
            if frame.page_type() != PageType::Int {
                return Err(StoreError::InvalidStoreFile(format!(
                    "bitmap page {} has type {:?}",
                    frame.page_id(),
                    frame.page_type()
                )));
            }
            highest = highest.max(frame.page_id().as_u64());

            let data = frame.read();
            let elements = IntPage::new(&data[..]).deserialize();
            for (position, element) in elements.iter().enumerate().rev() {
                let bits = *element as u32;
                if bits != 0 {
                    let bit = BITS_PER_ELEMENT - 1 - bits.leading_zeros() as u64;
                    let id = index as u64 * bits_per_page
                        + position as u64 * BITS_PER_ELEMENT
                        + bit;
                    highest = highest.max(id);
                    break;
                }
            }
        }

        Ok(Self {
            page_size,
            bits_per_page,
            pages: chain.into_iter().map(Arc::new).collect(),
            next_id: highest + 1,
        })
    }

    fn new_bitmap_page(page_id: PageId, prev: Option<PageId>, page_size: usize) -> Result<PageFrame> {
        let frame = PageFrame::new(page_id, PageType::Int, page_size);
        {
            let mut data = frame.write();
            let mut page = IntPage::new(&mut data[..]);
            let zeros = vec![0i32; page.max_row_count()];
            page.serialize(&zeros)?;
            page.set_prev_page_id(prev);
        }
        Ok(frame)
    }

    /// The id the next allocation will receive.
    pub fn next_id(&self) -> PageId {
        PageId::new(self.next_id)
    }

    /// Hands out the next id. The caller records it with `mark` once the
    /// page exists.
    pub fn take_id(&mut self) -> PageId {
        let id = PageId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn locate(&self, page_id: PageId) -> (usize, usize, u32) {
        let id = page_id.as_u64();
        let page_index = (id / self.bits_per_page) as usize;
        let bit = id % self.bits_per_page;
        (
            page_index,
            (bit / BITS_PER_ELEMENT) as usize,
            (bit % BITS_PER_ELEMENT) as u32,
        )
    }

    pub fn is_allocated(&self, page_id: PageId) -> bool {
        if page_id.is_null() {
            return false;
        }
        let (page_index, element, bit) = self.locate(page_id);
        let frame = match self.pages.get(page_index) {
            Some(frame) => frame,
            None => return false,
        };
        let data = frame.read();
        let element = IntPage::new(&data[..]).get(element);
        matches!(element, Ok(value) if (value as u32) & (1 << bit) != 0)
    }

    /// Sets the bit of `page_id`, growing the chain first if the id is
    /// past its capacity. New bitmap pages take ids from the counter.
    pub fn mark(&mut self, page_id: PageId) -> Result<()> {
        let (page_index, element, bit) = self.locate(page_id);
        while self.pages.len() <= page_index {
            self.grow()?;
        }
        let frame = &self.pages[page_index];
        let mut data = frame.write();
        let mut page = IntPage::new(&mut data[..]);
        let value = page.get(element)? as u32;
        if value & (1 << bit) != 0 {
            return Err(StoreError::corrupted(page_id, "page id is already allocated"));
        }
        page.set(element, (value | (1 << bit)) as i32)
    }

    fn grow(&mut self) -> Result<()> {
        let tail = match self.pages.last() {
            Some(tail) => Arc::clone(tail),
            None => {
                return Err(StoreError::InvalidStoreFile(
                    "allocation bitmap chain is empty".to_string(),
                ))
            }
        };
        let page_id = self.take_id();
        let frame = Self::new_bitmap_page(page_id, Some(tail.page_id()), self.page_size)?;
        {
            let mut data = tail.write();
            IntPage::new(&mut data[..]).set_next_page_id(Some(page_id));
        }
        debug!(%page_id, chain_len = self.pages.len() + 1, "grew allocation bitmap");
        self.pages.push(Arc::new(frame));
        Ok(())
    }

    /// Number of allocated ids.
    pub fn allocated_count(&self) -> usize {
        self.pages
            .iter()
            .map(|frame| {
                let elements = IntPage::new(&frame.read()[..]).deserialize();
                elements
                    .iter()
                    .map(|element| element.count_ones() as usize)
                    .sum::<usize>()
            })
            .sum()
    }

    /// Bitmap pages in chain order.
    pub fn pages(&self) -> &[Arc<PageFrame>] {
        &self.pages
    }

    pub fn bits_per_page(&self) -> u64 {
        self.bits_per_page
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap() {
        let map = AllocationMap::bootstrap(128).unwrap();
        assert_eq!(map.bits_per_page(), 23 * 32);
        assert_eq!(map.next_id(), PageId::new(1));
        assert_eq!(map.pages().len(), 1);
        assert_eq!(map.allocated_count(), 0);
        assert!(!map.is_allocated(BOOT_PAGE_ID));
    }

    #[test]
    fn test_mark_and_query() {
        let mut map = AllocationMap::bootstrap(4096).unwrap();
        let ids: Vec<_> = (0..40).map(|_| map.take_id()).collect();
        for id in &ids {
            map.mark(*id).unwrap();
        }
        assert_eq!(map.allocated_count(), 40);
        assert!(ids.iter().all(|id| map.is_allocated(*id)));
        assert!(!map.is_allocated(PageId::new(41)));
        assert!(!map.is_allocated(PageId::new(1_000_000)));

        assert!(matches!(
            map.mark(ids[3]),
            Err(StoreError::PageCorrupted { .. })
        ));
    }

    #[test]
    fn test_chain_grows_past_capacity() {
        let mut map = AllocationMap::bootstrap(128).unwrap();
        let per_page = map.bits_per_page();
        for _ in 0..per_page {
            let id = map.take_id();
            map.mark(id).unwrap();
        }
        assert_eq!(map.pages().len(), 2);
        let second = map.pages()[1].page_id();
        assert!(!map.is_allocated(second));
        assert_eq!(map.allocated_count() as u64, per_page);

        let boot = map.pages()[0].read();
        assert_eq!(IntPage::new(&boot[..]).next_page_id(), Some(second));
        drop(boot);
        let tail = map.pages()[1].read();
        assert_eq!(IntPage::new(&tail[..]).prev_page_id(), Some(BOOT_PAGE_ID));
    }

    #[test]
    fn test_load_restores_counter() {
        let mut map = AllocationMap::bootstrap(128).unwrap();
        for _ in 0..800 {
            let id = map.take_id();
            map.mark(id).unwrap();
        }
        let next = map.next_id();
        let chain: Vec<_> = map
            .pages()
            .iter()
            .map(|frame| {
                PageFrame::from_bytes(frame.page_id(), frame.read().to_vec(), 128).unwrap()
            })
            .collect();

        let loaded = AllocationMap::load(128, chain).unwrap();
        assert_eq!(loaded.next_id(), next);
        assert_eq!(loaded.allocated_count(), 800);
        assert!(loaded.is_allocated(PageId::new(799)));
    }
}
