use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::common::PageId;

use super::PageFrame;

/// Cache of resident pages keyed by page id. It holds no policy of its
/// own: the page manager decides what enters and leaves.
#[derive(Default)]
pub struct BufferPool {
    pages: Mutex<HashMap<PageId, Arc<PageFrame>>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, page_id: PageId) -> Option<Arc<PageFrame>> {
        self.pages.lock().get(&page_id).cloned()
    }

    /// Inserts `frame` unless a frame for the same id is already resident,
    /// in which case the resident one wins. Returns the frame now cached.
    pub fn add(&self, frame: PageFrame) -> Arc<PageFrame> {
        let mut pages = self.pages.lock();
        Arc::clone(
            pages
                .entry(frame.page_id())
                .or_insert_with(|| Arc::new(frame)),
        )
    }

    /// Removes and returns the cached frame for `page_id`.
    pub fn evict(&self, page_id: PageId) -> Option<Arc<PageFrame>> {
        self.pages.lock().remove(&page_id)
    }

    /// Removes the frame only if nobody outside the pool references it and
    /// it has nothing left to flush. Returns true if it was removed or was
    /// not resident.
    pub fn evict_if_idle(&self, page_id: PageId) -> bool {
        let mut pages = self.pages.lock();
        match pages.get(&page_id) {
            Some(frame) if Arc::strong_count(frame) == 1 && !frame.is_dirty() => {
                pages.remove(&page_id);
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    /// Snapshot of the frames currently marked dirty.
    pub fn dirty_pages(&self) -> impl Iterator<Item = Arc<PageFrame>> {
        let dirty: Vec<_> = self
            .pages
            .lock()
            .values()
            .filter(|frame| frame.is_dirty())
            .cloned()
            .collect();
        dirty.into_iter()
    }

    pub fn contains(&self, page_id: PageId) -> bool {
        self.pages.lock().contains_key(&page_id)
    }

    pub fn len(&self) -> usize {
        self.pages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageType;

    fn create_frame(id: u64) -> PageFrame {
        PageFrame::new(PageId::new(id), PageType::Int, 128)
    }

    #[test]
    fn test_add_get_evict() {
        let pool = BufferPool::new();
        assert!(pool.is_empty());

        let frame = pool.add(create_frame(1));
        assert_eq!(frame.page_id(), PageId::new(1));
        assert!(pool.contains(PageId::new(1)));
        assert!(pool.get(PageId::new(2)).is_none());

        let evicted = pool.evict(PageId::new(1)).unwrap();
        assert!(Arc::ptr_eq(&frame, &evicted));
        assert!(pool.is_empty());
    }

    #[test]
    fn test_resident_frame_wins() {
        let pool = BufferPool::new();
        let first = pool.add(create_frame(1));
        first.write()[100] = 7;

        let second = pool.add(create_frame(1));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read()[100], 7);
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_dirty_pages_snapshot() {
        let pool = BufferPool::new();
        pool.add(create_frame(1));
        pool.add(create_frame(2)).set_dirty(false);

        let dirty: Vec<_> = pool.dirty_pages().map(|f| f.page_id()).collect();
        assert_eq!(dirty, vec![PageId::new(1)]);
    }

    #[test]
    fn test_evict_if_idle() {
        let pool = BufferPool::new();
        let frame = pool.add(create_frame(1));
        frame.set_dirty(false);

        assert!(!pool.evict_if_idle(PageId::new(1)));
        drop(frame);
        assert!(pool.evict_if_idle(PageId::new(1)));
        assert!(!pool.contains(PageId::new(1)));
        assert!(pool.evict_if_idle(PageId::new(1)));
    }
}
