use std::collections::{BTreeMap, HashMap};

use parking_lot::Mutex;
use tracing::debug;

use crate::common::{PageId, StorageConfig};

/// Decides which resident pages to drop when the in-memory budget is
/// exceeded. Must be told about every page touch, allocation or fetch.
pub trait EvictionPolicy: Send + Sync {
    /// Records a touch of `page_id` and returns the pages to evict now.
    fn record_usage_and_evict(&self, page_id: PageId) -> Vec<PageId>;

    /// Puts back a victim that could not be dropped because it is still in
    /// use. It re-enters as most recently used and never triggers eviction
    /// by itself.
    fn reinstate(&self, page_id: PageId);

    fn current_page_count(&self) -> usize;

    fn free_page_count(&self) -> usize {
        self.in_memory_page_count_limit()
            .saturating_sub(self.current_page_count())
    }

    fn in_memory_page_count_limit(&self) -> usize;
}

/// Touch order of resident pages keyed by a growing stamp, so the map
/// iterates least recently touched first.
#[derive(Debug, Default)]
struct FifoState {
    order: BTreeMap<u64, PageId>,
    stamps: HashMap<PageId, u64>,
    next_stamp: u64,
}

impl FifoState {
    fn touch(&mut self, page_id: PageId) {
        self.remove(page_id);
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.order.insert(stamp, page_id);
        self.stamps.insert(page_id, stamp);
    }

    fn remove(&mut self, page_id: PageId) {
        if let Some(stamp) = self.stamps.remove(&page_id) {
            self.order.remove(&stamp);
        }
    }
}

/// FIFO policy where a touch moves the page to the front. When the resident
/// count goes past the limit, the `evict_count` least recently touched
/// pages are evicted in one batch.
pub struct FifoEvictionPolicy {
    limit: usize,
    evict_count: usize,
    /// Check, mutate and decide all happen under this one lock
    state: Mutex<FifoState>,
}

impl FifoEvictionPolicy {
    pub fn new(limit: usize, evict_count: usize) -> Self {
        Self {
            limit,
            evict_count,
            state: Mutex::new(FifoState::default()),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.in_memory_page_limit, config.evict_batch_size)
    }

    /// Resident page ids, least recently touched first.
    pub fn resident_pages(&self) -> Vec<PageId> {
        self.state.lock().order.values().copied().collect()
    }
}

impl EvictionPolicy for FifoEvictionPolicy {
    fn record_usage_and_evict(&self, page_id: PageId) -> Vec<PageId> {
        let mut state = self.state.lock();
        state.touch(page_id);

        if state.order.len() <= self.limit {
            return Vec::new();
        }

        let mut victims = Vec::with_capacity(self.evict_count);
        while victims.len() < self.evict_count {
            match state.order.pop_first() {
                Some((_, victim)) => {
                    state.stamps.remove(&victim);
                    victims.push(victim);
                }
                None => break,
            }
        }
        debug!(
            touched = %page_id,
            evicted = victims.len(),
            resident = state.order.len(),
            "eviction limit reached"
        );
        victims
    }

    fn reinstate(&self, page_id: PageId) {
        let mut state = self.state.lock();
        if !state.stamps.contains_key(&page_id) {
            state.touch(page_id);
        }
    }

    fn current_page_count(&self) -> usize {
        self.state.lock().order.len()
    }

    fn in_memory_page_count_limit(&self) -> usize {
        self.limit
    }
}
