use crate::common::PageId;

use super::LockMode;

/// Callback type for releasing a page lock
type ReleaseCallback = Box<dyn FnOnce(PageId, LockMode) + Send + Sync>;

/// RAII guard for a page lock held by a transaction.
/// Releases the lock when dropped, on every exit path.
pub struct LockGuard {
    page_id: PageId,
    mode: LockMode,
    release_callback: Option<ReleaseCallback>,
}

impl LockGuard {
    pub fn new(page_id: PageId, mode: LockMode, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            mode,
            release_callback: Some(release_callback),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn mode(&self) -> LockMode {
        self.mode
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.mode);
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("page_id", &self.page_id)
            .field("mode", &self.mode)
            .finish()
    }
}
