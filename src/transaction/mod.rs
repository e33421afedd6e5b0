//! Transaction handle contract consumed by the storage core, plus a
//! page lock manager implementing it.

mod lock_guard;
mod lock_manager;

pub use lock_guard::LockGuard;
pub use lock_manager::{LockingTransaction, PageLockManager};

use crate::common::{PageId, Result, TransactionId};
use crate::storage::page::PageType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

/// Log records emitted by the storage core. Their interpretation belongs
/// to whoever drives recovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    AllocatePage {
        page_id: PageId,
        page_type: PageType,
        prev_page_id: Option<PageId>,
        next_page_id: Option<PageId>,
    },
}

/// Handle through which the storage core locks pages and emits log
/// records. Errors from `acquire_lock` are propagated unchanged by every
/// collection operation.
pub trait Transaction: Send + Sync {
    fn id(&self) -> TransactionId;

    /// Blocks until the lock is granted. The lock is held until the
    /// returned guard is dropped.
    fn acquire_lock(&self, page_id: PageId, mode: LockMode) -> Result<LockGuard>;

    /// Returns true if this transaction currently holds `mode` (or a
    /// stronger mode) on `page_id`.
    fn verify_lock(&self, page_id: PageId, mode: LockMode) -> bool;

    fn add_record(&self, record: LogRecord) -> Result<()>;

    fn commit(&self) -> Result<()>;

    fn rollback(&self) -> Result<()>;
}
