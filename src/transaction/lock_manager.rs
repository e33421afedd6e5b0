use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::common::{PageId, Result, StorageConfig, StoreError, TransactionId};

use super::{LockGuard, LockMode, LogRecord, Transaction};

/// Holders of one page lock. Counts make locks reentrant per transaction.
#[derive(Debug, Default)]
struct PageLockState {
    shared: HashMap<TransactionId, usize>,
    exclusive: Option<(TransactionId, usize)>,
}

impl PageLockState {
    fn can_grant(&self, txn: TransactionId, mode: LockMode) -> bool {
        let exclusive_free = self.exclusive.map_or(true, |(holder, _)| holder == txn);
        match mode {
            LockMode::Shared => exclusive_free,
            // upgrade is allowed only when no other transaction shares the page
            LockMode::Exclusive => exclusive_free && self.shared.keys().all(|holder| *holder == txn),
        }
    }

    fn grant(&mut self, txn: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => *self.shared.entry(txn).or_insert(0) += 1,
            LockMode::Exclusive => match &mut self.exclusive {
                Some((_, count)) => *count += 1,
                None => self.exclusive = Some((txn, 1)),
            },
        }
    }

    fn release(&mut self, txn: TransactionId, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                if let Some(count) = self.shared.get_mut(&txn) {
                    *count -= 1;
                    if *count == 0 {
                        self.shared.remove(&txn);
                    }
                }
            }
            LockMode::Exclusive => {
                if let Some((holder, count)) = &mut self.exclusive {
                    if *holder == txn {
                        *count -= 1;
                        if *count == 0 {
                            self.exclusive = None;
                        }
                    }
                }
            }
        }
    }

    fn holds(&self, txn: TransactionId, mode: LockMode) -> bool {
        let exclusive = self.exclusive.map_or(false, |(holder, _)| holder == txn);
        match mode {
            LockMode::Exclusive => exclusive,
            LockMode::Shared => exclusive || self.shared.contains_key(&txn),
        }
    }

    fn is_free(&self) -> bool {
        self.shared.is_empty() && self.exclusive.is_none()
    }
}

/// Page-granularity shared/exclusive lock table.
///
/// A waiter that cannot be granted within the timeout gets
/// `StoreError::LockTimeout`; this is the only deadlock resolution.
pub struct PageLockManager {
    table: Mutex<HashMap<PageId, PageLockState>>,
    released: Condvar,
    timeout: Duration,
}

impl PageLockManager {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            released: Condvar::new(),
            timeout,
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.lock_timeout)
    }

    /// Acquires `mode` on `page_id` for `txn`, blocking until granted or
    /// the timeout expires.
    pub fn lock(self: &Arc<Self>, txn: TransactionId, page_id: PageId, mode: LockMode) -> Result<LockGuard> {
        let deadline = Instant::now() + self.timeout;
        let mut table = self.table.lock();
        loop {
            let state = table.entry(page_id).or_default();
            if state.can_grant(txn, mode) {
                state.grant(txn, mode);
                break;
            }
            trace!(%txn, %page_id, ?mode, "waiting for page lock");
            if self.released.wait_until(&mut table, deadline).timed_out() {
                let state = table.entry(page_id).or_default();
                if state.can_grant(txn, mode) {
                    state.grant(txn, mode);
                    break;
                }
                if state.is_free() {
                    table.remove(&page_id);
                }
                debug!(%txn, %page_id, ?mode, "page lock timed out");
                return Err(StoreError::LockTimeout {
                    transaction: txn,
                    page_id,
                });
            }
        }
        drop(table);

        let manager = Arc::clone(self);
        Ok(LockGuard::new(
            page_id,
            mode,
            Box::new(move |page_id, mode| manager.release(txn, page_id, mode)),
        ))
    }

    fn release(&self, txn: TransactionId, page_id: PageId, mode: LockMode) {
        let mut table = self.table.lock();
        if let Some(state) = table.get_mut(&page_id) {
            state.release(txn, mode);
            if state.is_free() {
                table.remove(&page_id);
            }
        }
        drop(table);
        self.released.notify_all();
    }

    pub fn holds(&self, txn: TransactionId, page_id: PageId, mode: LockMode) -> bool {
        self.table
            .lock()
            .get(&page_id)
            .map_or(false, |state| state.holds(txn, mode))
    }

    /// Number of pages with at least one holder.
    pub fn locked_page_count(&self) -> usize {
        self.table.lock().len()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

/// Transaction handle backed by a `PageLockManager`. Log records are
/// collected in memory for whoever drives recovery.
pub struct LockingTransaction {
    id: TransactionId,
    lock_manager: Arc<PageLockManager>,
    records: Mutex<Vec<LogRecord>>,
    state: Mutex<TransactionState>,
}

impl LockingTransaction {
    pub fn new(id: TransactionId, lock_manager: Arc<PageLockManager>) -> Self {
        Self {
            id,
            lock_manager,
            records: Mutex::new(Vec::new()),
            state: Mutex::new(TransactionState::Active),
        }
    }

    /// Log records emitted so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn is_active(&self) -> bool {
        *self.state.lock() == TransactionState::Active
    }

    fn finish(&self, next: TransactionState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != TransactionState::Active {
            return Err(StoreError::InvalidArgument(format!(
                "{} already finished as {:?}",
                self.id, *state
            )));
        }
        *state = next;
        Ok(())
    }
}

impl Transaction for LockingTransaction {
    fn id(&self) -> TransactionId {
        self.id
    }

    fn acquire_lock(&self, page_id: PageId, mode: LockMode) -> Result<LockGuard> {
        if !self.is_active() {
            return Err(StoreError::LockError(format!(
                "{} is no longer active",
                self.id
            )));
        }
        self.lock_manager.lock(self.id, page_id, mode)
    }

    fn verify_lock(&self, page_id: PageId, mode: LockMode) -> bool {
        self.lock_manager.holds(self.id, page_id, mode)
    }

    fn add_record(&self, record: LogRecord) -> Result<()> {
        self.records.lock().push(record);
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        self.finish(TransactionState::Committed)?;
        debug!(txn = %self.id, records = self.records.lock().len(), "transaction committed");
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        self.finish(TransactionState::RolledBack)?;
        self.records.lock().clear();
        debug!(txn = %self.id, "transaction rolled back");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn create_manager(timeout_ms: u64) -> Arc<PageLockManager> {
        Arc::new(PageLockManager::new(Duration::from_millis(timeout_ms)))
    }

    #[test]
    fn test_shared_locks_are_compatible() {
        let manager = create_manager(50);
        let page = PageId::new(1);
        let a = manager.lock(TransactionId::new(1), page, LockMode::Shared).unwrap();
        let b = manager.lock(TransactionId::new(2), page, LockMode::Shared).unwrap();

        assert!(manager.holds(TransactionId::new(1), page, LockMode::Shared));
        assert!(!manager.holds(TransactionId::new(1), page, LockMode::Exclusive));
        drop(a);
        drop(b);
        assert_eq!(manager.locked_page_count(), 0);
    }

    #[test]
    fn test_exclusive_conflict_times_out() {
        let manager = create_manager(50);
        let page = PageId::new(1);
        let _held = manager
            .lock(TransactionId::new(1), page, LockMode::Exclusive)
            .unwrap();

        let err = manager
            .lock(TransactionId::new(2), page, LockMode::Shared)
            .unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));
    }

    #[test]
    fn test_reentrant_and_upgrade() {
        let manager = create_manager(50);
        let txn = TransactionId::new(1);
        let page = PageId::new(2);

        let shared = manager.lock(txn, page, LockMode::Shared).unwrap();
        let exclusive = manager.lock(txn, page, LockMode::Exclusive).unwrap();
        let again = manager.lock(txn, page, LockMode::Exclusive).unwrap();
        assert!(manager.holds(txn, page, LockMode::Exclusive));

        drop(again);
        assert!(manager.holds(txn, page, LockMode::Exclusive));
        drop(exclusive);
        assert!(!manager.holds(txn, page, LockMode::Exclusive));
        assert!(manager.holds(txn, page, LockMode::Shared));
        drop(shared);
        assert_eq!(manager.locked_page_count(), 0);
    }

    #[test]
    fn test_upgrade_blocked_by_other_reader() {
        let manager = create_manager(50);
        let page = PageId::new(3);
        let _reader = manager.lock(TransactionId::new(2), page, LockMode::Shared).unwrap();
        let _mine = manager.lock(TransactionId::new(1), page, LockMode::Shared).unwrap();

        assert!(manager
            .lock(TransactionId::new(1), page, LockMode::Exclusive)
            .is_err());
    }

    #[test]
    fn test_waiter_is_woken_on_release() {
        let manager = create_manager(5_000);
        let page = PageId::new(4);
        let held = manager
            .lock(TransactionId::new(1), page, LockMode::Exclusive)
            .unwrap();

        let waiter = {
            let manager = Arc::clone(&manager);
            thread::spawn(move || {
                manager
                    .lock(TransactionId::new(2), page, LockMode::Exclusive)
                    .map(|guard| guard.mode())
            })
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);

        assert_eq!(waiter.join().unwrap().unwrap(), LockMode::Exclusive);
    }

    #[test]
    fn test_finished_transaction_cannot_lock() {
        let txn = LockingTransaction::new(TransactionId::new(7), create_manager(50));
        txn.add_record(LogRecord::AllocatePage {
            page_id: PageId::new(1),
            page_type: crate::storage::page::PageType::Int,
            prev_page_id: None,
            next_page_id: None,
        })
        .unwrap();
        txn.commit().unwrap();

        assert!(matches!(
            txn.acquire_lock(PageId::new(1), LockMode::Shared),
            Err(StoreError::LockError(_))
        ));
        assert!(txn.commit().is_err());
        assert_eq!(txn.records().len(), 1);
    }
}
