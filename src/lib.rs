//! pagestore - an embedded page-oriented storage engine
//!
//! Fixed-size pages are addressed by id, cached in a buffer pool with
//! FIFO eviction and persisted through a shadow-protected stream. Row
//! collections are built on top of the page manager.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): persisted streams and page layouts
//!   - `FileStream` / `MemoryStream`: shadow-protected byte streams
//!   - `IoScheduler`: background worker that performs stream I/O
//!   - `IntPage`, `DoublePage`, `LongPage`, `StringPage`, `MixedPage`: typed page views
//!
//! - **Buffer** (`buffer`): page residency and allocation
//!   - `PageManager`: allocates pages and resolves ids to frames
//!   - `FifoEvictionPolicy`: decides which pages leave memory
//!   - `AllocationMap`: allocation bitmap kept in a chain of Int pages
//!
//! - **Transaction** (`transaction`): page locks and log records
//!   - `Transaction`: handle the collections lock through
//!   - `PageLockManager` / `LockingTransaction`: shared/exclusive page locks
//!
//! - **Collections** (`index`, `heap`)
//!   - `BTreeCollection`: ordered unique rows
//!   - `PageListCollection`: unordered rows in a page chain
//!   - `StringHeapCollection`: variable length strings
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use pagestore::buffer::PageManager;
//! use pagestore::common::{StorageConfig, TransactionId};
//! use pagestore::index::{BTreeCollection, ColumnComparer};
//! use pagestore::transaction::{LockingTransaction, PageLockManager};
//! use pagestore::tuple::{ColumnInfo, ColumnSchema, RowHolder, Value};
//!
//! let config = StorageConfig::default();
//! let manager = Arc::new(PageManager::open_file("store.db", config.clone()).unwrap());
//! let locks = Arc::new(PageLockManager::from_config(&config));
//! let tran = LockingTransaction::new(TransactionId::new(1), locks);
//!
//! let schema = Arc::new(ColumnSchema::new(vec![ColumnInfo::int(), ColumnInfo::double()]));
//! let mut tree = BTreeCollection::create(
//!     manager.clone(),
//!     schema.clone(),
//!     &tran,
//!     Arc::new(ColumnComparer::new(0)),
//!     0,
//! )
//! .unwrap();
//!
//! let row = RowHolder::from_values(schema, &[Value::Int(42), Value::Double(0.5)]).unwrap();
//! tree.add(&row, &tran).unwrap();
//! assert_eq!(tree.seek(&Value::Int(42), &tran).unwrap(), row);
//!
//! manager.checkpoint().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod heap;
pub mod index;
pub mod storage;
pub mod transaction;
pub mod tuple;

// Re-export commonly used types at the crate root
pub use common::{PageId, Result, StorageConfig, StoreError, StringPointer, TransactionId};
