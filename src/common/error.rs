use thiserror::Error;

use super::types::{PageId, TransactionId};
use crate::storage::page::PageType;

/// Storage engine error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Page {page_id} corrupted: {reason}")]
    PageCorrupted { page_id: PageId, reason: String },

    #[error("Not enough space: need {needed} bytes, {available} available")]
    NotEnoughSpace { needed: usize, available: usize },

    #[error("Key already exists")]
    KeyAlreadyExists,

    #[error("Key not found")]
    KeyNotFound,

    #[error("Page {page_id} has type {actual:?}, expected {expected:?}")]
    PageTypeMismatch {
        page_id: PageId,
        expected: PageType,
        actual: PageType,
    },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{transaction} timed out waiting for a lock on {page_id}")]
    LockTimeout {
        transaction: TransactionId,
        page_id: PageId,
    },

    #[error("Lock error: {0}")]
    LockError(String),

    #[error("I/O scheduler error: {0}")]
    IoScheduler(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid store file: {0}")]
    InvalidStoreFile(String),
}

impl StoreError {
    pub(crate) fn corrupted(page_id: PageId, reason: impl Into<String>) -> Self {
        StoreError::PageCorrupted {
            page_id,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
