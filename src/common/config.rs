use std::time::Duration;

use super::error::{Result, StoreError};

/// Default size of a page in bytes (4 KB)
pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Smallest page size the engine accepts. Below this the stream header,
/// the shadow slot and a useful B-tree fan-out no longer fit.
pub const MIN_PAGE_SIZE: usize = 128;

/// Size of the common page header shared by every page type
pub const PAGE_HEADER_SIZE: usize = 36;

/// Default number of pages kept resident before eviction kicks in
pub const DEFAULT_IN_MEMORY_PAGE_LIMIT: usize = 1024;

/// Default number of pages evicted at once when the limit is exceeded
pub const DEFAULT_EVICT_BATCH_SIZE: usize = 64;

/// Default time a transaction waits for a page lock
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Storage engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageConfig {
    /// Size of every page in bytes.
    pub page_size: usize,
    /// Number of resident pages above which the eviction policy evicts.
    pub in_memory_page_limit: usize,
    /// Number of least recently used pages evicted per overflow.
    pub evict_batch_size: usize,
    /// How long the page lock manager waits before reporting a timeout.
    pub lock_timeout: Duration,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            in_memory_page_limit: DEFAULT_IN_MEMORY_PAGE_LIMIT,
            evict_batch_size: DEFAULT_EVICT_BATCH_SIZE,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    #[must_use]
    pub fn with_eviction(mut self, in_memory_page_limit: usize, evict_batch_size: usize) -> Self {
        self.in_memory_page_limit = in_memory_page_limit;
        self.evict_batch_size = evict_batch_size;
        self
    }

    #[must_use]
    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.page_size < MIN_PAGE_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "page_size must be at least {} bytes",
                MIN_PAGE_SIZE
            )));
        }
        if self.page_size > u32::MAX as usize {
            return Err(StoreError::InvalidConfig(
                "page_size must fit in the 32-bit header field".to_string(),
            ));
        }
        if self.in_memory_page_limit == 0 {
            return Err(StoreError::InvalidConfig(
                "in_memory_page_limit must be positive".to_string(),
            ));
        }
        if self.evict_batch_size == 0 || self.evict_batch_size > self.in_memory_page_limit {
            return Err(StoreError::InvalidConfig(
                "evict_batch_size must be between 1 and in_memory_page_limit".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = StorageConfig::default();
        assert_eq!(config.page_size, 4096);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        assert!(StorageConfig::default().with_page_size(64).validate().is_err());
        assert!(StorageConfig::default().with_eviction(0, 0).validate().is_err());
        assert!(StorageConfig::default().with_eviction(10, 11).validate().is_err());
        assert!(StorageConfig::default().with_eviction(10, 5).validate().is_ok());
    }
}
