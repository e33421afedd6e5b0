use tracing::warn;

use crate::common::Result;

/// Last page image written to a stream's shadow slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShadowPage {
    /// Logical position the image belongs at
    pub position: u64,
    pub data: Vec<u8>,
}

/// Durable byte store backing the page manager.
///
/// Positions are logical: they start at zero and exclude whatever header
/// or shadow area a backend reserves for itself. Every write first lands
/// in the shadow slot, made durable, and only then at its real position.
/// Each call runs under one internal mutex.
pub trait PersistedStream: Send + Sync {
    fn seek_and_write(&self, position: u64, data: &[u8]) -> Result<()>;

    fn seek_and_read(&self, position: u64, len: usize) -> Result<Vec<u8>>;

    /// Logical size in bytes.
    fn size(&self) -> Result<u64>;

    /// Extends the stream to at least `size` bytes.
    fn grow(&self, size: u64) -> Result<()>;

    /// Truncates the stream to at most `size` bytes.
    fn shrink(&self, size: u64) -> Result<()>;

    fn is_initialized(&self) -> bool;

    fn mark_initialized(&self) -> Result<()>;

    /// The last intact shadow image, if any.
    fn shadow_page(&self) -> Result<Option<ShadowPage>>;

    fn sync(&self) -> Result<()>;

    /// Re-applies the shadow image when the real location does not match
    /// it, which happens when a write was interrupted after the shadow
    /// became durable. Returns true if anything was rewritten.
    fn recover(&self) -> Result<bool> {
        let shadow = match self.shadow_page()? {
            Some(shadow) => shadow,
            None => return Ok(false),
        };
        let end = shadow.position + shadow.data.len() as u64;
        let current = if self.size()? >= end {
            Some(self.seek_and_read(shadow.position, shadow.data.len())?)
        } else {
            None
        };
        if current.as_deref() == Some(&shadow.data[..]) {
            return Ok(false);
        }
        warn!(
            position = shadow.position,
            len = shadow.data.len(),
            "re-applying shadow page after interrupted write"
        );
        self.seek_and_write(shadow.position, &shadow.data)?;
        self.sync()?;
        Ok(true)
    }
}
