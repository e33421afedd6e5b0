use std::io;

use parking_lot::Mutex;

use crate::common::Result;

use super::{PersistedStream, ShadowPage};

/// Volatile stream backed by a byte vector. Follows the same shadow
/// protocol as the file backend so recovery paths behave identically.
#[derive(Default)]
pub struct MemoryStream {
    state: Mutex<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    data: Vec<u8>,
    shadow: Option<ShadowPage>,
    initialized: bool,
}

impl MemoryStream {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PersistedStream for MemoryStream {
    fn seek_and_write(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        state.shadow = Some(ShadowPage {
            position,
            data: data.to_vec(),
        });
        let start = position as usize;
        let end = start + data.len();
        if state.data.len() < end {
            state.data.resize(end, 0);
        }
        state.data[start..end].copy_from_slice(data);
        Ok(())
    }

    fn seek_and_read(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        let state = self.state.lock();
        let start = position as usize;
        let end = start + len;
        if end > state.data.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {}..{} past end of stream", start, end),
            )
            .into());
        }
        Ok(state.data[start..end].to_vec())
    }

    fn size(&self) -> Result<u64> {
        Ok(self.state.lock().data.len() as u64)
    }

    fn grow(&self, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        if (state.data.len() as u64) < size {
            state.data.resize(size as usize, 0);
        }
        Ok(())
    }

    fn shrink(&self, size: u64) -> Result<()> {
        let mut state = self.state.lock();
        if (state.data.len() as u64) > size {
            state.data.truncate(size as usize);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    fn mark_initialized(&self) -> Result<()> {
        self.state.lock().initialized = true;
        Ok(())
    }

    fn shadow_page(&self) -> Result<Option<ShadowPage>> {
        Ok(self.state.lock().shadow.clone())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
