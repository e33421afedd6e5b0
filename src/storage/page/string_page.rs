use std::ops::{Deref, DerefMut};

use crate::common::{Result, StoreError, PAGE_HEADER_SIZE};

use super::header::RawPage;

/// Page of NUL-terminated byte strings packed one after another from the
/// end of the header. A record is addressed by the in-page offset of its
/// first byte.
pub struct StringPage<B> {
    raw: RawPage<B>,
}

impl<B> Deref for StringPage<B> {
    type Target = RawPage<B>;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl<B> DerefMut for StringPage<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

fn check_record(bytes: &[u8]) -> Result<()> {
    if bytes.contains(&0) {
        return Err(StoreError::InvalidArgument(
            "strings stored in a string page may not contain NUL bytes".to_string(),
        ));
    }
    Ok(())
}

/// Bytes a set of records occupies, terminators included.
fn encoded_len<S: AsRef<[u8]>>(items: &[S]) -> usize {
    items.iter().map(|s| s.as_ref().len() + 1).sum()
}

impl<B: AsRef<[u8]>> StringPage<B> {
    pub fn new(data: B) -> Self {
        Self {
            raw: RawPage::new(data),
        }
    }

    /// Absolute offset one past the last terminator.
    fn used_end(&self) -> usize {
        let mut end = PAGE_HEADER_SIZE;
        let bytes = self.bytes();
        for _ in 0..self.row_count() {
            match bytes[end..].iter().position(|b| *b == 0) {
                Some(pos) => end += pos + 1,
                None => return bytes.len(),
            }
        }
        end
    }

    pub fn free_space(&self) -> usize {
        self.bytes().len() - self.used_end()
    }

    /// Upper bound on the records a page of `page_size` bytes can hold.
    pub fn max_row_count_for(page_size: usize) -> usize {
        page_size.saturating_sub(PAGE_HEADER_SIZE)
    }

    pub fn max_row_count(&self) -> usize {
        Self::max_row_count_for(self.bytes().len())
    }

    /// Returns true if a string of `len` bytes fits in the remaining space.
    pub fn can_fit(&self, len: usize) -> bool {
        len + 1 <= self.free_space()
    }

    pub fn deserialize(&self) -> Vec<Vec<u8>> {
        let bytes = &self.bytes()[PAGE_HEADER_SIZE..self.used_end()];
        bytes
            .split(|b| *b == 0)
            .take(self.row_count())
            .map(|s| s.to_vec())
            .collect()
    }

    /// Reads the record starting at `offset`. The offset must be exactly the
    /// start of a record.
    pub fn fetch_with_offset(&self, offset: u32) -> Result<Vec<u8>> {
        let offset = offset as usize;
        let end = self.used_end();
        let bytes = self.bytes();
        let on_boundary = offset < end
            && (offset == PAGE_HEADER_SIZE || (offset > PAGE_HEADER_SIZE && bytes[offset - 1] == 0));
        if !on_boundary {
            return Err(StoreError::corrupted(
                self.page_id(),
                format!("offset {} is not a record boundary", offset),
            ));
        }
        let len = bytes[offset..end]
            .iter()
            .position(|b| *b == 0)
            .ok_or_else(|| StoreError::corrupted(self.page_id(), "unterminated record"))?;
        Ok(bytes[offset..offset + len].to_vec())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> StringPage<B> {
    /// Replaces the page contents with `items`.
    pub fn serialize<S: AsRef<[u8]>>(&mut self, items: &[S]) -> Result<()> {
        for item in items {
            check_record(item.as_ref())?;
        }
        let needed = encoded_len(items);
        let available = self.payload_capacity();
        if needed > available {
            return Err(StoreError::NotEnoughSpace { needed, available });
        }
        let payload = self.payload_mut();
        payload.fill(0);
        let mut pos = 0;
        for item in items {
            let item = item.as_ref();
            payload[pos..pos + item.len()].copy_from_slice(item);
            pos += item.len() + 1;
        }
        self.set_row_count(items.len());
        Ok(())
    }

    /// Appends `items` after the existing records.
    pub fn merge<S: AsRef<[u8]>>(&mut self, items: &[S]) -> Result<()> {
        for item in items {
            check_record(item.as_ref())?;
        }
        let needed = encoded_len(items);
        let available = self.free_space();
        if needed > available {
            return Err(StoreError::NotEnoughSpace { needed, available });
        }
        for item in items {
            self.append(item.as_ref());
        }
        Ok(())
    }

    /// Appends one string and returns the offset it was written at.
    pub fn merge_with_offset_fetch(&mut self, item: &[u8]) -> Result<u32> {
        check_record(item)?;
        let available = self.free_space();
        if item.len() + 1 > available {
            return Err(StoreError::NotEnoughSpace {
                needed: item.len() + 1,
                available,
            });
        }
        Ok(self.append(item) as u32)
    }

    fn append(&mut self, item: &[u8]) -> usize {
        let offset = self.used_end();
        let row_count = self.row_count();
        let bytes = self.bytes_mut();
        bytes[offset..offset + item.len()].copy_from_slice(item);
        bytes[offset + item.len()] = 0;
        self.set_row_count(row_count + 1);
        offset
    }
}
