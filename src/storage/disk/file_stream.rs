use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::{Buf, BufMut, BytesMut};
use parking_lot::Mutex;
use tracing::debug;

use crate::common::{Result, StoreError, MIN_PAGE_SIZE};

use super::{PersistedStream, ShadowPage};

const MAGIC: &[u8; 8] = b"PGSTORE1";
const FORMAT_VERSION: u32 = 1;
const INITIALIZED_OFFSET: u64 = 16;
/// Bytes reserved for the file header before the shadow slot.
const FILE_HEADER_SIZE: u64 = 64;
/// position (8) + len (4) + crc (4)
const SHADOW_RECORD_HEADER: usize = 16;

/// File layout:
/// ```text
/// +-------------+--------------------------------+----------------------+
/// | file header | shadow slot (record + image)   | data region          |
/// | 64 bytes    | up to page_size + 16 bytes     | at 2 * page_size ... |
/// +-------------+--------------------------------+----------------------+
/// ```
pub struct FileStream {
    file: Mutex<FileState>,
    path: PathBuf,
    page_size: usize,
    data_offset: u64,
}

struct FileState {
    file: File,
    initialized: bool,
}

fn shadow_checksum(position: u64, data: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&position.to_le_bytes());
    hasher.update(&(data.len() as u32).to_le_bytes());
    hasher.update(data);
    hasher.finalize()
}

impl FileStream {
    /// Opens the store file at `path`, creating it if it does not exist.
    /// An existing file must have been created with the same page size.
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize) -> Result<Self> {
        // the shadow slot must fit in front of the data region
        if page_size < MIN_PAGE_SIZE {
            return Err(StoreError::InvalidConfig(format!(
                "page_size must be at least {} bytes",
                MIN_PAGE_SIZE
            )));
        }
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_ref())?;

        let data_offset = 2 * page_size as u64;
        let file_len = file.metadata()?.len();
        let initialized = if file_len == 0 {
            let mut header = BytesMut::with_capacity(FILE_HEADER_SIZE as usize);
            header.put_slice(MAGIC);
            header.put_u32_le(FORMAT_VERSION);
            header.put_u32_le(page_size as u32);
            header.put_u8(0);
            header.resize(FILE_HEADER_SIZE as usize, 0);
            file.write_all(&header)?;
            file.set_len(data_offset)?;
            file.sync_all()?;
            debug!(path = %path.as_ref().display(), page_size, "created store file");
            false
        } else {
            if file_len < FILE_HEADER_SIZE {
                return Err(StoreError::InvalidStoreFile(
                    "file is shorter than its header".to_string(),
                ));
            }
            let mut header = vec![0u8; FILE_HEADER_SIZE as usize];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut header)?;
            let mut buf = &header[..];
            if &buf[..8] != MAGIC {
                return Err(StoreError::InvalidStoreFile("bad magic".to_string()));
            }
            buf.advance(8);
            let version = buf.get_u32_le();
            if version != FORMAT_VERSION {
                return Err(StoreError::InvalidStoreFile(format!(
                    "unsupported format version {}",
                    version
                )));
            }
            let stored_page_size = buf.get_u32_le() as usize;
            if stored_page_size != page_size {
                return Err(StoreError::InvalidStoreFile(format!(
                    "file uses page size {}, configured {}",
                    stored_page_size, page_size
                )));
            }
            buf.get_u8() != 0
        };

        Ok(Self {
            file: Mutex::new(FileState { file, initialized }),
            path: path.as_ref().to_path_buf(),
            page_size,
            data_offset,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes only the shadow slot. Leaves the real location untouched,
    /// which is the state a crash between the two steps leaves behind.
    #[cfg(test)]
    pub(crate) fn write_shadow_only(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut state = self.file.lock();
        self.write_shadow(&mut state.file, position, data)
    }

    fn write_shadow(&self, file: &mut File, position: u64, data: &[u8]) -> Result<()> {
        if data.len() > self.page_size {
            return Err(StoreError::InvalidArgument(format!(
                "write of {} bytes exceeds the shadow slot of {}",
                data.len(),
                self.page_size
            )));
        }
        let mut record = BytesMut::with_capacity(SHADOW_RECORD_HEADER + data.len());
        record.put_u64_le(position);
        record.put_u32_le(data.len() as u32);
        record.put_u32_le(shadow_checksum(position, data));
        record.put_slice(data);
        file.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;
        file.write_all(&record)?;
        file.sync_data()?;
        Ok(())
    }
}

impl PersistedStream for FileStream {
    fn seek_and_write(&self, position: u64, data: &[u8]) -> Result<()> {
        let mut state = self.file.lock();
        self.write_shadow(&mut state.file, position, data)?;
        state.file.seek(SeekFrom::Start(self.data_offset + position))?;
        state.file.write_all(data)?;
        state.file.sync_data()?;
        Ok(())
    }

    fn seek_and_read(&self, position: u64, len: usize) -> Result<Vec<u8>> {
        let mut state = self.file.lock();
        let mut data = vec![0u8; len];
        state.file.seek(SeekFrom::Start(self.data_offset + position))?;
        state.file.read_exact(&mut data)?;
        Ok(data)
    }

    fn size(&self) -> Result<u64> {
        let state = self.file.lock();
        let len = state.file.metadata()?.len();
        Ok(len.saturating_sub(self.data_offset))
    }

    fn grow(&self, size: u64) -> Result<()> {
        let state = self.file.lock();
        let target = self.data_offset + size;
        if state.file.metadata()?.len() < target {
            state.file.set_len(target)?;
        }
        Ok(())
    }

    fn shrink(&self, size: u64) -> Result<()> {
        let state = self.file.lock();
        let target = self.data_offset + size;
        if state.file.metadata()?.len() > target {
            state.file.set_len(target)?;
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.file.lock().initialized
    }

    fn mark_initialized(&self) -> Result<()> {
        let mut state = self.file.lock();
        state.file.seek(SeekFrom::Start(INITIALIZED_OFFSET))?;
        state.file.write_all(&[1])?;
        state.file.sync_data()?;
        state.initialized = true;
        Ok(())
    }

    fn shadow_page(&self) -> Result<Option<ShadowPage>> {
        let mut state = self.file.lock();
        let mut record = vec![0u8; SHADOW_RECORD_HEADER];
        state.file.seek(SeekFrom::Start(FILE_HEADER_SIZE))?;
        state.file.read_exact(&mut record)?;
        let mut buf = &record[..];
        let position = buf.get_u64_le();
        let len = buf.get_u32_le() as usize;
        let checksum = buf.get_u32_le();
        if len == 0 || len > self.page_size {
            return Ok(None);
        }
        let mut data = vec![0u8; len];
        state.file.read_exact(&mut data)?;
        if shadow_checksum(position, &data) != checksum {
            // torn shadow write: the real location was never touched
            return Ok(None);
        }
        Ok(Some(ShadowPage { position, data }))
    }

    fn sync(&self) -> Result<()> {
        self.file.lock().file.sync_all()?;
        Ok(())
    }
}

impl Drop for FileStream {
    fn drop(&mut self) {
        let _ = self.file.lock().file.sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_stream(page_size: usize) -> (FileStream, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let stream = FileStream::open(temp.path(), page_size).unwrap();
        (stream, temp)
    }

    #[test]
    fn test_new_file_layout() {
        let (stream, temp) = create_stream(256);
        assert!(!stream.is_initialized());
        assert_eq!(stream.size().unwrap(), 0);
        assert_eq!(std::fs::metadata(temp.path()).unwrap().len(), 512);
        assert!(stream.shadow_page().unwrap().is_none());
    }

    #[test]
    fn test_write_read_and_shadow() {
        let (stream, _temp) = create_stream(256);
        let data = vec![7u8; 256];
        stream.seek_and_write(512, &data).unwrap();

        assert_eq!(stream.size().unwrap(), 768);
        assert_eq!(stream.seek_and_read(512, 256).unwrap(), data);
        assert_eq!(
            stream.shadow_page().unwrap(),
            Some(ShadowPage {
                position: 512,
                data: data.clone()
            })
        );
        assert!(!stream.recover().unwrap());
    }

    #[test]
    fn test_reopen_keeps_initialized_flag() {
        let temp = NamedTempFile::new().unwrap();
        {
            let stream = FileStream::open(temp.path(), 256).unwrap();
            stream.seek_and_write(0, &[1u8; 256]).unwrap();
            stream.mark_initialized().unwrap();
        }
        let stream = FileStream::open(temp.path(), 256).unwrap();
        assert!(stream.is_initialized());
        assert_eq!(stream.seek_and_read(0, 256).unwrap(), vec![1u8; 256]);
    }

    #[test]
    fn test_page_size_mismatch_rejected() {
        let temp = NamedTempFile::new().unwrap();
        drop(FileStream::open(temp.path(), 256).unwrap());
        assert!(matches!(
            FileStream::open(temp.path(), 512),
            Err(StoreError::InvalidStoreFile(_))
        ));
    }

    #[test]
    fn test_small_page_size_rejected() {
        let temp = NamedTempFile::new().unwrap();
        assert!(matches!(
            FileStream::open(temp.path(), 64),
            Err(StoreError::InvalidConfig(_))
        ));
        // nothing was written to the file
        assert_eq!(std::fs::metadata(temp.path()).unwrap().len(), 0);
        assert!(FileStream::open(temp.path(), MIN_PAGE_SIZE).is_ok());
    }

    #[test]
    fn test_garbage_file_rejected() {
        let temp = NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), vec![0xABu8; 200]).unwrap();
        assert!(matches!(
            FileStream::open(temp.path(), 256),
            Err(StoreError::InvalidStoreFile(_))
        ));
    }

    #[test]
    fn test_recover_reapplies_interrupted_write() {
        let temp = NamedTempFile::new().unwrap();
        {
            let stream = FileStream::open(temp.path(), 256).unwrap();
            stream.seek_and_write(0, &[1u8; 256]).unwrap();
            stream.write_shadow_only(0, &[2u8; 256]).unwrap();
            assert_eq!(stream.seek_and_read(0, 256).unwrap(), vec![1u8; 256]);
        }
        let stream = FileStream::open(temp.path(), 256).unwrap();
        assert!(stream.recover().unwrap());
        assert_eq!(stream.seek_and_read(0, 256).unwrap(), vec![2u8; 256]);
        assert!(!stream.recover().unwrap());
    }

    #[test]
    fn test_grow_and_shrink() {
        let (stream, _temp) = create_stream(256);
        stream.grow(1024).unwrap();
        assert_eq!(stream.size().unwrap(), 1024);
        stream.grow(10).unwrap();
        assert_eq!(stream.size().unwrap(), 1024);
        stream.shrink(256).unwrap();
        assert_eq!(stream.size().unwrap(), 256);
    }
}
