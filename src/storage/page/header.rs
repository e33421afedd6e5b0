use bytes::{Buf, BufMut};

use crate::common::{PageId, Result, StoreError, NULL_PAGE_ID, PAGE_HEADER_SIZE};

// Header layout (little-endian):
// +---------+-----------+-----------+-----------+------------+------------+
// | page_id | page_size | page_type | row_count | prev_page  | next_page  |
// |  (8)    |   (4)     |   (4)     |   (4)     |   (8)      |   (8)      |
// +---------+-----------+-----------+-----------+------------+------------+
const PAGE_ID_OFFSET: usize = 0;
const PAGE_SIZE_OFFSET: usize = 8;
const PAGE_TYPE_OFFSET: usize = 12;
const ROW_COUNT_OFFSET: usize = 16;
const PREV_PAGE_ID_OFFSET: usize = 20;
const NEXT_PAGE_ID_OFFSET: usize = 28;

/// Closed set of page payload kinds. The tag is stored in the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageType {
    Int,
    Double,
    Long,
    String,
    Mixed,
}

impl PageType {
    pub fn tag(self) -> u32 {
        match self {
            PageType::Int => 1,
            PageType::Double => 2,
            PageType::Long => 3,
            PageType::String => 4,
            PageType::Mixed => 5,
        }
    }

    pub fn from_tag(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(PageType::Int),
            2 => Some(PageType::Double),
            3 => Some(PageType::Long),
            4 => Some(PageType::String),
            5 => Some(PageType::Mixed),
            _ => None,
        }
    }
}

/// Untyped view over a page buffer giving access to the common header.
///
/// Works over any byte container: `&[u8]` for read-only access and
/// `&mut [u8]` (or an owned buffer) when the header must be modified.
pub struct RawPage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> RawPage<B> {
    pub fn new(data: B) -> Self {
        Self { data }
    }

    pub fn bytes(&self) -> &[u8] {
        self.data.as_ref()
    }

    fn read_u32(&self, offset: usize) -> u32 {
        (&self.bytes()[offset..offset + 4]).get_u32_le()
    }

    fn read_u64(&self, offset: usize) -> u64 {
        (&self.bytes()[offset..offset + 8]).get_u64_le()
    }

    pub fn page_id(&self) -> PageId {
        PageId(self.read_u64(PAGE_ID_OFFSET))
    }

    /// Page size as recorded in the header.
    pub fn page_size(&self) -> usize {
        self.read_u32(PAGE_SIZE_OFFSET) as usize
    }

    pub fn page_type(&self) -> Result<PageType> {
        let tag = self.read_u32(PAGE_TYPE_OFFSET);
        PageType::from_tag(tag).ok_or_else(|| {
            StoreError::corrupted(self.page_id(), format!("unknown page type tag {}", tag))
        })
    }

    pub fn row_count(&self) -> usize {
        self.read_u32(ROW_COUNT_OFFSET) as usize
    }

    pub fn prev_page_id(&self) -> Option<PageId> {
        PageId::from_link(self.read_u64(PREV_PAGE_ID_OFFSET))
    }

    pub fn next_page_id(&self) -> Option<PageId> {
        PageId::from_link(self.raw_next())
    }

    /// The undecoded next link. B-tree nodes keep their node kind in its low bit.
    pub fn raw_next(&self) -> u64 {
        self.read_u64(NEXT_PAGE_ID_OFFSET)
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes()[PAGE_HEADER_SIZE..]
    }

    /// Number of payload bytes available after the header.
    pub fn payload_capacity(&self) -> usize {
        self.bytes().len() - PAGE_HEADER_SIZE
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> RawPage<B> {
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }

    fn write_u32(&mut self, offset: usize, value: u32) {
        (&mut self.bytes_mut()[offset..offset + 4]).put_u32_le(value);
    }

    fn write_u64(&mut self, offset: usize, value: u64) {
        (&mut self.bytes_mut()[offset..offset + 8]).put_u64_le(value);
    }

    /// Zeroes the buffer and writes a fresh header with empty links.
    pub fn init(&mut self, page_id: PageId, page_type: PageType) {
        let size = self.bytes().len() as u32;
        self.bytes_mut().fill(0);
        self.write_u64(PAGE_ID_OFFSET, page_id.0);
        self.write_u32(PAGE_SIZE_OFFSET, size);
        self.write_u32(PAGE_TYPE_OFFSET, page_type.tag());
        self.write_u32(ROW_COUNT_OFFSET, 0);
        self.write_u64(PREV_PAGE_ID_OFFSET, NULL_PAGE_ID.0);
        self.write_u64(NEXT_PAGE_ID_OFFSET, NULL_PAGE_ID.0);
    }

    pub fn set_row_count(&mut self, row_count: usize) {
        self.write_u32(ROW_COUNT_OFFSET, row_count as u32);
    }

    pub fn set_prev_page_id(&mut self, page_id: Option<PageId>) {
        self.write_u64(PREV_PAGE_ID_OFFSET, PageId::to_link(page_id));
    }

    pub fn set_next_page_id(&mut self, page_id: Option<PageId>) {
        self.write_u64(NEXT_PAGE_ID_OFFSET, PageId::to_link(page_id));
    }

    pub fn set_raw_next(&mut self, raw: u64) {
        self.write_u64(NEXT_PAGE_ID_OFFSET, raw);
    }

    pub fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.bytes_mut()[PAGE_HEADER_SIZE..]
    }
}

/// Validates the header of a page read back from storage and returns its type.
pub fn validate_header(data: &[u8], expected_id: PageId, page_size: usize) -> Result<PageType> {
    if data.len() != page_size {
        return Err(StoreError::corrupted(
            expected_id,
            format!("buffer is {} bytes, expected {}", data.len(), page_size),
        ));
    }
    let page = RawPage::new(data);
    if page.page_id() != expected_id {
        return Err(StoreError::corrupted(
            expected_id,
            format!("header carries id {}", page.page_id().0),
        ));
    }
    if page.page_size() != page_size {
        return Err(StoreError::corrupted(
            expected_id,
            format!("header records page size {}", page.page_size()),
        ));
    }
    page.page_type()
}
