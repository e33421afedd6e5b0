use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use bytes::{Buf, BufMut};

use crate::common::{Result, StoreError, PAGE_HEADER_SIZE};

use super::header::{PageType, RawPage};

/// An element type stored packed in a fixed element page.
pub trait FixedElement: Copy + Send + Sync + 'static {
    const SIZE: usize;
    const PAGE_TYPE: PageType;

    fn read(bytes: &[u8]) -> Self;
    fn write(self, out: &mut [u8]);
}

impl FixedElement for i32 {
    const SIZE: usize = 4;
    const PAGE_TYPE: PageType = PageType::Int;

    fn read(mut bytes: &[u8]) -> Self {
        bytes.get_i32_le()
    }

    fn write(self, mut out: &mut [u8]) {
        out.put_i32_le(self);
    }
}

impl FixedElement for f64 {
    const SIZE: usize = 8;
    const PAGE_TYPE: PageType = PageType::Double;

    fn read(mut bytes: &[u8]) -> Self {
        bytes.get_f64_le()
    }

    fn write(self, mut out: &mut [u8]) {
        out.put_f64_le(self);
    }
}

impl FixedElement for i64 {
    const SIZE: usize = 8;
    const PAGE_TYPE: PageType = PageType::Long;

    fn read(mut bytes: &[u8]) -> Self {
        bytes.get_i64_le()
    }

    fn write(self, mut out: &mut [u8]) {
        out.put_i64_le(self);
    }
}

/// Page holding a packed array of fixed-size elements after the header.
pub struct FixedPage<B, T> {
    raw: RawPage<B>,
    _marker: PhantomData<T>,
}

pub type IntPage<B> = FixedPage<B, i32>;
pub type DoublePage<B> = FixedPage<B, f64>;
pub type LongPage<B> = FixedPage<B, i64>;

impl<B, T> Deref for FixedPage<B, T> {
    type Target = RawPage<B>;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl<B, T> DerefMut for FixedPage<B, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl<B: AsRef<[u8]>, T: FixedElement> FixedPage<B, T> {
    pub fn new(data: B) -> Self {
        Self {
            raw: RawPage::new(data),
            _marker: PhantomData,
        }
    }

    /// Number of elements a page of `page_size` bytes can hold.
    pub fn max_row_count_for(page_size: usize) -> usize {
        page_size.saturating_sub(PAGE_HEADER_SIZE) / T::SIZE
    }

    pub fn max_row_count(&self) -> usize {
        Self::max_row_count_for(self.bytes().len())
    }

    pub fn can_fit(&self, count: usize) -> bool {
        self.row_count() + count <= self.max_row_count()
    }

    pub fn get(&self, index: usize) -> Result<T> {
        self.check_index(index)?;
        let start = index * T::SIZE;
        Ok(T::read(&self.payload()[start..start + T::SIZE]))
    }

    pub fn deserialize(&self) -> Vec<T> {
        self.payload()
            .chunks_exact(T::SIZE)
            .take(self.row_count())
            .map(T::read)
            .collect()
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.row_count() {
            return Err(StoreError::InvalidArgument(format!(
                "element {} out of range for page {} with {} rows",
                index,
                self.page_id(),
                self.row_count()
            )));
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, T: FixedElement> FixedPage<B, T> {
    /// Replaces the page contents with `items`.
    pub fn serialize(&mut self, items: &[T]) -> Result<()> {
        let max = self.max_row_count();
        if items.len() > max {
            return Err(StoreError::NotEnoughSpace {
                needed: items.len() * T::SIZE,
                available: max * T::SIZE,
            });
        }
        let payload = self.payload_mut();
        payload.fill(0);
        for (item, slot) in items.iter().zip(payload.chunks_exact_mut(T::SIZE)) {
            item.write(slot);
        }
        self.set_row_count(items.len());
        Ok(())
    }

    /// Appends `items` after the existing elements.
    pub fn merge(&mut self, items: &[T]) -> Result<()> {
        if !self.can_fit(items.len()) {
            return Err(StoreError::NotEnoughSpace {
                needed: items.len() * T::SIZE,
                available: (self.max_row_count() - self.row_count()) * T::SIZE,
            });
        }
        let start = self.row_count() * T::SIZE;
        let payload = &mut self.payload_mut()[start..];
        for (item, slot) in items.iter().zip(payload.chunks_exact_mut(T::SIZE)) {
            item.write(slot);
        }
        let row_count = self.row_count() + items.len();
        self.set_row_count(row_count);
        Ok(())
    }

    pub fn set(&mut self, index: usize, value: T) -> Result<()> {
        self.check_index(index)?;
        let start = index * T::SIZE;
        value.write(&mut self.payload_mut()[start..start + T::SIZE]);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;

    fn create_page<T: FixedElement>(size: usize) -> Vec<u8> {
        let mut buf = vec![0u8; size];
        RawPage::new(&mut buf[..]).init(PageId::new(1), T::PAGE_TYPE);
        buf
    }

    #[test]
    fn test_int_page_roundtrip() {
        let mut buf = create_page::<i32>(4096);
        let mut page = IntPage::new(&mut buf[..]);
        let items: Vec<i32> = (-5..500).collect();
        page.serialize(&items).unwrap();

        let page = IntPage::new(&buf[..]);
        assert_eq!(page.row_count(), items.len());
        assert_eq!(page.deserialize(), items);
        assert_eq!(page.get(5).unwrap(), 0);
    }

    #[test]
    fn test_double_and_long_pages() {
        let mut buf = create_page::<f64>(256);
        let mut page = DoublePage::new(&mut buf[..]);
        page.serialize(&[1.5, -2.25, f64::MAX]).unwrap();
        assert_eq!(page.deserialize(), vec![1.5, -2.25, f64::MAX]);

        let mut buf = create_page::<i64>(256);
        let mut page = LongPage::new(&mut buf[..]);
        page.merge(&[i64::MIN, 42]).unwrap();
        page.set(1, 43).unwrap();
        assert_eq!(page.deserialize(), vec![i64::MIN, 43]);
    }

    #[test]
    fn test_max_row_count_from_page_size() {
        assert_eq!(IntPage::<&[u8]>::max_row_count_for(4096), (4096 - 36) / 4);
        assert_eq!(LongPage::<&[u8]>::max_row_count_for(4096), (4096 - 36) / 8);
        assert_eq!(DoublePage::<&[u8]>::max_row_count_for(128), 11);
    }

    #[test]
    fn test_overflow_leaves_page_untouched() {
        let mut buf = create_page::<i64>(128);
        let mut page = LongPage::new(&mut buf[..]);
        let max = page.max_row_count();
        page.merge(&vec![7; max - 1]).unwrap();

        assert!(page.can_fit(1));
        assert!(!page.can_fit(2));
        let err = page.merge(&[1, 2]).unwrap_err();
        assert!(matches!(err, StoreError::NotEnoughSpace { .. }));
        assert_eq!(page.row_count(), max - 1);

        let too_many = vec![0; max + 1];
        assert!(page.serialize(&too_many).is_err());
        assert_eq!(page.deserialize(), vec![7; max - 1]);
    }

    #[test]
    fn test_index_out_of_range() {
        let mut buf = create_page::<i32>(128);
        let mut page = IntPage::new(&mut buf[..]);
        page.merge(&[1]).unwrap();
        assert!(page.get(1).is_err());
        assert!(page.set(3, 9).is_err());
    }
}
