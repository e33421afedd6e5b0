use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::common::{Result, StoreError, PAGE_HEADER_SIZE};
use crate::index::RowComparer;
use crate::tuple::{ColumnSchema, RowHolder, RowsetHolder};

use super::header::RawPage;

/// Page holding packed rows of a single column schema, row-major, right
/// after the header.
pub struct MixedPage<B> {
    raw: RawPage<B>,
    schema: Arc<ColumnSchema>,
}

impl<B> Deref for MixedPage<B> {
    type Target = RawPage<B>;

    fn deref(&self) -> &Self::Target {
        &self.raw
    }
}

impl<B> DerefMut for MixedPage<B> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.raw
    }
}

impl<B: AsRef<[u8]>> MixedPage<B> {
    pub fn new(data: B, schema: Arc<ColumnSchema>) -> Self {
        Self {
            raw: RawPage::new(data),
            schema,
        }
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    /// Number of rows of `row_size` bytes a page of `page_size` bytes holds.
    pub fn max_row_count_for(page_size: usize, row_size: usize) -> usize {
        if row_size == 0 {
            return 0;
        }
        page_size.saturating_sub(PAGE_HEADER_SIZE) / row_size
    }

    pub fn max_row_count(&self) -> usize {
        Self::max_row_count_for(self.bytes().len(), self.schema.row_size())
    }

    pub fn can_fit(&self, count: usize) -> bool {
        self.row_count() + count <= self.max_row_count()
    }

    fn row_range(&self, index: usize) -> std::ops::Range<usize> {
        let size = self.schema.row_size();
        let start = PAGE_HEADER_SIZE + index * size;
        start..start + size
    }

    /// Copies row `index` out of the page. Panics if `index` is past the
    /// last row.
    pub fn row(&self, index: usize) -> RowHolder {
        assert!(
            index < self.row_count(),
            "row {} out of range for page {} with {} rows",
            index,
            self.page_id(),
            self.row_count()
        );
        let range = self.row_range(index);
        // the slice length always equals the schema row size
        match RowHolder::from_bytes(Arc::clone(&self.schema), &self.bytes()[range]) {
            Ok(row) => row,
            Err(e) => unreachable!("{}", e),
        }
    }

    pub fn deserialize(&self) -> RowsetHolder {
        let end = PAGE_HEADER_SIZE + self.row_count() * self.schema.row_size();
        RowsetHolder::from_bytes(
            Arc::clone(&self.schema),
            &self.bytes()[PAGE_HEADER_SIZE..end],
            self.row_count(),
        )
        .unwrap_or_else(|e| unreachable!("{}", e))
    }

    /// Binary search over rows kept in comparer order. `Ok(i)` when row `i`
    /// compares equal to `probe`, otherwise `Err(i)` with the insert position.
    pub fn search<C: RowComparer + ?Sized>(
        &self,
        probe: &RowHolder,
        comparer: &C,
    ) -> std::result::Result<usize, usize> {
        let mut low = 0;
        let mut high = self.row_count();
        while low < high {
            let mid = low + (high - low) / 2;
            match comparer.compare(&self.row(mid), probe) {
                std::cmp::Ordering::Less => low = mid + 1,
                std::cmp::Ordering::Greater => high = mid,
                std::cmp::Ordering::Equal => return Ok(mid),
            }
        }
        Err(low)
    }

    fn check_schema(&self, schema: &ColumnSchema) -> Result<()> {
        if schema != self.schema.as_ref() {
            return Err(StoreError::InvalidArgument(format!(
                "row schema does not match the schema of page {}",
                self.page_id()
            )));
        }
        Ok(())
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> MixedPage<B> {
    fn not_enough_space(&self, rows: usize) -> StoreError {
        let size = self.schema.row_size();
        StoreError::NotEnoughSpace {
            needed: rows * size,
            available: (self.max_row_count() - self.row_count().min(self.max_row_count())) * size,
        }
    }

    /// Replaces the page contents with `rows`.
    pub fn serialize(&mut self, rows: &RowsetHolder) -> Result<()> {
        self.check_schema(rows.schema())?;
        if rows.len() > self.max_row_count() {
            return Err(StoreError::NotEnoughSpace {
                needed: rows.as_bytes().len(),
                available: self.max_row_count() * self.schema.row_size(),
            });
        }
        let payload = self.payload_mut();
        payload.fill(0);
        payload[..rows.as_bytes().len()].copy_from_slice(rows.as_bytes());
        self.set_row_count(rows.len());
        Ok(())
    }

    /// Appends `rows` after the existing rows.
    pub fn merge(&mut self, rows: &RowsetHolder) -> Result<()> {
        self.check_schema(rows.schema())?;
        if !self.can_fit(rows.len()) {
            return Err(self.not_enough_space(rows.len()));
        }
        let start = PAGE_HEADER_SIZE + self.row_count() * self.schema.row_size();
        let end = start + rows.as_bytes().len();
        self.bytes_mut()[start..end].copy_from_slice(rows.as_bytes());
        let row_count = self.row_count() + rows.len();
        self.set_row_count(row_count);
        Ok(())
    }

    pub fn set_row(&mut self, index: usize, row: &RowHolder) -> Result<()> {
        self.check_schema(row.schema())?;
        if index >= self.row_count() {
            return Err(StoreError::InvalidArgument(format!(
                "row {} out of range for page {}",
                index,
                self.page_id()
            )));
        }
        let range = self.row_range(index);
        self.bytes_mut()[range].copy_from_slice(row.as_bytes());
        Ok(())
    }

    /// Inserts `row` at its sorted position and returns that position.
    /// Rows comparing equal to an existing row are rejected.
    pub fn insert_ordered<C: RowComparer + ?Sized>(
        &mut self,
        row: &RowHolder,
        comparer: &C,
    ) -> Result<usize> {
        self.check_schema(row.schema())?;
        if !self.can_fit(1) {
            return Err(self.not_enough_space(1));
        }
        let position = match self.search(row, comparer) {
            Ok(_) => return Err(StoreError::KeyAlreadyExists),
            Err(position) => position,
        };

        let row_count = self.row_count();
        let size = self.schema.row_size();
        let start = self.row_range(position).start;
        let end = PAGE_HEADER_SIZE + row_count * size;
        let bytes = self.bytes_mut();
        bytes.copy_within(start..end, start + size);
        bytes[start..start + size].copy_from_slice(row.as_bytes());
        self.set_row_count(row_count + 1);
        Ok(position)
    }

    /// Splits this page around `split_index`: rows after it move to
    /// `other`, rows before it stay, and the row at the index is removed
    /// from both and returned as the pivot.
    pub fn split_page<C: AsRef<[u8]> + AsMut<[u8]>>(
        &mut self,
        other: &mut MixedPage<C>,
        split_index: usize,
    ) -> Result<RowHolder> {
        other.check_schema(&self.schema)?;
        let row_count = self.row_count();
        if split_index >= row_count {
            return Err(StoreError::InvalidArgument(format!(
                "split index {} out of range for page {} with {} rows",
                split_index,
                self.page_id(),
                row_count
            )));
        }
        let moved = row_count - split_index - 1;
        if !other.can_fit(moved) {
            return Err(other.not_enough_space(moved));
        }

        let pivot = self.row(split_index);
        let upper = self.row_range(split_index + 1).start;
        let end = PAGE_HEADER_SIZE + row_count * self.schema.row_size();

        let other_start = PAGE_HEADER_SIZE + other.row_count() * self.schema.row_size();
        let moved_len = end - upper;
        other.bytes_mut()[other_start..other_start + moved_len]
            .copy_from_slice(&self.bytes()[upper..end]);
        let other_rows = other.row_count() + moved;
        other.set_row_count(other_rows);

        let pivot_start = self.row_range(split_index).start;
        self.bytes_mut()[pivot_start..end].fill(0);
        self.set_row_count(split_index);
        Ok(pivot)
    }
}
