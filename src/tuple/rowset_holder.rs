use std::sync::Arc;

use crate::common::{Result, StoreError};

use super::{ColumnSchema, RowHolder};

/// An owned, ordered batch of rows sharing one schema, stored row-major
/// in a single buffer. This is the unit mixed pages serialize and merge.
#[derive(Debug, Clone, PartialEq)]
pub struct RowsetHolder {
    schema: Arc<ColumnSchema>,
    data: Vec<u8>,
    row_count: usize,
}

impl RowsetHolder {
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        Self {
            schema,
            data: Vec::new(),
            row_count: 0,
        }
    }

    pub fn from_rows<'a, I>(schema: Arc<ColumnSchema>, rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = &'a RowHolder>,
    {
        let mut rowset = Self::new(schema);
        for row in rows {
            rowset.push(row)?;
        }
        Ok(rowset)
    }

    /// Builds a rowset over `row_count` packed rows.
    pub fn from_bytes(schema: Arc<ColumnSchema>, bytes: &[u8], row_count: usize) -> Result<Self> {
        if bytes.len() != row_count * schema.row_size() {
            return Err(StoreError::InvalidArgument(format!(
                "{} bytes cannot hold {} rows of {} bytes",
                bytes.len(),
                row_count,
                schema.row_size()
            )));
        }
        Ok(Self {
            schema,
            data: bytes.to_vec(),
            row_count,
        })
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn push(&mut self, row: &RowHolder) -> Result<()> {
        if row.schema().as_ref() != self.schema.as_ref() {
            return Err(StoreError::InvalidArgument(
                "row schema does not match rowset schema".to_string(),
            ));
        }
        self.data.extend_from_slice(row.as_bytes());
        self.row_count += 1;
        Ok(())
    }

    pub fn get(&self, index: usize) -> Option<RowHolder> {
        if index >= self.row_count {
            return None;
        }
        let size = self.schema.row_size();
        let bytes = &self.data[index * size..(index + 1) * size];
        RowHolder::from_bytes(Arc::clone(&self.schema), bytes).ok()
    }

    /// Rows `[start, end)` as a new rowset.
    pub fn slice(&self, start: usize, end: usize) -> RowsetHolder {
        let end = end.min(self.row_count);
        let start = start.min(end);
        let size = self.schema.row_size();
        Self {
            schema: Arc::clone(&self.schema),
            data: self.data[start * size..end * size].to_vec(),
            row_count: end - start,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = RowHolder> + '_ {
        (0..self.row_count).filter_map(move |i| self.get(i))
    }
}
