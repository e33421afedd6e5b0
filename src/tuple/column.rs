use std::fmt;

use crate::common::{Result, StoreError};

/// Column types that can be stored in a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 32-bit signed integer
    Int,
    /// 64-bit floating point
    Double,
    /// Page id stored as a u64, `NULL_PAGE_ID` for "none"
    PagePointer,
    /// (page id, in-page offset) address of a string heap record
    StringPointer,
    /// Fixed-length byte string, zero padded
    FixedString,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Int => write!(f, "INT"),
            ColumnType::Double => write!(f, "DOUBLE"),
            ColumnType::PagePointer => write!(f, "PAGE_POINTER"),
            ColumnType::StringPointer => write!(f, "STRING_POINTER"),
            ColumnType::FixedString => write!(f, "FIXED_STRING"),
        }
    }
}

/// Type of a column plus its repetition count. The count is only
/// meaningful for fixed strings, where it is the encoded byte length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnInfo {
    pub column_type: ColumnType,
    pub rep_count: usize,
}

impl ColumnInfo {
    pub fn new(column_type: ColumnType, rep_count: usize) -> Self {
        Self {
            column_type,
            rep_count,
        }
    }

    pub fn int() -> Self {
        Self::new(ColumnType::Int, 1)
    }

    pub fn double() -> Self {
        Self::new(ColumnType::Double, 1)
    }

    pub fn page_pointer() -> Self {
        Self::new(ColumnType::PagePointer, 1)
    }

    pub fn string_pointer() -> Self {
        Self::new(ColumnType::StringPointer, 1)
    }

    pub fn fixed_string(len: usize) -> Self {
        Self::new(ColumnType::FixedString, len)
    }

    /// Encoded size of the column in bytes.
    pub fn size(&self) -> usize {
        match self.column_type {
            ColumnType::Int => 4,
            ColumnType::Double => 8,
            ColumnType::PagePointer => 8,
            ColumnType::StringPointer => 12,
            ColumnType::FixedString => self.rep_count,
        }
    }
}

/// Ordered list of columns with the byte offset of each column inside a
/// packed row. Rows carry no padding, so the row size is the sum of the
/// column sizes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnSchema {
    columns: Vec<ColumnInfo>,
    offsets: Vec<usize>,
    row_size: usize,
}

impl ColumnSchema {
    pub fn new(columns: Vec<ColumnInfo>) -> Self {
        let mut offsets = Vec::with_capacity(columns.len());
        let mut row_size = 0;
        for column in &columns {
            offsets.push(row_size);
            row_size += column.size();
        }
        Self {
            columns,
            offsets,
            row_size,
        }
    }

    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn column(&self, index: usize) -> &ColumnInfo {
        &self.columns[index]
    }

    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    pub fn row_size(&self) -> usize {
        self.row_size
    }

    /// Schema made of the selected columns, in the given order.
    pub fn project(&self, columns: &[usize]) -> Result<ColumnSchema> {
        let mut selected = Vec::with_capacity(columns.len());
        for &index in columns {
            let column = self.columns.get(index).ok_or_else(|| {
                StoreError::InvalidArgument(format!(
                    "column {} out of range for schema with {} columns",
                    index,
                    self.columns.len()
                ))
            })?;
            selected.push(*column);
        }
        Ok(ColumnSchema::new(selected))
    }

    /// This schema followed by `extra` columns.
    pub fn extend(&self, extra: &[ColumnInfo]) -> ColumnSchema {
        let mut columns = self.columns.clone();
        columns.extend_from_slice(extra);
        ColumnSchema::new(columns)
    }
}
