use std::cmp::Ordering;
use std::fmt;

use bytes::{Buf, BufMut};

use crate::common::{PageId, Result, StoreError, StringPointer};

use super::{ColumnInfo, ColumnType};

/// A typed column value.
/// Each variant corresponds to a ColumnType and holds the decoded data.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// 32-bit signed integer
    Int(i32),

    /// 64-bit floating point
    Double(f64),

    /// Page id, `NULL_PAGE_ID` when the pointer is unset
    PagePointer(PageId),

    /// Address of a string heap record
    StringPointer(StringPointer),

    /// Fixed-length string; shorter values are zero padded on encode
    FixedString(Vec<u8>),
}

impl Value {
    pub fn column_type(&self) -> ColumnType {
        match self {
            Value::Int(_) => ColumnType::Int,
            Value::Double(_) => ColumnType::Double,
            Value::PagePointer(_) => ColumnType::PagePointer,
            Value::StringPointer(_) => ColumnType::StringPointer,
            Value::FixedString(_) => ColumnType::FixedString,
        }
    }

    /// Encodes the value into `out`, which must be exactly `column.size()` bytes.
    pub fn encode_into(&self, column: &ColumnInfo, mut out: &mut [u8]) -> Result<()> {
        if self.column_type() != column.column_type {
            return Err(StoreError::InvalidArgument(format!(
                "cannot store a {} value in a {} column",
                self.column_type(),
                column.column_type
            )));
        }
        match self {
            Value::Int(v) => out.put_i32_le(*v),
            Value::Double(v) => out.put_f64_le(*v),
            Value::PagePointer(id) => out.put_u64_le(id.0),
            Value::StringPointer(ptr) => {
                out.put_u64_le(ptr.page_id.0);
                out.put_u32_le(ptr.offset);
            }
            Value::FixedString(bytes) => {
                if bytes.len() > column.rep_count {
                    return Err(StoreError::InvalidArgument(format!(
                        "string of {} bytes does not fit a column of {}",
                        bytes.len(),
                        column.rep_count
                    )));
                }
                out[..bytes.len()].copy_from_slice(bytes);
                out[bytes.len()..].fill(0);
            }
        }
        Ok(())
    }

    /// Decodes a value of the given column from exactly `column.size()` bytes.
    pub fn decode(column: &ColumnInfo, mut data: &[u8]) -> Value {
        match column.column_type {
            ColumnType::Int => Value::Int(data.get_i32_le()),
            ColumnType::Double => Value::Double(data.get_f64_le()),
            ColumnType::PagePointer => Value::PagePointer(PageId(data.get_u64_le())),
            ColumnType::StringPointer => {
                let page_id = PageId(data.get_u64_le());
                let offset = data.get_u32_le();
                Value::StringPointer(StringPointer::new(page_id, offset))
            }
            ColumnType::FixedString => Value::FixedString(data.to_vec()),
        }
    }

    /// Compares two values for ordering.
    /// Returns None if the values have different types or a double is NaN.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::PagePointer(a), Value::PagePointer(b)) => Some(a.cmp(b)),
            (Value::StringPointer(a), Value::StringPointer(b)) => Some(a.cmp(b)),
            (Value::FixedString(a), Value::FixedString(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::PagePointer(id) if id.is_null() => write!(f, "NULL"),
            Value::PagePointer(id) => write!(f, "{}", id),
            Value::StringPointer(ptr) => write!(f, "{}", ptr),
            Value::FixedString(bytes) => {
                let end = bytes.iter().position(|b| *b == 0).unwrap_or(bytes.len());
                write!(f, "'{}'", String::from_utf8_lossy(&bytes[..end]))
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<PageId> for Value {
    fn from(v: PageId) -> Self {
        Value::PagePointer(v)
    }
}

impl From<StringPointer> for Value {
    fn from(v: StringPointer) -> Self {
        Value::StringPointer(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::FixedString(v.as_bytes().to_vec())
    }
}
