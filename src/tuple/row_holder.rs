use std::fmt;
use std::sync::Arc;

use bytes::{Buf, BufMut};

use crate::common::{PageId, Result, StoreError, StringPointer};

use super::{ColumnInfo, ColumnSchema, ColumnType, Value};

/// One row packed against a column schema.
///
/// Column `i` lives at `[schema.offset(i), schema.offset(i) + size(i))` of
/// the storage buffer. The layout is fixed at construction; projections and
/// merges always produce new, independent rows.
#[derive(Debug, Clone, PartialEq)]
pub struct RowHolder {
    schema: Arc<ColumnSchema>,
    storage: Vec<u8>,
}

impl RowHolder {
    /// Creates a zero-filled row.
    pub fn new(schema: Arc<ColumnSchema>) -> Self {
        let storage = vec![0u8; schema.row_size()];
        Self { schema, storage }
    }

    /// Creates a row from its packed representation.
    pub fn from_bytes(schema: Arc<ColumnSchema>, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != schema.row_size() {
            return Err(StoreError::InvalidArgument(format!(
                "row of {} bytes does not match schema row size {}",
                bytes.len(),
                schema.row_size()
            )));
        }
        Ok(Self {
            schema,
            storage: bytes.to_vec(),
        })
    }

    /// Creates a row holding `values` in column order.
    pub fn from_values(schema: Arc<ColumnSchema>, values: &[Value]) -> Result<Self> {
        if values.len() != schema.column_count() {
            return Err(StoreError::InvalidArgument(format!(
                "{} values given for {} columns",
                values.len(),
                schema.column_count()
            )));
        }
        let mut row = Self::new(schema);
        for (index, value) in values.iter().enumerate() {
            row.set_value(index, value)?;
        }
        Ok(row)
    }

    pub fn schema(&self) -> &Arc<ColumnSchema> {
        &self.schema
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    fn column_range(&self, index: usize) -> std::ops::Range<usize> {
        let start = self.schema.offset(index);
        start..start + self.schema.column(index).size()
    }

    fn typed_column(&self, index: usize, expected: ColumnType) -> std::ops::Range<usize> {
        let actual = self.schema.column(index).column_type;
        assert_eq!(
            actual, expected,
            "column {} is {}, not {}",
            index, actual, expected
        );
        self.column_range(index)
    }

    pub fn get_value(&self, index: usize) -> Value {
        let range = self.column_range(index);
        Value::decode(self.schema.column(index), &self.storage[range])
    }

    pub fn set_value(&mut self, index: usize, value: &Value) -> Result<()> {
        if index >= self.schema.column_count() {
            return Err(StoreError::InvalidArgument(format!(
                "column {} out of range",
                index
            )));
        }
        let range = self.column_range(index);
        let column = *self.schema.column(index);
        value.encode_into(&column, &mut self.storage[range])
    }

    pub fn get_int(&self, index: usize) -> i32 {
        let range = self.typed_column(index, ColumnType::Int);
        (&self.storage[range]).get_i32_le()
    }

    pub fn set_int(&mut self, index: usize, value: i32) {
        let range = self.typed_column(index, ColumnType::Int);
        (&mut self.storage[range]).put_i32_le(value);
    }

    pub fn get_double(&self, index: usize) -> f64 {
        let range = self.typed_column(index, ColumnType::Double);
        (&self.storage[range]).get_f64_le()
    }

    pub fn set_double(&mut self, index: usize, value: f64) {
        let range = self.typed_column(index, ColumnType::Double);
        (&mut self.storage[range]).put_f64_le(value);
    }

    /// Reads a page pointer column, mapping the null sentinel to `None`.
    pub fn get_page_pointer(&self, index: usize) -> Option<PageId> {
        let range = self.typed_column(index, ColumnType::PagePointer);
        PageId::from_link((&self.storage[range]).get_u64_le())
    }

    pub fn set_page_pointer(&mut self, index: usize, page_id: Option<PageId>) {
        let range = self.typed_column(index, ColumnType::PagePointer);
        (&mut self.storage[range]).put_u64_le(PageId::to_link(page_id));
    }

    pub fn get_string_pointer(&self, index: usize) -> StringPointer {
        let range = self.typed_column(index, ColumnType::StringPointer);
        let mut data = &self.storage[range];
        let page_id = PageId(data.get_u64_le());
        StringPointer::new(page_id, data.get_u32_le())
    }

    pub fn set_string_pointer(&mut self, index: usize, pointer: StringPointer) {
        let range = self.typed_column(index, ColumnType::StringPointer);
        let mut out = &mut self.storage[range];
        out.put_u64_le(pointer.page_id.0);
        out.put_u32_le(pointer.offset);
    }

    /// Raw bytes of a fixed string column, padding included.
    pub fn get_fixed_string(&self, index: usize) -> &[u8] {
        let range = self.typed_column(index, ColumnType::FixedString);
        &self.storage[range]
    }

    /// Copies the selected columns, in the given order, into a new row.
    pub fn project(&self, columns: &[usize]) -> Result<RowHolder> {
        let schema = Arc::new(self.schema.project(columns)?);
        Ok(self.project_into(columns, &schema))
    }

    /// Like `project`, but the selected columns are followed by `extra`
    /// zero-initialized columns.
    pub fn project_and_extend(&self, columns: &[usize], extra: &[ColumnInfo]) -> Result<RowHolder> {
        let schema = Arc::new(self.schema.project(columns)?.extend(extra));
        Ok(self.project_into(columns, &schema))
    }

    /// Projects into a precomputed target schema whose leading columns
    /// match `columns`. Any trailing columns of the target are zeroed.
    pub fn project_into(&self, columns: &[usize], schema: &Arc<ColumnSchema>) -> RowHolder {
        let mut row = RowHolder::new(Arc::clone(schema));
        for (target, &source) in columns.iter().enumerate() {
            debug_assert_eq!(schema.column(target), self.schema.column(source));
            let from = self.column_range(source);
            let to = row.column_range(target);
            row.storage[to].copy_from_slice(&self.storage[from]);
        }
        row
    }

    /// Concatenates this row with `other`.
    pub fn merge(&self, other: &RowHolder) -> RowHolder {
        let schema = Arc::new(self.schema.extend(other.schema.columns()));
        let mut storage = Vec::with_capacity(schema.row_size());
        storage.extend_from_slice(&self.storage);
        storage.extend_from_slice(&other.storage);
        RowHolder { schema, storage }
    }
}

impl fmt::Display for RowHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for index in 0..self.schema.column_count() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", self.get_value(index))?;
        }
        write!(f, ")")
    }
}
