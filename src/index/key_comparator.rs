use std::cmp::Ordering;

use crate::tuple::RowHolder;

/// Orders two rows of the same schema by their key columns.
pub trait RowComparer: Send + Sync {
    fn compare(&self, a: &RowHolder, b: &RowHolder) -> Ordering;
}

impl<F> RowComparer for F
where
    F: Fn(&RowHolder, &RowHolder) -> Ordering + Send + Sync,
{
    fn compare(&self, a: &RowHolder, b: &RowHolder) -> Ordering {
        self(a, b)
    }
}

/// Compares rows on a single column.
pub struct ColumnComparer {
    column: usize,
}

impl ColumnComparer {
    pub fn new(column: usize) -> Self {
        Self { column }
    }

    pub fn column(&self) -> usize {
        self.column
    }
}

impl RowComparer for ColumnComparer {
    fn compare(&self, a: &RowHolder, b: &RowHolder) -> Ordering {
        a.get_value(self.column)
            .compare(&b.get_value(self.column))
            .unwrap_or(Ordering::Equal)
    }
}

/// Compares the packed row bytes directly.
pub struct BytewiseComparer;

impl RowComparer for BytewiseComparer {
    fn compare(&self, a: &RowHolder, b: &RowHolder) -> Ordering {
        a.as_bytes().cmp(b.as_bytes())
    }
}
