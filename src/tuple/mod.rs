mod column;
mod row_holder;
mod rowset_holder;
mod value;

pub use column::{ColumnInfo, ColumnSchema, ColumnType};
pub use row_holder::RowHolder;
pub use rowset_holder::RowsetHolder;
pub use value::Value;
