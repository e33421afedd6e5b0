mod btree_index;
mod btree_iterator;
mod btree_page;
mod key_comparator;

pub use btree_index::BTreeCollection;
pub use btree_iterator::BTreeIterator;
pub use btree_page::NodeKind;
pub use key_comparator::{BytewiseComparer, ColumnComparer, RowComparer};
