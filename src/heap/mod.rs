mod page_list;
mod string_heap;

pub use page_list::{PageListCollection, PageListIterator};
pub use string_heap::StringHeapCollection;
