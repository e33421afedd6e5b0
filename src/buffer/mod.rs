mod allocation_map;
mod buffer_pool;
mod eviction;
mod page_frame;
mod page_manager;

pub use allocation_map::*;
pub use buffer_pool::*;
pub use eviction::*;
pub use page_frame::*;
pub use page_manager::*;
