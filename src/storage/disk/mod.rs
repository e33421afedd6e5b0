mod file_stream;
mod io_scheduler;
mod memory_stream;
mod persisted_stream;

pub use file_stream::*;
pub use io_scheduler::*;
pub use memory_stream::*;
pub use persisted_stream::*;
