mod fixed_page;
mod header;
mod mixed_page;
mod string_page;

pub use fixed_page::{DoublePage, FixedElement, FixedPage, IntPage, LongPage};
pub use header::{validate_header, PageType, RawPage};
pub use mixed_page::MixedPage;
pub use string_page::StringPage;
