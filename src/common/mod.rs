mod config;
mod error;
mod types;

pub use config::*;
pub use error::{Result, StoreError};
pub use types::*;
