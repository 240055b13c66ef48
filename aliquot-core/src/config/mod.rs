//! Configuration types
//!
//! Board-agnostic configuration structures stored as postcard binary data.

pub mod machine;
pub mod types;

pub use machine::*;
pub use types::*;
