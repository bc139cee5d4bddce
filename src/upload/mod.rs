//! Upload Store Module
//!
//! Deposited hash sets live here until they are matched against, expire,
//! get evicted to make room, or burn through their query budget.

pub mod store;
pub mod types;

pub use store::UploadStore;
pub use types::*;
