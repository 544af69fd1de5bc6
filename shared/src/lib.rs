//! Shared types for the cloud-sync workspace
//!
//! Domain models for cloud accounts, sync status rows, resource operations
//! and the synchronized inventory, plus pagination helpers.

pub mod models;
pub mod pagination;
pub mod util;

// Re-exports
pub use models::ParseEnumError;
pub use pagination::PaginatedResponse;
pub use serde::{Deserialize, Serialize};
