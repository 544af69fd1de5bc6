//! Long-running resource operations

pub mod runner;

pub use runner::{DiskCreate, MIN_DISK_SIZE_GB, OperationRunner};
