//! 工具模块 - 通用工具函数和类型
//!
//! - [`AppError`] / [`AppResult`] - service-level errors
//! - [`deadline`] - deadline + cancellation wrapper for suspension points
//! - [`logger`] - tracing subscriber setup

pub mod deadline;
pub mod error;
pub mod logger;

pub use deadline::with_deadline;
pub use error::{AppError, AppResult};
