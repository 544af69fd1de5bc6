//! 统一错误处理
//!
//! [`AppError`] is what every public entry point of the sync core returns.
//! Storage errors arrive as [`RepoError`] and provider failures as
//! [`ProviderError`]; both convert with `?`.
//!
//! | Variant | Meaning |
//! |---------|---------|
//! | `NotFound` | entity absent |
//! | `Conflict` | uniqueness violation, sync slot held, illegal transition |
//! | `AlreadyTerminal` | completing an operation that already finished |
//! | `Validation` | malformed input |
//! | `Provider` | cloud API failure (code + message) |
//! | `Timeout` / `Cancelled` | deadline elapsed / caller cancelled |
//! | `Database` / `Internal` | storage or transaction failure, bugs |

use crate::db::repository::RepoError;
use crate::gateway::ProviderError;

/// Application-level Result type
pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Operation already terminal: {0}")]
    AlreadyTerminal(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Provider error [{code}]: {message}")]
    Provider { code: String, message: String },

    #[error("Deadline exceeded: {0}")]
    Timeout(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Conflict(_) => "CONFLICT",
            AppError::AlreadyTerminal(_) => "ALREADY_TERMINAL",
            AppError::Validation(_) => "INVALID_INPUT",
            AppError::Provider { .. } => "PROVIDER_ERROR",
            AppError::Timeout(_) => "TIMEOUT",
            AppError::Cancelled(_) => "CANCELLED",
            AppError::Database(_) => "DATABASE_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Conflict-class errors: lock held, duplicate, or finished operation
    pub fn is_conflict(&self) -> bool {
        matches!(self, AppError::Conflict(_) | AppError::AlreadyTerminal(_))
    }
}

impl From<RepoError> for AppError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound(msg) => AppError::NotFound(msg),
            RepoError::Duplicate(msg) => AppError::Conflict(msg),
            RepoError::AlreadyTerminal(msg) => AppError::AlreadyTerminal(msg),
            RepoError::InvalidTransition(msg) => AppError::Conflict(msg),
            RepoError::Validation(msg) => AppError::Validation(msg),
            RepoError::Database(msg) => {
                tracing::error!(target: "database", error = %msg, "Database error occurred");
                AppError::Database(msg)
            }
        }
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::Provider {
            code: err.code,
            message: err.message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repo_error_mapping() {
        let err: AppError = RepoError::Duplicate("name taken".into()).into();
        assert!(matches!(err, AppError::Conflict(_)));
        assert!(err.is_conflict());

        let err: AppError = RepoError::AlreadyTerminal("op 1".into()).into();
        assert_eq!(err.code(), "ALREADY_TERMINAL");
        assert!(err.is_conflict());

        let err: AppError = RepoError::Validation("bad".into()).into();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[test]
    fn test_provider_error_keeps_code() {
        let err: AppError = ProviderError::new("Throttling", "Request was denied").into();
        assert_eq!(
            err.to_string(),
            "Provider error [Throttling]: Request was denied"
        );
    }
}
