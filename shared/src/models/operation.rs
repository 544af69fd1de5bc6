//! Resource Operation Model (资源操作记录)
//!
//! Journal entry for a long-running provider action such as a disk
//! create/attach/detach/resize/delete.

use serde::{Deserialize, Serialize};

use super::ResourceType;

/// Provider action being journaled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum OperationKind {
    Create,
    Attach,
    Detach,
    Resize,
    Delete,
}

str_enum!(OperationKind, "operation kind", {
    Create => "create",
    Attach => "attach",
    Detach => "detach",
    Resize => "resize",
    Delete => "delete",
});

/// Operation status: `pending → running → success | failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum OperationStatus {
    Pending,
    Running,
    Success,
    Failed,
}

str_enum!(OperationStatus, "operation status", {
    Pending => "pending",
    Running => "running",
    Success => "success",
    Failed => "failed",
});

impl OperationStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OperationStatus::Success | OperationStatus::Failed)
    }
}

/// Terminal result passed to `complete`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationOutcome {
    Success,
    Failed,
}

impl From<OperationOutcome> for OperationStatus {
    fn from(outcome: OperationOutcome) -> Self {
        match outcome {
            OperationOutcome::Success => OperationStatus::Success,
            OperationOutcome::Failed => OperationStatus::Failed,
        }
    }
}

/// Operation record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct ResourceOperation {
    pub id: i64,
    /// Weak reference, lookup only
    pub account_id: Option<i64>,
    pub resource_type: ResourceType,
    /// Provider resource id; empty for a create until the provider assigns one
    pub resource_id: String,
    pub region: Option<String>,
    pub operation: OperationKind,
    pub status: OperationStatus,
    pub instance_id: Option<String>,
    /// Opaque request parameters
    #[cfg_attr(feature = "db", sqlx(json))]
    pub parameters: serde_json::Value,
    pub error_msg: Option<String>,
    pub start_time: i64,
    /// Set exactly once, on entering a terminal status
    pub end_time: Option<i64>,
    /// Whole seconds between start and end
    pub duration: Option<i64>,
    pub operator: String,
    pub created_at: i64,
    pub updated_at: i64,
}

/// New operation payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationStart {
    pub account_id: Option<i64>,
    pub resource_type: ResourceType,
    pub resource_id: String,
    pub region: Option<String>,
    pub operation: OperationKind,
    pub instance_id: Option<String>,
    #[serde(default)]
    pub parameters: serde_json::Value,
    pub operator: String,
}

impl OperationStart {
    /// Disk operation with no account/region context
    pub fn disk(
        operation: OperationKind,
        resource_id: impl Into<String>,
        parameters: serde_json::Value,
        operator: impl Into<String>,
    ) -> Self {
        Self {
            account_id: None,
            resource_type: ResourceType::Disk,
            resource_id: resource_id.into(),
            region: None,
            operation,
            instance_id: None,
            parameters,
            operator: operator.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Success.is_terminal());
        assert!(OperationStatus::Failed.is_terminal());
    }

    #[test]
    fn test_outcome_maps_to_terminal() {
        assert_eq!(
            OperationStatus::from(OperationOutcome::Failed),
            OperationStatus::Failed
        );
        assert!(OperationStatus::from(OperationOutcome::Success).is_terminal());
    }
}
