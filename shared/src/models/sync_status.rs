//! Cloud Account Sync Status Model (同步状态)
//!
//! One row per (account, resource type, region). The row doubles as the
//! mutual-exclusion record for that sync slot: `phase = running` with a
//! recent `last_sync_time` means another worker owns the slot.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of inventory synchronized from a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "snake_case"))]
pub enum ResourceType {
    Disk,
    Instance,
    Vpc,
    SecurityGroup,
}

str_enum!(ResourceType, "resource type", {
    Disk => "disk",
    Instance => "instance",
    Vpc => "vpc",
    SecurityGroup => "security_group",
});

/// Phase of the most recent sync attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum SyncPhase {
    Running,
    Success,
    Failed,
}

str_enum!(SyncPhase, "sync phase", {
    Running => "running",
    Success => "success",
    Failed => "failed",
});

/// Natural key of a sync slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncKey {
    pub account_id: i64,
    pub resource_type: ResourceType,
    pub region: String,
}

impl SyncKey {
    pub fn new(account_id: i64, resource_type: ResourceType, region: impl Into<String>) -> Self {
        Self {
            account_id,
            resource_type,
            region: region.into(),
        }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "account:{}/{}/{}",
            self.account_id, self.resource_type, self.region
        )
    }
}

/// Sync status row
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CloudAccountSyncStatus {
    pub id: i64,
    pub account_id: i64,
    pub resource_type: ResourceType,
    pub region: String,
    pub phase: SyncPhase,
    /// When the current phase was entered (claim time while running)
    pub last_sync_time: i64,
    pub last_error: Option<String>,
    pub item_count: i64,
    /// Identifies the worker holding the slot while running
    #[serde(skip)]
    pub claim_token: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CloudAccountSyncStatus {
    pub fn key(&self) -> SyncKey {
        SyncKey::new(self.account_id, self.resource_type, self.region.clone())
    }

    /// A running row younger than `lock_timeout_ms` is a live lock
    pub fn is_live_lock(&self, now: i64, lock_timeout_ms: i64) -> bool {
        self.phase == SyncPhase::Running && now - self.last_sync_time < lock_timeout_ms
    }
}

/// Fields written by an unconditional acquire-or-update
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncStatusUpdate {
    pub phase: SyncPhase,
    pub last_sync_time: i64,
    pub last_error: Option<String>,
    pub item_count: i64,
}

impl SyncStatusUpdate {
    pub fn running(now: i64) -> Self {
        Self {
            phase: SyncPhase::Running,
            last_sync_time: now,
            last_error: None,
            item_count: 0,
        }
    }

    pub fn success(now: i64, item_count: i64) -> Self {
        Self {
            phase: SyncPhase::Success,
            last_sync_time: now,
            last_error: None,
            item_count,
        }
    }

    pub fn failed(now: i64, error: impl Into<String>) -> Self {
        Self {
            phase: SyncPhase::Failed,
            last_sync_time: now,
            last_error: Some(error.into()),
            item_count: 0,
        }
    }
}
