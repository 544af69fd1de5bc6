//! Synchronized inventory snapshot (资源清单)

use serde::{Deserialize, Serialize};

use super::ResourceType;

/// One provider resource as last seen by a sync run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CloudResource {
    pub id: i64,
    pub account_id: i64,
    pub resource_type: ResourceType,
    pub region: String,
    pub resource_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    /// Provider-native attributes, normalized by the gateway adapter
    #[cfg_attr(feature = "db", sqlx(json))]
    pub attributes: serde_json::Value,
    pub last_sync_time: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// A resource as reported by a provider listing, before it is stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceItem {
    pub resource_id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub attributes: serde_json::Value,
}

impl ResourceItem {
    pub fn new(resource_id: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            name: None,
            status: None,
            attributes: serde_json::Value::Object(Default::default()),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }
}
