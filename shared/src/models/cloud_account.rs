//! Cloud Account Model (云账户)

use serde::{Deserialize, Serialize};

/// Cloud vendor an account belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "db", derive(sqlx::Type))]
#[cfg_attr(feature = "db", sqlx(rename_all = "lowercase"))]
pub enum CloudProvider {
    Aliyun,
    Tencent,
    Huawei,
    Aws,
    Azure,
    Gcp,
}

str_enum!(CloudProvider, "cloud provider", {
    Aliyun => "aliyun",
    Tencent => "tencent",
    Huawei => "huawei",
    Aws => "aws",
    Azure => "azure",
    Gcp => "gcp",
});

/// Cloud account entity
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "db", derive(sqlx::FromRow))]
pub struct CloudAccount {
    pub id: i64,
    /// Unique among live accounts
    pub name: String,
    pub provider: CloudProvider,
    /// Unique among live accounts
    pub access_key: String,
    /// Never leaves the process in serialized form
    #[serde(skip_serializing, default)]
    pub secret_key: String,
    /// Regions this account is synchronized in (JSON array)
    #[cfg_attr(feature = "db", sqlx(json))]
    pub regions: Vec<String>,
    pub is_enabled: bool,
    pub description: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl CloudAccount {
    /// Access key safe for logs
    pub fn masked_access_key(&self) -> String {
        mask_key(&self.access_key)
    }
}

/// Access key safe for logs: first and last four characters only
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}****{tail}")
}

/// Create cloud account payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudAccountCreate {
    pub name: String,
    pub provider: CloudProvider,
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub regions: Vec<String>,
    /// Defaults to enabled
    pub is_enabled: Option<bool>,
    pub description: Option<String>,
}

/// Update cloud account payload (only supplied fields are applied)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudAccountUpdate {
    pub name: Option<String>,
    pub provider: Option<CloudProvider>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub regions: Option<Vec<String>>,
    pub is_enabled: Option<bool>,
    /// An empty string clears the description
    pub description: Option<String>,
}

/// List filter for cloud accounts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudAccountQuery {
    /// Page number, starting at 1 (0 or negative → 1)
    #[serde(default)]
    pub page: i64,
    /// Page size (0 or negative → 10)
    #[serde(default)]
    pub size: i64,
    /// Substring match on name
    pub search: Option<String>,
    pub provider: Option<CloudProvider>,
    pub enabled: Option<bool>,
}
