//! Provider Gateway
//!
//! Abstraction over cloud vendor APIs. The sync core only ever talks to a
//! [`ProviderGateway`]; concrete adapters normalize vendor pagination into
//! [`ResourcePage`] and vendor failures into [`ProviderError`].
//!
//! Calls are slow and fallible, and must be idempotent when retried.

pub mod memory;
pub mod registry;

pub use memory::MemoryGateway;
pub use registry::GatewayRegistry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use shared::models::{CloudAccount, CloudProvider, ResourceItem, ResourceType};
use std::sync::Arc;
use thiserror::Error;

/// Failure reported by a provider, carrying its native error code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("[{code}] {message}")]
pub struct ProviderError {
    pub code: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unsupported_provider(provider: CloudProvider) -> Self {
        Self::new(
            "UnsupportedProvider",
            format!("no gateway registered for provider {provider}"),
        )
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// One page of a provider listing
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourcePage {
    pub items: Vec<ResourceItem>,
    /// `None` on the last page
    pub next_page_token: Option<String>,
}

/// Request body for [`ProviderGateway::create_resource`]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateResourceSpec {
    pub resource_type: ResourceType,
    pub name: Option<String>,
    pub size_gb: Option<u32>,
    /// Vendor-specific extras (category, zone, encryption...)
    #[serde(default)]
    pub parameters: serde_json::Value,
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    fn provider(&self) -> CloudProvider;

    async fn list_resources(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_token: Option<&str>,
    ) -> ProviderResult<ResourcePage>;

    /// Returns the provider-assigned resource id
    async fn create_resource(&self, region: &str, spec: &CreateResourceSpec)
    -> ProviderResult<String>;

    async fn attach(&self, resource_id: &str, target_id: &str) -> ProviderResult<()>;

    async fn detach(&self, resource_id: &str, target_id: &str) -> ProviderResult<()>;

    async fn resize(&self, resource_id: &str, new_size_gb: u32) -> ProviderResult<()>;

    async fn delete(&self, resource_id: &str) -> ProviderResult<()>;
}

/// Builds a gateway bound to one account's credentials
pub trait GatewayFactory: Send + Sync {
    fn build(&self, account: &CloudAccount) -> ProviderResult<Arc<dyn ProviderGateway>>;
}

impl<F> GatewayFactory for F
where
    F: Fn(&CloudAccount) -> ProviderResult<Arc<dyn ProviderGateway>> + Send + Sync,
{
    fn build(&self, account: &CloudAccount) -> ProviderResult<Arc<dyn ProviderGateway>> {
        self(account)
    }
}
