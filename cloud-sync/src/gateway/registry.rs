//! Provider → gateway factory lookup

use super::{GatewayFactory, ProviderError, ProviderGateway, ProviderResult};
use shared::models::{CloudAccount, CloudProvider};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Default)]
pub struct GatewayRegistry {
    factories: HashMap<CloudProvider, Arc<dyn GatewayFactory>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `provider`
    pub fn register(&mut self, provider: CloudProvider, factory: impl GatewayFactory + 'static) {
        if self.factories.insert(provider, Arc::new(factory)).is_some() {
            tracing::warn!(provider = %provider, "Gateway factory replaced");
        }
    }

    pub fn with(mut self, provider: CloudProvider, factory: impl GatewayFactory + 'static) -> Self {
        self.register(provider, factory);
        self
    }

    pub fn supports(&self, provider: CloudProvider) -> bool {
        self.factories.contains_key(&provider)
    }

    /// Gateway for `account`, using its provider and credentials
    pub fn gateway_for(&self, account: &CloudAccount) -> ProviderResult<Arc<dyn ProviderGateway>> {
        let factory = self
            .factories
            .get(&account.provider)
            .ok_or_else(|| ProviderError::unsupported_provider(account.provider))?;
        factory.build(account)
    }
}

impl fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut providers: Vec<&str> = self.factories.keys().map(|p| p.as_str()).collect();
        providers.sort_unstable();
        f.debug_struct("GatewayRegistry")
            .field("providers", &providers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::MemoryGateway;

    fn account(provider: CloudProvider) -> CloudAccount {
        CloudAccount {
            id: 1,
            name: "prod".into(),
            provider,
            access_key: "AKIDEXAMPLE0001".into(),
            secret_key: "secret".into(),
            regions: vec!["cn-hangzhou".into()],
            is_enabled: true,
            description: None,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn test_unknown_provider_is_a_provider_error() {
        let registry = GatewayRegistry::new();
        let err = registry
            .gateway_for(&account(CloudProvider::Aws))
            .err()
            .unwrap();
        assert_eq!(err.code, "UnsupportedProvider");
    }

    #[test]
    fn test_registered_factory_is_used() {
        let gateway = Arc::new(MemoryGateway::new(CloudProvider::Aliyun));
        let registry = GatewayRegistry::new().with(CloudProvider::Aliyun, gateway.factory());
        assert!(registry.supports(CloudProvider::Aliyun));
        let built = registry.gateway_for(&account(CloudProvider::Aliyun)).unwrap();
        assert_eq!(built.provider(), CloudProvider::Aliyun);
    }
}
