//! In-process gateway
//!
//! Holds a provider's inventory in memory and applies disk mutations to it.
//! Failures and latency can be scripted, and every call is counted, which is
//! what the integration tests and the development binary rely on.

use super::{
    CreateResourceSpec, GatewayFactory, ProviderError, ProviderGateway, ProviderResult,
    ResourcePage,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use shared::models::{CloudAccount, CloudProvider, ResourceItem, ResourceType};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

const DEFAULT_PAGE_SIZE: usize = 50;

#[derive(Default)]
struct MemoryState {
    /// (resource type, region) → items in listing order
    inventory: HashMap<(ResourceType, String), Vec<ResourceItem>>,
    /// Region → error returned by every listing in that region
    failing_regions: HashMap<String, ProviderError>,
    /// One-shot listing failures, consumed in order
    list_failures: VecDeque<ProviderError>,
    /// One-shot mutation failures, consumed in order
    mutation_failures: VecDeque<ProviderError>,
    next_id: u64,
}

pub struct MemoryGateway {
    provider: CloudProvider,
    page_size: usize,
    latency: Duration,
    state: Mutex<MemoryState>,
    list_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
}

impl MemoryGateway {
    pub fn new(provider: CloudProvider) -> Self {
        Self {
            provider,
            page_size: DEFAULT_PAGE_SIZE,
            latency: Duration::ZERO,
            state: Mutex::new(MemoryState::default()),
            list_calls: AtomicUsize::new(0),
            mutation_calls: AtomicUsize::new(0),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every call sleeps this long before answering
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Replace the listing for (resource type, region)
    pub fn seed(&self, resource_type: ResourceType, region: &str, items: Vec<ResourceItem>) {
        self.state
            .lock()
            .inventory
            .insert((resource_type, region.to_string()), items);
    }

    /// Seed `count` available disks named `d-{region}-{n}`
    pub fn seed_disks(&self, region: &str, count: usize) {
        let items = (1..=count)
            .map(|n| {
                let mut item = ResourceItem::new(format!("d-{region}-{n}")).with_status("available");
                item.attributes = json!({ "size_gb": 40 });
                item
            })
            .collect();
        self.seed(ResourceType::Disk, region, items);
    }

    pub fn fail_region(&self, region: &str, error: ProviderError) {
        self.state
            .lock()
            .failing_regions
            .insert(region.to_string(), error);
    }

    pub fn fail_next_list(&self, error: ProviderError) {
        self.state.lock().list_failures.push_back(error);
    }

    pub fn fail_next_mutation(&self, error: ProviderError) {
        self.state.lock().mutation_failures.push_back(error);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state.lock();
        state.failing_regions.clear();
        state.list_failures.clear();
        state.mutation_failures.clear();
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    /// Current view of one resource, wherever it lives
    pub fn resource(&self, resource_id: &str) -> Option<ResourceItem> {
        let state = self.state.lock();
        state
            .inventory
            .values()
            .flat_map(|items| items.iter())
            .find(|item| item.resource_id == resource_id)
            .cloned()
    }

    /// Factory handing out this same gateway for every account
    pub fn factory(self: &Arc<Self>) -> impl GatewayFactory + 'static {
        let gateway: Arc<dyn ProviderGateway> = self.clone();
        move |_account: &CloudAccount| -> ProviderResult<Arc<dyn ProviderGateway>> {
            Ok(Arc::clone(&gateway))
        }
    }

    async fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    async fn begin_mutation(&self) -> ProviderResult<()> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;
        match self.state.lock().mutation_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Apply `f` to a disk, or fail with the provider's not-found code
    fn with_disk<T>(
        &self,
        resource_id: &str,
        f: impl FnOnce(&mut ResourceItem) -> ProviderResult<T>,
    ) -> ProviderResult<T> {
        let mut state = self.state.lock();
        let disk = state
            .inventory
            .iter_mut()
            .filter(|((rt, _), _)| *rt == ResourceType::Disk)
            .flat_map(|(_, items)| items.iter_mut())
            .find(|item| item.resource_id == resource_id)
            .ok_or_else(|| {
                ProviderError::new(
                    "InvalidDiskId.NotFound",
                    format!("The specified disk {resource_id} does not exist"),
                )
            })?;
        f(disk)
    }
}

fn attribute<'a>(item: &'a ResourceItem, key: &str) -> Option<&'a serde_json::Value> {
    item.attributes.get(key)
}

fn set_attribute(item: &mut ResourceItem, key: &str, value: serde_json::Value) {
    if !item.attributes.is_object() {
        item.attributes = json!({});
    }
    if let Some(map) = item.attributes.as_object_mut() {
        map.insert(key.to_string(), value);
    }
}

#[async_trait]
impl ProviderGateway for MemoryGateway {
    fn provider(&self) -> CloudProvider {
        self.provider
    }

    async fn list_resources(
        &self,
        resource_type: ResourceType,
        region: &str,
        page_token: Option<&str>,
    ) -> ProviderResult<ResourcePage> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate_latency().await;

        let mut state = self.state.lock();
        if let Some(err) = state.list_failures.pop_front() {
            return Err(err);
        }
        if let Some(err) = state.failing_regions.get(region) {
            return Err(err.clone());
        }

        let offset = match page_token {
            None => 0,
            Some(token) => token.parse::<usize>().map_err(|_| {
                ProviderError::new("InvalidParameter.NextToken", format!("bad page token {token:?}"))
            })?,
        };
        let items = state
            .inventory
            .get(&(resource_type, region.to_string()))
            .map(Vec::as_slice)
            .unwrap_or_default();
        let end = offset.saturating_add(self.page_size).min(items.len());
        let page = items.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < items.len()).then(|| end.to_string());

        Ok(ResourcePage {
            items: page,
            next_page_token,
        })
    }

    async fn create_resource(
        &self,
        region: &str,
        spec: &CreateResourceSpec,
    ) -> ProviderResult<String> {
        self.begin_mutation().await?;

        let mut state = self.state.lock();
        state.next_id += 1;
        let prefix = match spec.resource_type {
            ResourceType::Disk => "d",
            ResourceType::Instance => "i",
            ResourceType::Vpc => "vpc",
            ResourceType::SecurityGroup => "sg",
        };
        let resource_id = format!("{prefix}-mem{:06}", state.next_id);

        let mut item = ResourceItem::new(&resource_id).with_status("available");
        item.name = spec.name.clone();
        if let Some(size) = spec.size_gb {
            set_attribute(&mut item, "size_gb", json!(size));
        }
        state
            .inventory
            .entry((spec.resource_type, region.to_string()))
            .or_default()
            .push(item);

        tracing::debug!(resource_id = %resource_id, region = %region, "Memory gateway created resource");
        Ok(resource_id)
    }

    async fn attach(&self, resource_id: &str, target_id: &str) -> ProviderResult<()> {
        self.begin_mutation().await?;
        self.with_disk(resource_id, |disk| {
            match attribute(disk, "instance_id").and_then(|v| v.as_str()) {
                Some(current) if current == target_id => Ok(()),
                Some(current) => Err(ProviderError::new(
                    "IncorrectDiskStatus",
                    format!("disk {resource_id} is attached to {current}"),
                )),
                None => {
                    set_attribute(disk, "instance_id", json!(target_id));
                    disk.status = Some("in_use".into());
                    Ok(())
                }
            }
        })
    }

    async fn detach(&self, resource_id: &str, target_id: &str) -> ProviderResult<()> {
        self.begin_mutation().await?;
        self.with_disk(resource_id, |disk| {
            match attribute(disk, "instance_id").and_then(|v| v.as_str()) {
                None => Ok(()),
                Some(current) if current != target_id => Err(ProviderError::new(
                    "IncorrectInstanceStatus",
                    format!("disk {resource_id} is not attached to {target_id}"),
                )),
                Some(_) => {
                    if let Some(map) = disk.attributes.as_object_mut() {
                        map.remove("instance_id");
                    }
                    disk.status = Some("available".into());
                    Ok(())
                }
            }
        })
    }

    async fn resize(&self, resource_id: &str, new_size_gb: u32) -> ProviderResult<()> {
        self.begin_mutation().await?;
        self.with_disk(resource_id, |disk| {
            let current = attribute(disk, "size_gb")
                .and_then(|v| v.as_u64())
                .unwrap_or_default();
            if u64::from(new_size_gb) < current {
                return Err(ProviderError::new(
                    "InvalidDiskSize.ValueNotSupported",
                    format!("disk {resource_id} cannot shrink from {current}GB to {new_size_gb}GB"),
                ));
            }
            set_attribute(disk, "size_gb", json!(new_size_gb));
            Ok(())
        })
    }

    async fn delete(&self, resource_id: &str) -> ProviderResult<()> {
        self.begin_mutation().await?;
        let mut state = self.state.lock();
        for ((rt, _), items) in state.inventory.iter_mut() {
            if *rt != ResourceType::Disk {
                continue;
            }
            if let Some(disk) = items.iter().find(|item| item.resource_id == resource_id)
                && disk.status.as_deref() == Some("in_use")
            {
                return Err(ProviderError::new(
                    "IncorrectDiskStatus",
                    format!("disk {resource_id} is still attached"),
                ));
            }
            items.retain(|item| item.resource_id != resource_id);
        }
        // Deleting a disk that is already gone succeeds
        Ok(())
    }
}
