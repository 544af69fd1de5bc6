//! Sync Orchestrator
//!
//! A sync unit is one (account, resource type, region) slot. Running a unit:
//!
//! 1. read the status row and skip on a live lock
//! 2. claim the slot with a conditional upsert (`running` + claim token)
//! 3. page through the provider listing
//! 4. publish `success` + inventory in one transaction, or `failed` + message
//!
//! Claiming always happens before the first provider call. Nothing is shared
//! in memory between orchestrator instances; two processes pointed at the
//! same database exclude each other through the status row alone.

use futures::stream::{self, StreamExt};
use shared::models::{
    CloudAccount, CloudAccountSyncStatus, CloudResource, ResourceItem, ResourceOperation,
    ResourceType, SyncKey, SyncStatusUpdate,
};
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::Config;
use crate::db::repository::sync_status::Claim;
use crate::db::repository::{
    MAX_NAME_LEN, RepoError, RepoResult, cloud_account, inventory, operation, sync_status,
};
use crate::gateway::GatewayRegistry;
use crate::utils::{AppError, AppResult, with_deadline};

/// Tuning for sync units and sweeps
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Resource types covered by a sweep
    pub resource_types: Vec<ResourceType>,
    /// Units running at once within one sweep
    pub parallelism: usize,
    /// Age after which a `running` row is considered abandoned
    pub lock_timeout: Duration,
    pub provider_timeout: Duration,
    pub storage_timeout: Duration,
    /// Upper bound on listing pages per unit
    pub max_pages: usize,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            resource_types: vec![ResourceType::Disk, ResourceType::Instance],
            parallelism: 8,
            lock_timeout: Duration::from_secs(30 * 60),
            provider_timeout: Duration::from_secs(30),
            storage_timeout: Duration::from_secs(5),
            max_pages: 1000,
        }
    }
}

impl From<&Config> for SyncSettings {
    fn from(config: &Config) -> Self {
        Self {
            resource_types: config.sync_resource_types.clone(),
            parallelism: config.sync_parallelism.max(1),
            lock_timeout: config.lock_timeout(),
            provider_timeout: config.provider_timeout(),
            storage_timeout: config.storage_timeout(),
            max_pages: config.sync_max_pages.max(1),
        }
    }
}

impl SyncSettings {
    fn lock_timeout_ms(&self) -> i64 {
        i64::try_from(self.lock_timeout.as_millis()).unwrap_or(i64::MAX)
    }
}

/// Why a unit did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds a live lock on the slot
    LockHeld,
    /// The slot was reclaimed as stale before this run could publish
    ClaimLost,
    /// The account was deleted or disabled
    AccountGone,
    Cancelled,
}

/// Outcome of one sync unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotResult {
    Synced { item_count: usize },
    Skipped(SkipReason),
    /// Recorded as `failed` on the status row
    Failed { error: String },
}

/// Totals for one sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub accounts: usize,
    pub synced: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Items written by the synced units
    pub items: usize,
}

impl SweepReport {
    fn record(&mut self, result: &SlotResult) {
        match result {
            SlotResult::Synced { item_count } => {
                self.synced += 1;
                self.items += item_count;
            }
            SlotResult::Skipped(_) => self.skipped += 1,
            SlotResult::Failed { .. } => self.failed += 1,
        }
    }
}

/// Acknowledgement returned by [`SyncOrchestrator::start_sync`]
#[derive(Debug)]
pub struct SyncTicket {
    pub key: SyncKey,
    /// The row as written by the claim
    pub status: CloudAccountSyncStatus,
    handle: JoinHandle<SlotResult>,
}

impl SyncTicket {
    /// Wait for the background run to finish
    pub async fn wait(self) -> AppResult<SlotResult> {
        self.handle
            .await
            .map_err(|e| AppError::internal(format!("sync task for {} failed: {e}", self.key)))
    }
}

#[derive(Clone)]
pub struct SyncOrchestrator {
    pool: SqlitePool,
    gateways: Arc<GatewayRegistry>,
    settings: Arc<SyncSettings>,
    shutdown: CancellationToken,
}

impl SyncOrchestrator {
    pub fn new(pool: SqlitePool, gateways: GatewayRegistry, settings: SyncSettings) -> Self {
        Self {
            pool,
            gateways: Arc::new(gateways),
            settings: Arc::new(settings),
            shutdown: CancellationToken::new(),
        }
    }

    /// Background runs started by `start_sync` stop when `token` is cancelled
    pub fn with_shutdown(mut self, token: CancellationToken) -> Self {
        self.shutdown = token;
        self
    }

    pub fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    // ========== Entry points ==========

    /// Claim the slot and run the sync in the background.
    ///
    /// Returns as soon as the claim is written. A live lock held by someone
    /// else is reported as `Conflict`; the call never waits for the sync.
    pub async fn start_sync(
        &self,
        account_id: i64,
        resource_type: ResourceType,
        region: &str,
    ) -> AppResult<SyncTicket> {
        let region = validate_region(region)?;
        let key = SyncKey::new(account_id, resource_type, region);
        let cancel = self.shutdown.child_token();

        let account = self
            .storage(&cancel, "load account", cloud_account::get(&self.pool, account_id))
            .await?;
        if !account.is_enabled {
            return Err(AppError::validation(format!(
                "Cloud account {account_id} is disabled"
            )));
        }
        if !account.regions.iter().any(|r| r == region) {
            return Err(AppError::validation(format!(
                "Region {region} is not configured for cloud account {account_id}"
            )));
        }

        let claim_token = uuid::Uuid::new_v4().to_string();
        let status = match self.claim(&key, &claim_token, &cancel).await? {
            Claim::Acquired(status) => status,
            Claim::Held(existing) => {
                let since = chrono::DateTime::from_timestamp_millis(existing.last_sync_time)
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| existing.last_sync_time.to_string());
                return Err(AppError::conflict(format!(
                    "Sync for {key} is already running since {since}"
                )));
            }
        };

        tracing::info!(key = %key, "Sync started");
        let this = self.clone();
        let run_key = key.clone();
        let handle = tokio::spawn(async move {
            this.run_claimed(&account, &run_key, &claim_token, &cancel).await
        });

        Ok(SyncTicket {
            key,
            status,
            handle,
        })
    }

    /// Claim and run one unit inline. Every failure is recorded and
    /// reported in the result, never raised.
    pub async fn sync_slot(
        &self,
        account: &CloudAccount,
        resource_type: ResourceType,
        region: &str,
        cancel: &CancellationToken,
    ) -> SlotResult {
        let key = SyncKey::new(account.id, resource_type, region);
        if cancel.is_cancelled() {
            return SlotResult::Skipped(SkipReason::Cancelled);
        }

        let claim_token = uuid::Uuid::new_v4().to_string();
        match self.claim(&key, &claim_token, cancel).await {
            Ok(Claim::Acquired(_)) => self.run_claimed(account, &key, &claim_token, cancel).await,
            Ok(Claim::Held(existing)) => {
                tracing::debug!(key = %key, since = existing.last_sync_time, "Slot locked, skipping");
                SlotResult::Skipped(SkipReason::LockHeld)
            }
            Err(AppError::NotFound(_)) => SlotResult::Skipped(SkipReason::AccountGone),
            Err(AppError::Cancelled(_)) => SlotResult::Skipped(SkipReason::Cancelled),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to claim sync slot");
                SlotResult::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    /// One pass over every enabled account × configured resource type × region.
    ///
    /// Units run concurrently up to `parallelism`; a failing unit never
    /// aborts the others.
    pub async fn run_sweep(&self, cancel: &CancellationToken) -> AppResult<SweepReport> {
        let accounts = self
            .storage(cancel, "list enabled accounts", cloud_account::find_enabled(&self.pool))
            .await?;
        let account_count = accounts.len();

        let mut units: Vec<(Arc<CloudAccount>, ResourceType, String)> = Vec::new();
        for account in accounts.into_iter().map(Arc::new) {
            for rt in &self.settings.resource_types {
                for region in &account.regions {
                    units.push((Arc::clone(&account), *rt, region.clone()));
                }
            }
        }

        let mut report = SweepReport {
            accounts: account_count,
            ..Default::default()
        };
        tracing::info!(accounts = report.accounts, units = units.len(), "Sync sweep started");

        let results: Vec<SlotResult> = stream::iter(units)
            .map(|(account, rt, region)| async move {
                self.sync_slot(&account, rt, &region, cancel).await
            })
            .buffer_unordered(self.settings.parallelism.max(1))
            .collect()
            .await;
        for result in &results {
            report.record(result);
        }

        tracing::info!(
            synced = report.synced,
            skipped = report.skipped,
            failed = report.failed,
            items = report.items,
            "Sync sweep finished"
        );
        Ok(report)
    }

    /// Status of one slot; `None` when it has never been synced
    pub async fn get_sync_status(
        &self,
        account_id: i64,
        resource_type: ResourceType,
        region: &str,
    ) -> AppResult<Option<CloudAccountSyncStatus>> {
        let key = SyncKey::new(account_id, resource_type, region.trim());
        Ok(sync_status::get(&self.pool, &key).await?)
    }

    pub async fn list_sync_status(&self, account_id: i64) -> AppResult<Vec<CloudAccountSyncStatus>> {
        Ok(sync_status::list(&self.pool, account_id).await?)
    }

    pub async fn list_inventory(&self, key: &SyncKey) -> AppResult<Vec<CloudResource>> {
        Ok(inventory::list(&self.pool, key).await?)
    }

    /// Operation history of a resource, newest first
    pub async fn list_operations(&self, resource_id: &str) -> AppResult<Vec<ResourceOperation>> {
        Ok(operation::list_by_resource(&self.pool, resource_id.trim()).await?)
    }

    // ========== Unit internals ==========

    /// Fast-path read, then the authoritative conditional write
    async fn claim(
        &self,
        key: &SyncKey,
        claim_token: &str,
        cancel: &CancellationToken,
    ) -> AppResult<Claim> {
        let timeout_ms = self.settings.lock_timeout_ms();

        let current = self
            .storage(cancel, "read sync status", sync_status::get(&self.pool, key))
            .await?;
        if let Some(existing) = current
            && existing.is_live_lock(shared::util::now_millis(), timeout_ms)
        {
            return Ok(Claim::Held(existing));
        }

        let now = shared::util::now_millis();
        let claim = self
            .storage(
                cancel,
                "claim sync slot",
                sync_status::try_claim(&self.pool, key, claim_token, now, timeout_ms),
            )
            .await?;
        if let Claim::Acquired(status) = &claim {
            tracing::debug!(key = %key, status_id = status.id, "Sync slot claimed");
        }
        Ok(claim)
    }

    /// Everything after a successful claim
    async fn run_claimed(
        &self,
        account: &CloudAccount,
        key: &SyncKey,
        claim_token: &str,
        cancel: &CancellationToken,
    ) -> SlotResult {
        let started = shared::util::now_millis();
        let items = match self.collect(account, key, cancel).await {
            Ok(items) => items,
            Err(e) => return self.record_failure(key, claim_token, &e).await,
        };

        let item_count = items.len();
        match self.publish(key, claim_token, &items, cancel).await {
            Ok(true) => {
                tracing::info!(
                    key = %key,
                    items = item_count,
                    duration_secs = shared::util::elapsed_secs(started, shared::util::now_millis()),
                    "Sync succeeded"
                );
                SlotResult::Synced { item_count }
            }
            Ok(false) => {
                tracing::warn!(key = %key, "Sync claim lost before publishing, result discarded");
                SlotResult::Skipped(SkipReason::ClaimLost)
            }
            Err(e) => self.record_failure(key, claim_token, &e).await,
        }
    }

    /// Page through the provider listing
    async fn collect(
        &self,
        account: &CloudAccount,
        key: &SyncKey,
        cancel: &CancellationToken,
    ) -> AppResult<Vec<ResourceItem>> {
        let gateway = self.gateways.gateway_for(account)?;

        let mut items = Vec::new();
        let mut page_token: Option<String> = None;
        for page_no in 1..=self.settings.max_pages {
            let page = with_deadline(
                cancel,
                self.settings.provider_timeout,
                "list_resources",
                async {
                    gateway
                        .list_resources(key.resource_type, &key.region, page_token.as_deref())
                        .await
                        .map_err(AppError::from)
                },
            )
            .await?;

            tracing::trace!(key = %key, page = page_no, items = page.items.len(), "Fetched page");
            items.extend(page.items);
            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => {
                    let mut seen = HashSet::new();
                    items.retain(|item: &ResourceItem| seen.insert(item.resource_id.clone()));
                    return Ok(items);
                }
            }
        }

        Err(AppError::internal(format!(
            "{key}: listing did not finish within {} pages",
            self.settings.max_pages
        )))
    }

    /// Write `success` and the inventory snapshot atomically.
    /// `Ok(false)` means the claim token no longer owns the row.
    async fn publish(
        &self,
        key: &SyncKey,
        claim_token: &str,
        items: &[ResourceItem],
        cancel: &CancellationToken,
    ) -> AppResult<bool> {
        let now = shared::util::now_millis();
        let update = SyncStatusUpdate::success(now, items.len() as i64);

        self.storage(cancel, "publish sync result", async {
            let mut tx = self.pool.begin().await?;
            if !sync_status::finish(&mut *tx, key, claim_token, &update).await? {
                // dropping tx rolls back
                return Ok(false);
            }
            inventory::reconcile(&mut *tx, key, items, now).await?;
            tx.commit().await?;
            Ok::<bool, RepoError>(true)
        })
        .await
    }

    /// Best effort: the write is attempted even when `cancel` already fired
    async fn record_failure(&self, key: &SyncKey, claim_token: &str, error: &AppError) -> SlotResult {
        let message = error.to_string();
        let update = SyncStatusUpdate::failed(shared::util::now_millis(), &message);

        let written = tokio::time::timeout(
            self.settings.storage_timeout,
            sync_status::finish(&self.pool, key, claim_token, &update),
        )
        .await;
        match written {
            Ok(Ok(true)) => {
                tracing::warn!(key = %key, error = %message, "Sync failed");
            }
            Ok(Ok(false)) => {
                tracing::warn!(key = %key, error = %message, "Sync failed after its claim was lost");
            }
            Ok(Err(e)) => {
                tracing::error!(key = %key, error = %message, write_error = %e, "Sync failed and the failure could not be recorded");
            }
            Err(_) => {
                tracing::error!(key = %key, error = %message, "Sync failed and recording the failure timed out");
            }
        }

        match error {
            AppError::Cancelled(_) => SlotResult::Skipped(SkipReason::Cancelled),
            _ => SlotResult::Failed { error: message },
        }
    }

    /// Storage call under the storage deadline
    async fn storage<T>(
        &self,
        cancel: &CancellationToken,
        what: &str,
        fut: impl Future<Output = RepoResult<T>>,
    ) -> AppResult<T> {
        with_deadline(cancel, self.settings.storage_timeout, what, async {
            fut.await.map_err(AppError::from)
        })
        .await
    }
}

fn validate_region(region: &str) -> AppResult<&str> {
    let region = region.trim();
    if region.is_empty() {
        return Err(AppError::validation("region must not be empty"));
    }
    if region.len() > MAX_NAME_LEN {
        return Err(AppError::validation(format!(
            "region is too long ({} chars, max {MAX_NAME_LEN})",
            region.len()
        )));
    }
    Ok(region)
}
