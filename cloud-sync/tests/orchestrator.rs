//! Sync orchestrator against a real SQLite file and the in-memory gateway

mod common;

use cloud_sync::db::repository::{cloud_account, inventory, sync_status};
use cloud_sync::gateway::{GatewayRegistry, MemoryGateway, ProviderError};
use cloud_sync::sync::{SkipReason, SlotResult, SyncOrchestrator, SyncSettings};
use cloud_sync::AppError;
use common::{account_input, count_rows, create_account, setup, test_settings};
use shared::models::{CloudProvider, CloudAccountUpdate, ResourceType, SyncKey, SyncPhase, SyncStatusUpdate};
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const HZ: &str = "cn-hangzhou";

fn orchestrator(pool: &SqlitePool, gateway: &Arc<MemoryGateway>, settings: SyncSettings) -> SyncOrchestrator {
    let registry = GatewayRegistry::new().with(CloudProvider::Aliyun, gateway.factory());
    SyncOrchestrator::new(pool.clone(), registry, settings)
}

fn gateway() -> Arc<MemoryGateway> {
    Arc::new(MemoryGateway::new(CloudProvider::Aliyun))
}

#[tokio::test]
async fn test_start_sync_records_success_with_item_count() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = gateway();
    gw.seed_disks(HZ, 5);
    let orch = orchestrator(t.pool(), &gw, test_settings());

    assert!(orch.get_sync_status(account.id, ResourceType::Disk, HZ).await.unwrap().is_none());

    let ticket = orch.start_sync(account.id, ResourceType::Disk, HZ).await.unwrap();
    assert_eq!(ticket.status.phase, SyncPhase::Running);
    assert_eq!(ticket.wait().await.unwrap(), SlotResult::Synced { item_count: 5 });

    let status = orch
        .get_sync_status(account.id, ResourceType::Disk, HZ)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.phase, SyncPhase::Success);
    assert_eq!(status.item_count, 5);
    assert!(status.last_error.is_none());

    let key = SyncKey::new(account.id, ResourceType::Disk, HZ);
    let resources = orch.list_inventory(&key).await.unwrap();
    assert_eq!(resources.len(), 5);
    assert_eq!(resources[0].status.as_deref(), Some("available"));
    assert_eq!(gw.list_calls(), 1);
}

#[tokio::test]
async fn test_racing_start_sync_calls_gateway_once() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_latency(Duration::from_millis(300)));
    gw.seed_disks(HZ, 3);

    // Two independent orchestrators, as if in two processes
    let a = orchestrator(t.pool(), &gw, test_settings());
    let b = orchestrator(t.pool(), &gw, test_settings());

    let (ra, rb) = tokio::join!(
        a.start_sync(account.id, ResourceType::Disk, HZ),
        b.start_sync(account.id, ResourceType::Disk, HZ)
    );
    let (winner, loser) = match (ra, rb) {
        (Ok(ticket), Err(e)) | (Err(e), Ok(ticket)) => (ticket, e),
        (Ok(_), Ok(_)) => panic!("both workers claimed the slot"),
        (Err(a), Err(b)) => panic!("neither worker claimed the slot: {a} / {b}"),
    };
    assert!(matches!(loser, AppError::Conflict(_)));

    assert_eq!(winner.wait().await.unwrap(), SlotResult::Synced { item_count: 3 });
    assert_eq!(gw.list_calls(), 1);
}

#[tokio::test]
async fn test_racing_sync_slots_skip_on_live_lock() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_latency(Duration::from_millis(200)));
    gw.seed_disks(HZ, 2);

    let workers: Vec<SyncOrchestrator> = (0..6)
        .map(|_| orchestrator(t.pool(), &gw, test_settings()))
        .collect();
    let cancel = CancellationToken::new();
    let results = futures::future::join_all(
        workers
            .iter()
            .map(|w| w.sync_slot(&account, ResourceType::Disk, HZ, &cancel)),
    )
    .await;

    let synced = results
        .iter()
        .filter(|r| matches!(r, SlotResult::Synced { .. }))
        .count();
    let held = results
        .iter()
        .filter(|r| **r == SlotResult::Skipped(SkipReason::LockHeld))
        .count();
    assert_eq!(synced, 1);
    assert_eq!(held, 5);
    assert_eq!(gw.list_calls(), 1);
}

#[tokio::test]
async fn test_live_lock_blocks_and_stale_lock_is_reclaimed() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = gateway();
    gw.seed_disks(HZ, 1);
    let orch = orchestrator(t.pool(), &gw, test_settings());
    let key = SyncKey::new(account.id, ResourceType::Disk, HZ);

    let now = shared::util::now_millis();
    sync_status::upsert(t.pool(), &key, &SyncStatusUpdate::running(now))
        .await
        .unwrap();
    let err = orch.start_sync(account.id, ResourceType::Disk, HZ).await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(gw.list_calls(), 0);

    // A worker that died 31 minutes ago no longer holds the slot
    let abandoned = now - Duration::from_secs(31 * 60).as_millis() as i64;
    sync_status::upsert(t.pool(), &key, &SyncStatusUpdate::running(abandoned))
        .await
        .unwrap();
    let ticket = orch.start_sync(account.id, ResourceType::Disk, HZ).await.unwrap();
    assert_eq!(ticket.wait().await.unwrap(), SlotResult::Synced { item_count: 1 });
}

#[tokio::test]
async fn test_start_sync_rejects_bad_targets() {
    let t = setup().await;
    let gw = gateway();
    let orch = orchestrator(t.pool(), &gw, test_settings());

    let err = orch.start_sync(999, ResourceType::Disk, HZ).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let err = orch.start_sync(account.id, ResourceType::Disk, "  ").await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    // Only the account's configured regions are synced
    let err = orch
        .start_sync(account.id, ResourceType::Disk, "us-east-1")
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(count_rows(t.pool(), "cloud_account_sync_status").await, 0);

    cloud_account::update(
        t.pool(),
        account.id,
        CloudAccountUpdate {
            is_enabled: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    let err = orch.start_sync(account.id, ResourceType::Disk, HZ).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(count_rows(t.pool(), "cloud_account_sync_status").await, 0);
}

#[tokio::test]
async fn test_provider_failure_is_recorded() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = gateway();
    gw.fail_next_list(ProviderError::new("Throttling", "Request was denied due to flow control"));
    let orch = orchestrator(t.pool(), &gw, test_settings());

    let result = orch
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert!(matches!(result, SlotResult::Failed { ref error } if error.contains("Throttling")));

    let status = orch
        .get_sync_status(account.id, ResourceType::Disk, HZ)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.phase, SyncPhase::Failed);
    assert_eq!(
        status.last_error.as_deref(),
        Some("Provider error [Throttling]: Request was denied due to flow control")
    );

    // No retry within the run; the next run succeeds
    assert_eq!(gw.list_calls(), 1);
    let retry = orch
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert_eq!(retry, SlotResult::Synced { item_count: 0 });
}

#[tokio::test]
async fn test_unsupported_provider_is_recorded() {
    let t = setup().await;
    let mut input = account_input("aws-prod", &["us-east-1"]);
    input.provider = CloudProvider::Aws;
    let account = cloud_account::create(t.pool(), input).await.unwrap();
    let gw = gateway();
    let orch = orchestrator(t.pool(), &gw, test_settings());

    let result = orch
        .sync_slot(&account, ResourceType::Disk, "us-east-1", &CancellationToken::new())
        .await;
    assert!(matches!(result, SlotResult::Failed { ref error } if error.contains("UnsupportedProvider")));
    let status = orch
        .get_sync_status(account.id, ResourceType::Disk, "us-east-1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.phase, SyncPhase::Failed);
}

#[tokio::test]
async fn test_pagination_is_followed_and_bounded() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_page_size(2));
    gw.seed_disks(HZ, 5);

    let orch = orchestrator(t.pool(), &gw, test_settings());
    let result = orch
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert_eq!(result, SlotResult::Synced { item_count: 5 });
    assert_eq!(gw.list_calls(), 3);

    let bounded = orchestrator(
        t.pool(),
        &gw,
        SyncSettings {
            max_pages: 2,
            ..test_settings()
        },
    );
    let result = bounded
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert!(matches!(result, SlotResult::Failed { ref error } if error.contains("2 pages")));

    // The failed run leaves the previous inventory in place
    let key = SyncKey::new(account.id, ResourceType::Disk, HZ);
    assert_eq!(inventory::list(t.pool(), &key).await.unwrap().len(), 5);
}

#[tokio::test]
async fn test_inventory_prunes_vanished_resources() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = gateway();
    gw.seed_disks(HZ, 5);
    let orch = orchestrator(t.pool(), &gw, test_settings());
    let cancel = CancellationToken::new();

    orch.sync_slot(&account, ResourceType::Disk, HZ, &cancel).await;
    gw.seed_disks(HZ, 3);
    let result = orch.sync_slot(&account, ResourceType::Disk, HZ, &cancel).await;
    assert_eq!(result, SlotResult::Synced { item_count: 3 });

    let key = SyncKey::new(account.id, ResourceType::Disk, HZ);
    let ids: Vec<String> = inventory::list(t.pool(), &key)
        .await
        .unwrap()
        .into_iter()
        .map(|r| r.resource_id)
        .collect();
    assert_eq!(ids, vec!["d-cn-hangzhou-1", "d-cn-hangzhou-2", "d-cn-hangzhou-3"]);
}

#[tokio::test]
async fn test_provider_timeout_is_recorded() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_latency(Duration::from_millis(500)));
    let orch = orchestrator(
        t.pool(),
        &gw,
        SyncSettings {
            provider_timeout: Duration::from_millis(50),
            ..test_settings()
        },
    );

    let result = orch
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert!(matches!(result, SlotResult::Failed { ref error } if error.contains("Deadline exceeded")));
    let status = orch
        .get_sync_status(account.id, ResourceType::Disk, HZ)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(status.phase, SyncPhase::Failed);
    assert!(status.last_error.unwrap().contains("list_resources exceeded 50ms"));
}

#[tokio::test]
async fn test_cancel_after_claim_releases_slot() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_latency(Duration::from_secs(2)));
    let orch = orchestrator(t.pool(), &gw, test_settings());
    let cancel = CancellationToken::new();

    let run = {
        let orch = orch.clone();
        let cancel = cancel.clone();
        let account = account.clone();
        tokio::spawn(async move { orch.sync_slot(&account, ResourceType::Disk, HZ, &cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    cancel.cancel();

    assert_eq!(run.await.unwrap(), SlotResult::Skipped(SkipReason::Cancelled));
    let status = orch
        .get_sync_status(account.id, ResourceType::Disk, HZ)
        .await
        .unwrap()
        .unwrap();
    // Not left `running` until the staleness timeout
    assert_eq!(status.phase, SyncPhase::Failed);
    assert_eq!(status.last_error.as_deref(), Some("Cancelled: list_resources"));

    let already = orch.sync_slot(&account, ResourceType::Disk, HZ, &cancel).await;
    assert_eq!(already, SlotResult::Skipped(SkipReason::Cancelled));
}

#[tokio::test]
async fn test_delete_during_sync_discards_result() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = Arc::new(MemoryGateway::new(CloudProvider::Aliyun).with_latency(Duration::from_millis(300)));
    gw.seed_disks(HZ, 4);
    let orch = orchestrator(t.pool(), &gw, test_settings());

    let ticket = orch.start_sync(account.id, ResourceType::Disk, HZ).await.unwrap();
    cloud_account::delete(t.pool(), account.id).await.unwrap();

    assert_eq!(ticket.wait().await.unwrap(), SlotResult::Skipped(SkipReason::ClaimLost));
    assert_eq!(count_rows(t.pool(), "cloud_account_sync_status").await, 0);
    assert_eq!(count_rows(t.pool(), "cloud_resource").await, 0);

    // And a later unit for the deleted account cannot recreate the row
    let result = orch
        .sync_slot(&account, ResourceType::Disk, HZ, &CancellationToken::new())
        .await;
    assert_eq!(result, SlotResult::Skipped(SkipReason::AccountGone));
    assert_eq!(count_rows(t.pool(), "cloud_account_sync_status").await, 0);
}

#[tokio::test]
async fn test_sweep_isolates_failures() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ, "cn-beijing", "cn-shanghai"]).await;
    let disabled = create_account(t.pool(), "disabled", &[HZ]).await;
    cloud_account::update(
        t.pool(),
        disabled.id,
        CloudAccountUpdate {
            is_enabled: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let gw = gateway();
    gw.seed_disks(HZ, 5);
    gw.seed_disks("cn-beijing", 2);
    gw.fail_region("cn-beijing", ProviderError::new("ServiceUnavailable", "try later"));
    let orch = orchestrator(t.pool(), &gw, test_settings());

    // Another worker is busy with shanghai
    let busy = SyncKey::new(account.id, ResourceType::Disk, "cn-shanghai");
    sync_status::upsert(t.pool(), &busy, &SyncStatusUpdate::running(shared::util::now_millis()))
        .await
        .unwrap();

    let report = orch.run_sweep(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.accounts, 1);
    assert_eq!(report.synced, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.items, 5);

    let statuses = orch.list_sync_status(account.id).await.unwrap();
    assert_eq!(statuses.len(), 3);
    assert!(orch.list_sync_status(disabled.id).await.unwrap().is_empty());

    gw.clear_failures();
    sync_status::upsert(t.pool(), &busy, &SyncStatusUpdate::success(1, 0))
        .await
        .unwrap();
    let report = orch.run_sweep(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.synced, 3);
    assert_eq!(report.items, 7);
}

#[tokio::test]
async fn test_sweep_covers_configured_resource_types() {
    let t = setup().await;
    let account = create_account(t.pool(), "prod", &[HZ]).await;
    let gw = gateway();
    gw.seed_disks(HZ, 2);
    gw.seed(
        ResourceType::Instance,
        HZ,
        vec![shared::models::ResourceItem::new("i-001").with_status("running")],
    );
    let orch = orchestrator(
        t.pool(),
        &gw,
        SyncSettings {
            resource_types: vec![ResourceType::Disk, ResourceType::Instance],
            ..test_settings()
        },
    );

    let report = orch.run_sweep(&CancellationToken::new()).await.unwrap();
    assert_eq!(report.synced, 2);
    assert_eq!(report.items, 3);

    let instance = orch
        .get_sync_status(account.id, ResourceType::Instance, HZ)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(instance.item_count, 1);
}
