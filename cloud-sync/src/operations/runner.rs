//! Disk operations journaled in the operation ledger
//!
//! Each call writes `pending`, flips to `running`, performs the provider
//! call under a deadline and records the outcome. A provider failure,
//! timeout or cancellation is not an error of the call: it comes back as a
//! `failed` record carrying the message. Storage failures and bad input are
//! errors.

use serde_json::json;
use shared::models::{
    CloudAccount, OperationKind, OperationOutcome, OperationStart, ResourceOperation,
    ResourceType,
};
use sqlx::SqlitePool;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::db::repository::{RepoResult, cloud_account, operation};
use crate::gateway::{CreateResourceSpec, GatewayRegistry, ProviderGateway};
use crate::utils::{AppError, AppResult, with_deadline};

/// Smallest disk the providers accept, in GB
pub const MIN_DISK_SIZE_GB: u32 = 20;

/// Bound on the fallback write that closes a record after a journaling error
const JOURNAL_TIMEOUT: Duration = Duration::from_secs(5);

/// Parameters for a new disk
#[derive(Debug, Clone, Default)]
pub struct DiskCreate {
    pub name: Option<String>,
    pub size_gb: u32,
    /// Vendor extras passed through to the gateway and journaled as-is
    pub parameters: serde_json::Value,
}

#[derive(Clone)]
pub struct OperationRunner {
    pool: SqlitePool,
    gateways: Arc<GatewayRegistry>,
    provider_timeout: Duration,
    cancel: CancellationToken,
}

impl OperationRunner {
    pub fn new(pool: SqlitePool, gateways: Arc<GatewayRegistry>, provider_timeout: Duration) -> Self {
        Self {
            pool,
            gateways,
            provider_timeout,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub async fn create_disk(
        &self,
        account_id: i64,
        region: &str,
        disk: DiskCreate,
        operator: &str,
    ) -> AppResult<ResourceOperation> {
        check_disk_size(disk.size_gb)?;
        let region = region.trim();
        if region.is_empty() {
            return Err(AppError::validation("region must not be empty"));
        }
        let (account, gateway) = self.gateway(account_id).await?;

        let spec = CreateResourceSpec {
            resource_type: ResourceType::Disk,
            name: disk.name.clone(),
            size_gb: Some(disk.size_gb),
            parameters: disk.parameters.clone(),
        };
        let start = OperationStart {
            region: Some(region.to_string()),
            ..journal_entry(
                &account,
                OperationKind::Create,
                "",
                json!({ "name": disk.name, "size_gb": disk.size_gb, "extra": disk.parameters }),
                operator,
            )
        };

        let region = region.to_string();
        self.run(start, "create_resource", async move {
            let id = gateway.create_resource(&region, &spec).await?;
            Ok(Some(id))
        })
        .await
    }

    pub async fn attach_disk(
        &self,
        account_id: i64,
        disk_id: &str,
        instance_id: &str,
        operator: &str,
    ) -> AppResult<ResourceOperation> {
        let instance_id = required(instance_id, "instance_id")?;
        let (account, gateway) = self.gateway(account_id).await?;
        let start = OperationStart {
            instance_id: Some(instance_id.to_string()),
            ..journal_entry(
                &account,
                OperationKind::Attach,
                disk_id,
                json!({ "instance_id": instance_id }),
                operator,
            )
        };

        let (disk, instance) = (disk_id.trim().to_string(), instance_id.to_string());
        self.run(start, "attach", async move {
            gateway.attach(&disk, &instance).await?;
            Ok(None)
        })
        .await
    }

    pub async fn detach_disk(
        &self,
        account_id: i64,
        disk_id: &str,
        instance_id: &str,
        operator: &str,
    ) -> AppResult<ResourceOperation> {
        let instance_id = required(instance_id, "instance_id")?;
        let (account, gateway) = self.gateway(account_id).await?;
        let start = OperationStart {
            instance_id: Some(instance_id.to_string()),
            ..journal_entry(
                &account,
                OperationKind::Detach,
                disk_id,
                json!({ "instance_id": instance_id }),
                operator,
            )
        };

        let (disk, instance) = (disk_id.trim().to_string(), instance_id.to_string());
        self.run(start, "detach", async move {
            gateway.detach(&disk, &instance).await?;
            Ok(None)
        })
        .await
    }

    pub async fn resize_disk(
        &self,
        account_id: i64,
        disk_id: &str,
        new_size_gb: u32,
        operator: &str,
    ) -> AppResult<ResourceOperation> {
        check_disk_size(new_size_gb)?;
        let (account, gateway) = self.gateway(account_id).await?;
        let start = journal_entry(
            &account,
            OperationKind::Resize,
            disk_id,
            json!({ "new_size_gb": new_size_gb }),
            operator,
        );

        let disk = disk_id.trim().to_string();
        self.run(start, "resize", async move {
            gateway.resize(&disk, new_size_gb).await?;
            Ok(None)
        })
        .await
    }

    pub async fn delete_disk(
        &self,
        account_id: i64,
        disk_id: &str,
        operator: &str,
    ) -> AppResult<ResourceOperation> {
        let (account, gateway) = self.gateway(account_id).await?;
        let start = journal_entry(
            &account,
            OperationKind::Delete,
            disk_id,
            serde_json::Value::Null,
            operator,
        );

        let disk = disk_id.trim().to_string();
        self.run(start, "delete", async move {
            gateway.delete(&disk).await?;
            Ok(None)
        })
        .await
    }

    async fn gateway(&self, account_id: i64) -> AppResult<(CloudAccount, Arc<dyn ProviderGateway>)> {
        let account = cloud_account::get(&self.pool, account_id).await?;
        let gateway = self.gateways.gateway_for(&account)?;
        Ok((account, gateway))
    }

    /// start → running → provider call → success | failed.
    /// `call` yields the provider-assigned id for creates.
    async fn run(
        &self,
        start: OperationStart,
        what: &str,
        call: impl Future<Output = Result<Option<String>, crate::gateway::ProviderError>>,
    ) -> AppResult<ResourceOperation> {
        let record = operation::start(&self.pool, start).await?;
        let id = record.id;
        operation::mark_running(&self.pool, id).await?;

        let outcome = with_deadline(&self.cancel, self.provider_timeout, what, async {
            call.await.map_err(AppError::from)
        })
        .await;

        match outcome {
            Ok(assigned) => match self.journal_success(id, assigned.as_deref()).await {
                Ok(record) => Ok(record),
                Err(e) => {
                    let message = match &assigned {
                        Some(resource_id) => format!(
                            "provider succeeded (resource {resource_id}), journaling failed: {e}"
                        ),
                        None => format!("provider succeeded, journaling failed: {e}"),
                    };
                    self.close_failed(id, message).await;
                    Err(e.into())
                }
            },
            Err(e) => {
                tracing::warn!(operation_id = id, call = what, error = %e, "Disk operation failed");
                Ok(operation::complete(&self.pool, id, OperationOutcome::Failed, Some(e.to_string()))
                    .await?)
            }
        }
    }

    async fn journal_success(
        &self,
        id: i64,
        resource_id: Option<&str>,
    ) -> RepoResult<ResourceOperation> {
        if let Some(resource_id) = resource_id {
            operation::bind_resource(&self.pool, id, resource_id).await?;
        }
        operation::complete(&self.pool, id, OperationOutcome::Success, None).await
    }

    /// Best effort: the record must not stay `running` after the provider acted
    async fn close_failed(&self, id: i64, message: String) {
        let written = tokio::time::timeout(
            JOURNAL_TIMEOUT,
            operation::complete(&self.pool, id, OperationOutcome::Failed, Some(message.clone())),
        )
        .await;
        match written {
            Ok(Ok(_)) => {
                tracing::error!(operation_id = id, error = %message, "Disk operation journaling failed");
            }
            Ok(Err(e)) => {
                tracing::error!(operation_id = id, error = %message, write_error = %e, "Disk operation left running: closing the record failed");
            }
            Err(_) => {
                tracing::error!(operation_id = id, error = %message, "Disk operation left running: closing the record timed out");
            }
        }
    }
}

fn journal_entry(
    account: &CloudAccount,
    kind: OperationKind,
    disk_id: &str,
    parameters: serde_json::Value,
    operator: &str,
) -> OperationStart {
    OperationStart {
        account_id: Some(account.id),
        ..OperationStart::disk(kind, disk_id.trim(), parameters, operator)
    }
}

fn check_disk_size(size_gb: u32) -> AppResult<()> {
    if size_gb < MIN_DISK_SIZE_GB {
        return Err(AppError::validation(format!(
            "disk size must be at least {MIN_DISK_SIZE_GB}GB, got {size_gb}GB"
        )));
    }
    Ok(())
}

fn required<'a>(value: &'a str, field: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::validation(format!("{field} must not be empty")));
    }
    Ok(value)
}
