//! Inventory Repository
//!
//! Snapshot of provider resources per sync slot. A successful sync replaces
//! the slot's rows: listed items are upserted, anything not listed is pruned.

use super::RepoResult;
use serde_json::Value;
use shared::models::{CloudResource, ResourceItem, SyncKey};
use sqlx::{Executor, Sqlite, SqliteConnection, SqlitePool};

const COLUMNS: &str = "id, account_id, resource_type, region, resource_id, name, status, attributes, last_sync_time, created_at, updated_at";

/// Row counts written by [`reconcile`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounts {
    pub upserted: u64,
    pub removed: u64,
}

/// Replace the snapshot for `key` with `items`, stamped at `now` (or just
/// after the previous run if the clock has not moved past it).
///
/// Runs on a caller-provided connection so it can share a transaction with
/// the status write that publishes the result.
pub async fn reconcile(
    conn: &mut SqliteConnection,
    key: &SyncKey,
    items: &[ResourceItem],
    now: i64,
) -> RepoResult<ReconcileCounts> {
    let mut counts = ReconcileCounts::default();

    // Stamp strictly after the previous run so that the prune below can
    // tell this run's rows apart even within the same millisecond
    let previous: Option<i64> = sqlx::query_scalar(
        "SELECT MAX(last_sync_time) FROM cloud_resource WHERE account_id = ? AND resource_type = ? AND region = ?",
    )
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .fetch_one(&mut *conn)
    .await?;
    let stamp = previous.map_or(now, |prev| now.max(prev + 1));

    for item in items {
        let attributes = match &item.attributes {
            Value::Null => "{}".to_string(),
            other => serde_json::to_string(other)?,
        };
        let rows = sqlx::query(
            "INSERT INTO cloud_resource (account_id, resource_type, region, resource_id, name, status, attributes, last_sync_time, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8) \
             ON CONFLICT (account_id, resource_type, region, resource_id) DO UPDATE SET \
               name = excluded.name, status = excluded.status, attributes = excluded.attributes, \
               last_sync_time = excluded.last_sync_time, updated_at = excluded.updated_at",
        )
        .bind(key.account_id)
        .bind(key.resource_type.as_str())
        .bind(&key.region)
        .bind(&item.resource_id)
        .bind(&item.name)
        .bind(&item.status)
        .bind(attributes)
        .bind(stamp)
        .execute(&mut *conn)
        .await?;
        counts.upserted += rows.rows_affected();
    }

    // Every row touched above carries exactly `stamp`
    let removed = sqlx::query(
        "DELETE FROM cloud_resource WHERE account_id = ? AND resource_type = ? AND region = ? AND last_sync_time <> ?",
    )
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .bind(stamp)
    .execute(&mut *conn)
    .await?;
    counts.removed = removed.rows_affected();

    tracing::debug!(
        key = %key,
        upserted = counts.upserted,
        removed = counts.removed,
        "Inventory reconciled"
    );
    Ok(counts)
}

pub async fn list(pool: &SqlitePool, key: &SyncKey) -> RepoResult<Vec<CloudResource>> {
    let resources = sqlx::query_as::<_, CloudResource>(&format!(
        "SELECT {COLUMNS} FROM cloud_resource WHERE account_id = ? AND resource_type = ? AND region = ? ORDER BY resource_id"
    ))
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .fetch_all(pool)
    .await?;
    Ok(resources)
}

pub async fn count_for_account(pool: &SqlitePool, account_id: i64) -> RepoResult<i64> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cloud_resource WHERE account_id = ?")
        .bind(account_id)
        .fetch_one(pool)
        .await?;
    Ok(count)
}

/// Remove every snapshot row of an account. Only called from account deletion.
pub async fn delete_all_for_account<'e, E>(executor: E, account_id: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("DELETE FROM cloud_resource WHERE account_id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(rows.rows_affected())
}
