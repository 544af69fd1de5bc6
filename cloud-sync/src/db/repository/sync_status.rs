//! Sync Status Repository
//!
//! `cloud_account_sync_status` holds exactly one row per (account, resource
//! type, region) thanks to its unique key. Every write here is a single
//! statement, either an upsert or a conditional update, so racing writers in
//! different processes never see a read-then-write gap.

use super::{RepoError, RepoResult};
use shared::models::{CloudAccountSyncStatus, SyncKey, SyncPhase, SyncStatusUpdate};
use sqlx::{Executor, Sqlite, SqlitePool};

const COLUMNS: &str = "id, account_id, resource_type, region, phase, last_sync_time, last_error, item_count, claim_token, created_at, updated_at";

/// Result of a conditional claim on a sync slot
#[derive(Debug, Clone)]
pub enum Claim {
    /// Row written with `phase = running` and our claim token
    Acquired(CloudAccountSyncStatus),
    /// A live lock is held by someone else; row left untouched
    Held(CloudAccountSyncStatus),
}

/// "No status yet" is `Ok(None)`, not an error
pub async fn get(pool: &SqlitePool, key: &SyncKey) -> RepoResult<Option<CloudAccountSyncStatus>> {
    let status = sqlx::query_as::<_, CloudAccountSyncStatus>(&format!(
        "SELECT {COLUMNS} FROM cloud_account_sync_status WHERE account_id = ? AND resource_type = ? AND region = ?"
    ))
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .fetch_optional(pool)
    .await?;
    Ok(status)
}

/// All rows of an account, most recently synced first
pub async fn list(pool: &SqlitePool, account_id: i64) -> RepoResult<Vec<CloudAccountSyncStatus>> {
    let statuses = sqlx::query_as::<_, CloudAccountSyncStatus>(&format!(
        "SELECT {COLUMNS} FROM cloud_account_sync_status WHERE account_id = ? ORDER BY last_sync_time DESC, id DESC"
    ))
    .bind(account_id)
    .fetch_all(pool)
    .await?;
    Ok(statuses)
}

/// Unconditional acquire-or-update: insert the row for `key` or overwrite
/// its phase, time, error and count. Clears any claim token.
///
/// The account must exist and be live, otherwise `NotFound`.
pub async fn upsert(
    pool: &SqlitePool,
    key: &SyncKey,
    update: &SyncStatusUpdate,
) -> RepoResult<CloudAccountSyncStatus> {
    let now = shared::util::now_millis();
    let status = sqlx::query_as::<_, CloudAccountSyncStatus>(&format!(
        "INSERT INTO cloud_account_sync_status (account_id, resource_type, region, phase, last_sync_time, last_error, item_count, claim_token, created_at, updated_at) \
         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8, ?8 \
         WHERE EXISTS (SELECT 1 FROM cloud_account WHERE id = ?1 AND deleted_at IS NULL) \
         ON CONFLICT (account_id, resource_type, region) DO UPDATE SET \
           phase = excluded.phase, last_sync_time = excluded.last_sync_time, last_error = excluded.last_error, \
           item_count = excluded.item_count, claim_token = NULL, updated_at = excluded.updated_at \
         RETURNING {COLUMNS}"
    ))
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .bind(update.phase.as_str())
    .bind(update.last_sync_time)
    .bind(&update.last_error)
    .bind(update.item_count)
    .bind(now)
    .fetch_optional(pool)
    .await?;

    let status = status.ok_or_else(|| {
        RepoError::NotFound(format!("Cloud account {} not found", key.account_id))
    })?;
    tracing::debug!(key = %key, phase = %status.phase, "Sync status upserted");
    Ok(status)
}

/// Claim the slot for `key`: write `phase = running` with `claim_token`
/// unless a live lock exists. A running row whose `last_sync_time` is at or
/// before `now - lock_timeout_ms` counts as abandoned and is taken over.
///
/// Returns `NotFound` when the account does not exist (or was deleted).
pub async fn try_claim(
    pool: &SqlitePool,
    key: &SyncKey,
    claim_token: &str,
    now: i64,
    lock_timeout_ms: i64,
) -> RepoResult<Claim> {
    let stale_before = now - lock_timeout_ms;
    let claimed = sqlx::query_as::<_, CloudAccountSyncStatus>(&format!(
        "INSERT INTO cloud_account_sync_status (account_id, resource_type, region, phase, last_sync_time, last_error, item_count, claim_token, created_at, updated_at) \
         SELECT ?1, ?2, ?3, 'running', ?4, NULL, 0, ?5, ?4, ?4 \
         WHERE EXISTS (SELECT 1 FROM cloud_account WHERE id = ?1 AND deleted_at IS NULL) \
         ON CONFLICT (account_id, resource_type, region) DO UPDATE SET \
           phase = 'running', last_sync_time = excluded.last_sync_time, last_error = NULL, \
           claim_token = excluded.claim_token, updated_at = excluded.updated_at \
         WHERE cloud_account_sync_status.phase <> 'running' \
            OR cloud_account_sync_status.last_sync_time <= ?6 \
         RETURNING {COLUMNS}"
    ))
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .bind(now)
    .bind(claim_token)
    .bind(stale_before)
    .fetch_optional(pool)
    .await?;

    if let Some(status) = claimed {
        return Ok(Claim::Acquired(status));
    }

    // Nothing written: either the slot is held or the account is gone
    match get(pool, key).await? {
        Some(existing) => Ok(Claim::Held(existing)),
        None => Err(RepoError::NotFound(format!(
            "Cloud account {} not found",
            key.account_id
        ))),
    }
}

/// Write the outcome of a claimed run. Only succeeds while `claim_token`
/// still owns the row; returns `false` when the claim was lost (reclaimed
/// as stale, or the account was deleted meanwhile).
pub async fn finish<'e, E>(
    executor: E,
    key: &SyncKey,
    claim_token: &str,
    update: &SyncStatusUpdate,
) -> RepoResult<bool>
where
    E: Executor<'e, Database = Sqlite>,
{
    if update.phase == SyncPhase::Running {
        return Err(RepoError::Validation(
            "finish requires a terminal sync phase".into(),
        ));
    }

    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE cloud_account_sync_status SET phase = ?1, last_sync_time = ?2, last_error = ?3, item_count = ?4, claim_token = NULL, updated_at = ?5 \
         WHERE account_id = ?6 AND resource_type = ?7 AND region = ?8 AND claim_token = ?9 AND phase = 'running'",
    )
    .bind(update.phase.as_str())
    .bind(update.last_sync_time)
    .bind(&update.last_error)
    .bind(update.item_count)
    .bind(now)
    .bind(key.account_id)
    .bind(key.resource_type.as_str())
    .bind(&key.region)
    .bind(claim_token)
    .execute(executor)
    .await?;
    Ok(rows.rows_affected() == 1)
}

/// Remove every row of an account. Only called from account deletion.
pub async fn delete_all<'e, E>(executor: E, account_id: i64) -> RepoResult<u64>
where
    E: Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("DELETE FROM cloud_account_sync_status WHERE account_id = ?")
        .bind(account_id)
        .execute(executor)
        .await?;
    Ok(rows.rows_affected())
}
