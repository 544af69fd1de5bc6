//! Resource Operation Repository (operation ledger)
//!
//! Status moves `pending → running → success | failed` and never leaves a
//! terminal status. Every transition is an `UPDATE … WHERE status = …`; when
//! it matches nothing the row is re-read to say why.

use super::{
    MAX_KEY_LEN, MAX_NAME_LEN, RepoError, RepoResult, validate_optional_text,
    validate_required_text,
};
use shared::models::{
    OperationKind, OperationOutcome, OperationStart, OperationStatus, ResourceOperation,
};
use sqlx::SqlitePool;

const COLUMNS: &str = "id, account_id, resource_type, resource_id, region, operation, status, instance_id, parameters, error_msg, start_time, end_time, duration, operator, created_at, updated_at";

/// Stored error messages are truncated to this many characters
const MAX_ERROR_LEN: usize = 2000;

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<ResourceOperation>> {
    let operation = sqlx::query_as::<_, ResourceOperation>(&format!(
        "SELECT {COLUMNS} FROM resource_operation WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(operation)
}

pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<ResourceOperation> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Operation {id} not found")))
}

/// Newest first
pub async fn list_by_resource(
    pool: &SqlitePool,
    resource_id: &str,
) -> RepoResult<Vec<ResourceOperation>> {
    let operations = sqlx::query_as::<_, ResourceOperation>(&format!(
        "SELECT {COLUMNS} FROM resource_operation WHERE resource_id = ? AND deleted_at IS NULL ORDER BY start_time DESC, id DESC"
    ))
    .bind(resource_id)
    .fetch_all(pool)
    .await?;
    Ok(operations)
}

/// Journal a new operation in `pending`, stamped with the current instant
pub async fn start(pool: &SqlitePool, data: OperationStart) -> RepoResult<ResourceOperation> {
    let resource_id = data.resource_id.trim();
    // A create does not know its resource id until the provider assigns one
    if data.operation != OperationKind::Create || !resource_id.is_empty() {
        validate_required_text(resource_id, "resource_id", MAX_KEY_LEN)?;
    }
    validate_optional_text(&data.region, "region", MAX_NAME_LEN)?;
    validate_optional_text(&data.instance_id, "instance_id", MAX_KEY_LEN)?;
    if data.operator.len() > MAX_NAME_LEN {
        return Err(RepoError::Validation(format!(
            "operator is too long ({} chars, max {MAX_NAME_LEN})",
            data.operator.len()
        )));
    }

    let parameters = serde_json::to_string(&data.parameters)?;
    let now = shared::util::now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO resource_operation (account_id, resource_type, resource_id, region, operation, status, instance_id, parameters, start_time, operator, created_at, updated_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?8, ?8) RETURNING id",
    )
    .bind(data.account_id)
    .bind(data.resource_type.as_str())
    .bind(resource_id)
    .bind(&data.region)
    .bind(data.operation.as_str())
    .bind(&data.instance_id)
    .bind(parameters)
    .bind(now)
    .bind(&data.operator)
    .fetch_one(pool)
    .await?;

    tracing::info!(
        operation_id = id,
        operation = %data.operation,
        resource_id = %resource_id,
        "Operation started"
    );
    get(pool, id).await
}

/// `pending → running`. Repeating it on a running operation is a no-op.
pub async fn mark_running(pool: &SqlitePool, id: i64) -> RepoResult<ResourceOperation> {
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE resource_operation SET status = 'running', updated_at = ?1 WHERE id = ?2 AND status = 'pending' AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    let operation = get(pool, id).await?;
    if rows.rows_affected() == 0 {
        match operation.status {
            OperationStatus::Running => {}
            status if status.is_terminal() => {
                return Err(RepoError::AlreadyTerminal(format!(
                    "Operation {id} is already {status}"
                )));
            }
            status => {
                return Err(RepoError::InvalidTransition(format!(
                    "Operation {id} cannot start from {status}"
                )));
            }
        }
    }
    Ok(operation)
}

/// `running → success | failed`, writing end time and duration once.
pub async fn complete(
    pool: &SqlitePool,
    id: i64,
    outcome: OperationOutcome,
    error_msg: Option<String>,
) -> RepoResult<ResourceOperation> {
    let status = OperationStatus::from(outcome);
    let error_msg = error_msg.map(|msg| truncate(&msg, MAX_ERROR_LEN));
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE resource_operation SET status = ?1, error_msg = ?2, end_time = ?3, \
           duration = MAX(?3 - start_time, 0) / 1000, updated_at = ?3 \
         WHERE id = ?4 AND status = 'running' AND deleted_at IS NULL",
    )
    .bind(status.as_str())
    .bind(&error_msg)
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    let operation = get(pool, id).await?;
    if rows.rows_affected() == 0 {
        return Err(if operation.status.is_terminal() {
            RepoError::AlreadyTerminal(format!(
                "Operation {id} is already {}",
                operation.status
            ))
        } else {
            RepoError::InvalidTransition(format!(
                "Operation {id} is {} and cannot complete",
                operation.status
            ))
        });
    }

    tracing::info!(
        operation_id = id,
        status = %operation.status,
        duration_secs = operation.duration.unwrap_or_default(),
        "Operation completed"
    );
    Ok(operation)
}

/// Record the provider-assigned id of a running create
pub async fn bind_resource(
    pool: &SqlitePool,
    id: i64,
    resource_id: &str,
) -> RepoResult<ResourceOperation> {
    validate_required_text(resource_id, "resource_id", MAX_KEY_LEN)?;
    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE resource_operation SET resource_id = ?1, updated_at = ?2 \
         WHERE id = ?3 AND operation = 'create' AND status = 'running' AND deleted_at IS NULL",
    )
    .bind(resource_id.trim())
    .bind(now)
    .bind(id)
    .execute(pool)
    .await?;

    let operation = get(pool, id).await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::InvalidTransition(format!(
            "Operation {id} ({} / {}) cannot take a resource id",
            operation.operation, operation.status
        )));
    }
    Ok(operation)
}

fn truncate(msg: &str, max_chars: usize) -> String {
    match msg.char_indices().nth(max_chars) {
        Some((idx, _)) => msg[..idx].to_string(),
        None => msg.to_string(),
    }
}
