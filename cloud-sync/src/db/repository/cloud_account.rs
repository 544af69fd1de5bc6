//! Cloud Account Repository
//!
//! Name and access-key uniqueness among live accounts is enforced by partial
//! unique indexes, so concurrent creates/updates cannot both win; the
//! violation is reported as [`RepoError::Duplicate`].

use super::{
    MAX_KEY_LEN, MAX_NAME_LEN, MAX_NOTE_LEN, RepoError, RepoResult, inventory, sync_status,
    validate_optional_text, validate_required_text,
};
use shared::models::{
    CloudAccount, CloudAccountCreate, CloudAccountQuery, CloudAccountUpdate, CloudProvider,
    mask_key,
};
use shared::pagination::{self, MAX_PAGE_SIZE, PaginatedResponse};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

const COLUMNS: &str = "id, name, provider, access_key, secret_key, regions, is_enabled, description, created_at, updated_at";

pub async fn find_by_id(pool: &SqlitePool, id: i64) -> RepoResult<Option<CloudAccount>> {
    let account = sqlx::query_as::<_, CloudAccount>(&format!(
        "SELECT {COLUMNS} FROM cloud_account WHERE id = ? AND deleted_at IS NULL"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(account)
}

/// Like [`find_by_id`] but absence is an error
pub async fn get(pool: &SqlitePool, id: i64) -> RepoResult<CloudAccount> {
    find_by_id(pool, id)
        .await?
        .ok_or_else(|| RepoError::NotFound(format!("Cloud account {id} not found")))
}

pub async fn create(pool: &SqlitePool, data: CloudAccountCreate) -> RepoResult<CloudAccount> {
    let name = data.name.trim();
    validate_required_text(name, "name", MAX_NAME_LEN)?;
    validate_required_text(&data.access_key, "access_key", MAX_KEY_LEN)?;
    validate_required_text(&data.secret_key, "secret_key", MAX_KEY_LEN)?;
    validate_optional_text(&data.description, "description", MAX_NOTE_LEN)?;
    let regions = serde_json::to_string(&normalize_regions(&data.regions)?)?;

    let now = shared::util::now_millis();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO cloud_account (name, provider, access_key, secret_key, regions, is_enabled, description, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8) RETURNING id",
    )
    .bind(name)
    .bind(data.provider.as_str())
    .bind(&data.access_key)
    .bind(&data.secret_key)
    .bind(&regions)
    .bind(data.is_enabled.unwrap_or(true))
    .bind(&data.description)
    .bind(now)
    .fetch_one(pool)
    .await
    .map_err(|e| uniqueness_error(e, Some(name), Some(&data.access_key)))?;

    let account = get(pool, id).await?;
    tracing::info!(
        id,
        name = %account.name,
        provider = %account.provider,
        access_key = %account.masked_access_key(),
        "Cloud account created"
    );
    Ok(account)
}

/// Partial update: only supplied fields change. Renaming onto another live
/// account's name (or access key) fails with `Duplicate`; keeping one's own
/// value never conflicts.
pub async fn update(pool: &SqlitePool, id: i64, data: CloudAccountUpdate) -> RepoResult<CloudAccount> {
    let name = data.name.as_deref().map(str::trim);
    if let Some(name) = name {
        validate_required_text(name, "name", MAX_NAME_LEN)?;
    }
    if let Some(ref key) = data.access_key {
        validate_required_text(key, "access_key", MAX_KEY_LEN)?;
    }
    if let Some(ref secret) = data.secret_key {
        validate_required_text(secret, "secret_key", MAX_KEY_LEN)?;
    }
    validate_optional_text(&data.description, "description", MAX_NOTE_LEN)?;
    let regions = match data.regions {
        Some(ref regions) => Some(serde_json::to_string(&normalize_regions(regions)?)?),
        None => None,
    };

    let now = shared::util::now_millis();
    let rows = sqlx::query(
        "UPDATE cloud_account SET name = COALESCE(?1, name), provider = COALESCE(?2, provider), access_key = COALESCE(?3, access_key), secret_key = COALESCE(?4, secret_key), regions = COALESCE(?5, regions), is_enabled = COALESCE(?6, is_enabled), description = CASE WHEN ?7 IS NULL THEN description ELSE NULLIF(?7, '') END, updated_at = ?8 WHERE id = ?9 AND deleted_at IS NULL",
    )
    .bind(name)
    .bind(data.provider.map(|p| p.as_str()))
    .bind(&data.access_key)
    .bind(&data.secret_key)
    .bind(&regions)
    .bind(data.is_enabled)
    .bind(data.description.as_deref().map(str::trim))
    .bind(now)
    .bind(id)
    .execute(pool)
    .await
    .map_err(|e| uniqueness_error(e, name, data.access_key.as_deref()))?;

    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Cloud account {id} not found")));
    }
    tracing::info!(id, "Cloud account updated");
    get(pool, id).await
}

/// Delete an account together with its sync status rows and inventory.
///
/// Runs in one transaction: either every row goes or none does.
pub async fn delete(pool: &SqlitePool, id: i64) -> RepoResult<()> {
    let account = get(pool, id).await?;
    let now = shared::util::now_millis();

    // Dropping `tx` on any early return rolls back
    let mut tx = pool.begin().await?;

    let statuses = sync_status::delete_all(&mut *tx, id).await?;
    let resources = inventory::delete_all_for_account(&mut *tx, id).await?;

    let rows = sqlx::query(
        "UPDATE cloud_account SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
    )
    .bind(now)
    .bind(id)
    .execute(&mut *tx)
    .await?;
    if rows.rows_affected() == 0 {
        return Err(RepoError::NotFound(format!("Cloud account {id} not found")));
    }

    tx.commit().await?;

    tracing::info!(
        id,
        name = %account.name,
        access_key = %account.masked_access_key(),
        sync_statuses = statuses,
        resources,
        "Cloud account deleted"
    );
    Ok(())
}

/// Paged listing, newest first. Page/size below 1 fall back to 1/10.
pub async fn list(
    pool: &SqlitePool,
    query: &CloudAccountQuery,
) -> RepoResult<PaginatedResponse<CloudAccount>> {
    let (page, size) = pagination::normalize(query.page, query.size);
    if size > MAX_PAGE_SIZE {
        return Err(RepoError::Validation(format!(
            "page size {size} exceeds maximum {MAX_PAGE_SIZE}"
        )));
    }

    let mut count = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM cloud_account");
    push_filters(&mut count, query);
    let total: i64 = count.build_query_scalar::<i64>().fetch_one(pool).await?;

    let offset = i64::from(page - 1) * i64::from(size);
    let mut select = QueryBuilder::<Sqlite>::new(format!("SELECT {COLUMNS} FROM cloud_account"));
    push_filters(&mut select, query);
    select
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(i64::from(size))
        .push(" OFFSET ")
        .push_bind(offset);
    let accounts = select
        .build_query_as::<CloudAccount>()
        .fetch_all(pool)
        .await?;

    tracing::debug!(total, count = accounts.len(), page, size, "Cloud accounts listed");
    Ok(PaginatedResponse::new(
        accounts,
        total.max(0) as u64,
        page,
        size,
    ))
}

/// Enabled accounts of one provider
pub async fn find_by_provider(
    pool: &SqlitePool,
    provider: CloudProvider,
) -> RepoResult<Vec<CloudAccount>> {
    let accounts = sqlx::query_as::<_, CloudAccount>(&format!(
        "SELECT {COLUMNS} FROM cloud_account WHERE provider = ? AND is_enabled = 1 AND deleted_at IS NULL ORDER BY id"
    ))
    .bind(provider.as_str())
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

pub async fn find_enabled(pool: &SqlitePool) -> RepoResult<Vec<CloudAccount>> {
    let accounts = sqlx::query_as::<_, CloudAccount>(&format!(
        "SELECT {COLUMNS} FROM cloud_account WHERE is_enabled = 1 AND deleted_at IS NULL ORDER BY id"
    ))
    .fetch_all(pool)
    .await?;
    Ok(accounts)
}

/// Live accounts among `ids`; unknown ids are skipped
pub async fn batch_get(pool: &SqlitePool, ids: &[i64]) -> RepoResult<Vec<CloudAccount>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut qb = QueryBuilder::<Sqlite>::new(format!(
        "SELECT {COLUMNS} FROM cloud_account WHERE deleted_at IS NULL AND id IN ("
    ));
    let mut separated = qb.separated(", ");
    for id in ids {
        separated.push_bind(*id);
    }
    separated.push_unseparated(") ORDER BY id");

    let accounts = qb.build_query_as::<CloudAccount>().fetch_all(pool).await?;
    Ok(accounts)
}

fn push_filters(qb: &mut QueryBuilder<'_, Sqlite>, query: &CloudAccountQuery) {
    qb.push(" WHERE deleted_at IS NULL");
    if let Some(search) = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
    {
        qb.push(" AND name LIKE ")
            .push_bind(format!("%{}%", escape_like(search)))
            .push(" ESCAPE '\\'");
    }
    if let Some(provider) = query.provider {
        qb.push(" AND provider = ").push_bind(provider.as_str());
    }
    if let Some(enabled) = query.enabled {
        qb.push(" AND is_enabled = ").push_bind(enabled);
    }
}

fn escape_like(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Trim, drop duplicates (keeping first occurrence), reject blanks
fn normalize_regions(regions: &[String]) -> RepoResult<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(regions.len());
    for region in regions {
        let region = region.trim();
        validate_required_text(region, "region", MAX_NAME_LEN)?;
        if !out.iter().any(|r| r == region) {
            out.push(region.to_string());
        }
    }
    Ok(out)
}

fn uniqueness_error(err: sqlx::Error, name: Option<&str>, access_key: Option<&str>) -> RepoError {
    match RepoError::from(err) {
        RepoError::Duplicate(msg) if msg.contains("access_key") => RepoError::Duplicate(format!(
            "Access key {} already exists",
            mask_key(access_key.unwrap_or_default())
        )),
        RepoError::Duplicate(_) => RepoError::Duplicate(format!(
            "Cloud account name '{}' already exists",
            name.unwrap_or_default()
        )),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like("prod_1%"), "prod\\_1\\%");
        assert_eq!(escape_like("plain"), "plain");
    }

    #[test]
    fn test_normalize_regions() {
        let regions = vec![
            " cn-hangzhou ".to_string(),
            "cn-beijing".to_string(),
            "cn-hangzhou".to_string(),
        ];
        assert_eq!(
            normalize_regions(&regions).unwrap(),
            vec!["cn-hangzhou".to_string(), "cn-beijing".to_string()]
        );
        assert!(normalize_regions(&[" ".to_string()]).is_err());
    }
}
