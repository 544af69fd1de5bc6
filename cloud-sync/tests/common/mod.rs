//! Shared fixtures: a temp-file SQLite database and account helpers

#![allow(dead_code)]

use cloud_sync::DbService;
use cloud_sync::db::DbOptions;
use cloud_sync::db::repository::cloud_account;
use cloud_sync::sync::SyncSettings;
use shared::models::{CloudAccount, CloudAccountCreate, CloudProvider, ResourceType};
use sqlx::SqlitePool;
use std::time::Duration;
use tempfile::TempDir;

pub struct TestDb {
    pub db: DbService,
    // Keeps the database file alive for the duration of the test
    _dir: TempDir,
}

impl TestDb {
    pub fn pool(&self) -> &SqlitePool {
        &self.db.pool
    }
}

/// Fresh migrated database with several pooled connections
pub async fn setup() -> TestDb {
    let dir = tempfile::tempdir().expect("create temp dir");
    let path = dir.path().join("cloud-sync-test.db");
    let db = DbService::with_options(
        path.to_str().expect("utf-8 temp path"),
        DbOptions {
            max_connections: 8,
            ..DbOptions::default()
        },
    )
    .await
    .expect("open test database");
    TestDb { db, _dir: dir }
}

pub fn account_input(name: &str, regions: &[&str]) -> CloudAccountCreate {
    CloudAccountCreate {
        name: name.to_string(),
        provider: CloudProvider::Aliyun,
        access_key: format!("LTAI-{name}-0001"),
        secret_key: format!("secret-{name}"),
        regions: regions.iter().map(|r| r.to_string()).collect(),
        is_enabled: None,
        description: None,
    }
}

pub async fn create_account(pool: &SqlitePool, name: &str, regions: &[&str]) -> CloudAccount {
    cloud_account::create(pool, account_input(name, regions))
        .await
        .expect("create account")
}

/// Disk-only sweeps with short provider deadlines
pub fn test_settings() -> SyncSettings {
    SyncSettings {
        resource_types: vec![ResourceType::Disk],
        parallelism: 4,
        lock_timeout: Duration::from_secs(30 * 60),
        provider_timeout: Duration::from_secs(2),
        storage_timeout: Duration::from_secs(5),
        max_pages: 100,
    }
}

pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await
        .expect("count rows")
}
