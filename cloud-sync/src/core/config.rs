use shared::models::ResourceType;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// 同步服务配置
///
/// # 环境变量
///
/// | 环境变量 | 默认值 | 说明 |
/// |----------|--------|------|
/// | WORK_DIR | /var/lib/cloud-sync | 工作目录 |
/// | DATABASE_PATH | {WORK_DIR}/cloud-sync.db | SQLite 数据库文件 |
/// | ENVIRONMENT | development | 运行环境 |
/// | LOG_LEVEL | info | 日志级别 |
/// | LOG_DIR | {WORK_DIR}/logs | 日志目录 |
/// | SYNC_INTERVAL_SECS | 300 | 巡检同步间隔(秒) |
/// | SYNC_PARALLELISM | 8 | 同时进行的同步单元上限 |
/// | SYNC_LOCK_TIMEOUT_SECS | 1800 | running 状态视为失效的时间(秒) |
/// | PROVIDER_TIMEOUT_MS | 30000 | 单次云厂商调用超时(毫秒) |
/// | STORAGE_TIMEOUT_MS | 5000 | 单次存储调用超时(毫秒) |
/// | SYNC_MAX_PAGES | 1000 | 单个同步单元最多拉取的页数 |
/// | SYNC_RESOURCE_TYPES | disk,instance | 巡检同步的资源类型 |
/// | DB_MAX_CONNECTIONS | 5 | 连接池大小 |
///
/// # 示例
///
/// ```ignore
/// WORK_DIR=/data/cloud-sync SYNC_PARALLELISM=4 cargo run
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    /// 工作目录，存放数据库与日志
    pub work_dir: String,
    pub database_path: String,
    /// 运行环境: development | staging | production
    pub environment: String,
    pub log_level: String,
    pub log_dir: String,

    // === 同步 ===
    pub sync_interval_secs: u64,
    pub sync_parallelism: usize,
    pub sync_lock_timeout_secs: u64,
    pub provider_timeout_ms: u64,
    pub storage_timeout_ms: u64,
    pub sync_max_pages: usize,
    pub sync_resource_types: Vec<ResourceType>,

    pub db_max_connections: u32,
}

impl Config {
    /// 从环境变量加载配置
    ///
    /// 如果环境变量未设置或无法解析，使用默认值
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源加载配置 (测试时不必修改进程环境变量)
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let parse = |key: &str| lookup(key).and_then(|v| v.trim().parse::<u64>().ok());

        let work_dir = lookup("WORK_DIR").unwrap_or_else(|| "/var/lib/cloud-sync".into());
        let work_path = PathBuf::from(&work_dir);
        let database_path = lookup("DATABASE_PATH").unwrap_or_else(|| {
            work_path.join("cloud-sync.db").to_string_lossy().into_owned()
        });
        let log_dir = lookup("LOG_DIR")
            .unwrap_or_else(|| work_path.join("logs").to_string_lossy().into_owned());

        Self {
            database_path,
            log_dir,
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "development".into()),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            sync_interval_secs: parse("SYNC_INTERVAL_SECS").filter(|v| *v > 0).unwrap_or(300),
            sync_parallelism: parse("SYNC_PARALLELISM")
                .filter(|v| *v > 0)
                .map_or(8, |v| v as usize),
            sync_lock_timeout_secs: parse("SYNC_LOCK_TIMEOUT_SECS")
                .filter(|v| *v > 0)
                .unwrap_or(1800),
            provider_timeout_ms: parse("PROVIDER_TIMEOUT_MS").filter(|v| *v > 0).unwrap_or(30000),
            storage_timeout_ms: parse("STORAGE_TIMEOUT_MS").filter(|v| *v > 0).unwrap_or(5000),
            sync_max_pages: parse("SYNC_MAX_PAGES")
                .filter(|v| *v > 0)
                .map_or(1000, |v| v as usize),
            sync_resource_types: lookup("SYNC_RESOURCE_TYPES")
                .map(|raw| parse_resource_types(&raw))
                .filter(|types| !types.is_empty())
                .unwrap_or_else(|| vec![ResourceType::Disk, ResourceType::Instance]),
            db_max_connections: parse("DB_MAX_CONNECTIONS")
                .filter(|v| *v > 0)
                .map_or(5, |v| v.min(u64::from(u32::MAX)) as u32),
            work_dir,
        }
    }

    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_lock_timeout_secs)
    }

    pub fn provider_timeout(&self) -> Duration {
        Duration::from_millis(self.provider_timeout_ms)
    }

    pub fn storage_timeout(&self) -> Duration {
        Duration::from_millis(self.storage_timeout_ms)
    }

    /// 是否生产环境
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// 是否开发环境
    pub fn is_development(&self) -> bool {
        self.environment == "development"
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Comma-separated resource types; unknown names are skipped with a warning
fn parse_resource_types(raw: &str) -> Vec<ResourceType> {
    let mut types = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match ResourceType::from_str(part) {
            Ok(rt) if !types.contains(&rt) => types.push(rt),
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Ignoring SYNC_RESOURCE_TYPES entry"),
        }
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]);
        assert_eq!(config.work_dir, "/var/lib/cloud-sync");
        assert!(config.database_path.ends_with("cloud-sync.db"));
        assert_eq!(config.sync_interval(), Duration::from_secs(300));
        assert_eq!(config.sync_parallelism, 8);
        assert_eq!(config.lock_timeout(), Duration::from_secs(30 * 60));
        assert_eq!(config.provider_timeout(), Duration::from_secs(30));
        assert_eq!(config.sync_max_pages, 1000);
        assert_eq!(
            config.sync_resource_types,
            vec![ResourceType::Disk, ResourceType::Instance]
        );
        assert_eq!(config.db_max_connections, 5);
        assert!(config.is_development());
    }

    #[test]
    fn test_overrides_and_bad_values() {
        let config = config_from(&[
            ("WORK_DIR", "/tmp/sync"),
            ("SYNC_PARALLELISM", "2"),
            ("SYNC_INTERVAL_SECS", "not-a-number"),
            ("SYNC_LOCK_TIMEOUT_SECS", "0"),
            ("SYNC_RESOURCE_TYPES", " Disk, vpc,disk,bogus "),
            ("ENVIRONMENT", "production"),
        ]);
        assert_eq!(config.database_path, "/tmp/sync/cloud-sync.db");
        assert_eq!(config.log_dir, "/tmp/sync/logs");
        assert_eq!(config.sync_parallelism, 2);
        assert_eq!(config.sync_interval_secs, 300);
        assert_eq!(config.sync_lock_timeout_secs, 1800);
        assert_eq!(
            config.sync_resource_types,
            vec![ResourceType::Disk, ResourceType::Vpc]
        );
        assert!(config.is_production());
    }

    #[test]
    fn test_unparseable_resource_types_fall_back() {
        let config = config_from(&[("SYNC_RESOURCE_TYPES", "bogus")]);
        assert_eq!(config.sync_resource_types.len(), 2);
    }
}
