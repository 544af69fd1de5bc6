//! Cloud Sync - 多云账户资源同步核心
//!
//! # 架构概述
//!
//! - **账户存储** (`db::repository::cloud_account`): 云账户增删改查，删除时级联清理同步状态
//! - **同步状态** (`db::repository::sync_status`): 每个 (账户, 资源类型, 地域) 一行，兼作互斥锁
//! - **操作台账** (`db::repository::operation`): 长耗时操作的状态机 `pending → running → success|failed`
//! - **同步编排** (`sync`): 周期巡检 + 手动触发，通过存储层的条件写入实现跨进程互斥
//! - **云厂商网关** (`gateway`): 厂商 API 抽象，分页与错误在适配层归一化
//!
//! # 模块结构
//!
//! ```text
//! cloud-sync/src/
//! ├── core/          # 配置、后台任务
//! ├── db/            # SQLite 连接池、迁移、仓储
//! ├── gateway/       # ProviderGateway trait、注册表、内存实现
//! ├── operations/    # 磁盘操作执行 + 台账记录
//! ├── sync/          # 编排器、巡检 worker
//! └── utils/         # 错误、日志、超时
//! ```

pub mod core;
pub mod db;
pub mod gateway;
pub mod operations;
pub mod sync;
pub mod utils;

// Re-export 公共类型
pub use core::{BackgroundTasks, Config, TaskKind};
pub use db::DbService;
pub use gateway::{GatewayRegistry, MemoryGateway, ProviderError, ProviderGateway};
pub use operations::OperationRunner;
pub use sync::{SlotResult, SweepReport, SyncOrchestrator, SyncSettings, SyncWorker};
pub use utils::{AppError, AppResult};

// Re-export logger functions
pub use utils::logger::{init_logger, init_logger_with_file};
