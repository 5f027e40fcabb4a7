//! 基础设施层实现。
//!
//! 提供 PostgreSQL 仓储、嵌入式迁移、本地磁盘附件存储和审计日志观察者，
//! 实现应用层定义的接口。

pub mod audit;
pub mod blob_store;
pub mod builder;
pub mod migrations;
pub mod repository;

pub use audit::AuditLogObserver;
pub use blob_store::LocalBlobStore;
pub use builder::{Infrastructure, InfrastructureConfig, InfrastructureError};
pub use migrations::MIGRATOR;
pub use repository::{
    create_pg_pool, PgCallRepository, PgMessageRepository, PgRoomRepository, PgStorage,
    PgUserRepository,
};
