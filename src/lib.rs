// ==========================================
// 产线停机核心 - 核心库
// ==========================================
// 职责: 停机事件的时间归一化、批次归属、原因主数据解析、重叠检测与原子写入
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 解析与写入规则
pub mod engine;

// 配置层 - 规则配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 对外接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域实体
pub use domain::{
    DowntimeActionLog, DowntimeActionType, DowntimeEvent, DowntimeEventInput, DowntimeMasterEntry,
    ProductionRun, RunMatchSource,
};

// 引擎
pub use engine::{
    CatalogResolver, ConflictDetector, DowntimeError, DowntimeEventWriter, RunResolver,
    TimeNormalizer,
};

// 配置
pub use config::{ConfigManager, DowntimeRules};

// API
pub use api::{ApiError, DowntimeApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "产线停机核心";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
