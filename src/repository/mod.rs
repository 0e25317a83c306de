// ==========================================
// 产线停机核心 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================
// 事务内查询使用 `&Connection` 关联函数（Transaction 可解引用为 Connection），
// 独立查询使用仓储实例持有的共享连接
// ==========================================

pub mod action_log_repo;
pub mod downtime_event_repo;
pub mod downtime_master_repo;
pub mod error;
pub mod production_run_repo;

// 重导出核心仓储
pub use action_log_repo::DowntimeActionLogRepository;
pub use downtime_event_repo::DowntimeEventRepository;
pub use downtime_master_repo::DowntimeMasterRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use production_run_repo::ProductionRunRepository;
