// ==========================================
// 产线停机核心 - 领域模型层
// ==========================================
// 职责: 定义生产批次、停机主数据、停机事件及输入类型
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod downtime_event;
pub mod downtime_master;
pub mod production_run;
pub mod types;

// 重导出核心类型
pub use action_log::DowntimeActionLog;
pub use downtime_event::{DowntimeEvent, DowntimeEventInput};
pub use downtime_master::DowntimeMasterEntry;
pub use production_run::ProductionRun;
pub use types::{DowntimeActionType, RunMatchSource};
