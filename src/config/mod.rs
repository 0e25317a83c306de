// ==========================================
// 产线停机核心 - 配置层
// ==========================================
// 职责: 停机解析规则配置（时区偏移、短停阈值、分类名、类型分隔符）
// 存储: config_kv 表（scope_id = 'global'）
// ==========================================

pub mod config_manager;

// 重导出核心配置管理器
pub use config_manager::{config_keys, normalize_category, ConfigManager, DowntimeRules};
