// ==========================================
// 产线停机核心 - 领域类型定义
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 数据库时间格式（本地无时区）
pub const DB_DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 本地墙钟时间格式（分钟精度）
pub const LOCAL_MINUTE_FORMAT: &str = "%Y-%m-%d %H:%M";

/// 格式化为数据库存储格式
pub fn to_db_datetime(ts: &NaiveDateTime) -> String {
    ts.format(DB_DATETIME_FORMAT).to_string()
}

/// 解析数据库存储格式
pub fn parse_db_datetime(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DB_DATETIME_FORMAT).ok()
}

// ==========================================
// 停机操作类型 (审计用)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DowntimeActionType {
    Create,
    Update,
    Delete,
}

impl DowntimeActionType {
    pub fn to_db_str(&self) -> &'static str {
        match self {
            DowntimeActionType::Create => "CREATE",
            DowntimeActionType::Update => "UPDATE",
            DowntimeActionType::Delete => "DELETE",
        }
    }

    pub fn from_db_str(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "CREATE" => Some(DowntimeActionType::Create),
            "UPDATE" => Some(DowntimeActionType::Update),
            "DELETE" => Some(DowntimeActionType::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for DowntimeActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_str())
    }
}

// ==========================================
// 生产批次匹配来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunMatchSource {
    Explicit,         // 调用方直接给出 run_id
    LineWindow,       // 产线 + 时间窗
    PlantShiftWindow, // 工厂 + 产线 + 班次 + 时间窗（兜底）
}

impl fmt::Display for RunMatchSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMatchSource::Explicit => write!(f, "EXPLICIT"),
            RunMatchSource::LineWindow => write!(f, "LINE_WINDOW"),
            RunMatchSource::PlantShiftWindow => write!(f, "PLANT_SHIFT_WINDOW"),
        }
    }
}
