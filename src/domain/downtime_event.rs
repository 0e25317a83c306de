// ==========================================
// 产线停机核心 - 停机事件
// ==========================================
// 约束: end = start + duration；同一产线（经 run/master 推导）
//       任意两条事件的 [start, end) 不相交
// ==========================================

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// 可存储的最大年份（文本时间 "YYYY-..." 的字典序等于时间序）
pub const MAX_STORABLE_YEAR: i32 = 9999;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeEvent {
    pub event_id: String,
    pub run_id: String,
    pub master_id: String,
    pub start_time: NaiveDateTime,
    pub end_time: NaiveDateTime,
    pub duration_min: i64,
    pub machine_id: Option<String>,
    pub note: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// 计算结束时间: start + duration 分钟
///
/// 时长越界、相加溢出或结束年份超出 MAX_STORABLE_YEAR 时返回 None
pub fn compute_end_time(start: &NaiveDateTime, duration_min: i64) -> Option<NaiveDateTime> {
    let delta = Duration::try_minutes(duration_min)?;
    start
        .checked_add_signed(delta)
        .filter(|end| end.year() <= MAX_STORABLE_YEAR)
}

// ==========================================
// DowntimeEventInput - 操作员输入
// ==========================================
// 创建与更新共用同一输入结构；派生字段（run/master/时间）每次全部重新解析
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DowntimeEventInput {
    #[serde(default)]
    pub line: String,
    pub start_time: String,
    pub duration_min: i64,

    // ===== 显式标识（给出则短路解析） =====
    #[serde(default)]
    pub run_id: Option<String>,
    #[serde(default)]
    pub master_id: Option<String>,

    // ===== 批次兜底定位 =====
    #[serde(default)]
    pub plant: Option<String>,
    #[serde(default)]
    pub shift: Option<String>,

    // ===== 停机原因 =====
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, rename = "type")]
    pub type_label: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,

    // ===== 附加信息 =====
    #[serde(default)]
    pub machine_id: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
}

/// 去空白，空串视为缺省
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
