// ==========================================
// 产线停机核心 - 停机操作审计日志
// ==========================================
// 红线: 所有写入必须记录，且与写入同事务
// ==========================================

use crate::domain::types::DowntimeActionType;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DowntimeActionLog {
    pub action_id: String,
    pub event_id: String,
    pub action_type: DowntimeActionType,
    pub action_ts: NaiveDateTime,
    pub payload_json: Option<JsonValue>, // 写入后的事件快照
    pub detail: Option<String>,
}
