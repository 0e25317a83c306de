// ==========================================
// 产线停机核心 - 生产批次
// ==========================================
// 由外部生产跟踪流程创建/关闭，本核心只读
// 约束: 同一产线的批次时间窗不重叠，按开始时间有序
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductionRun {
    pub run_id: String,
    pub plant: String,
    pub line: String,
    pub shift: String,
    pub start_time: NaiveDateTime,
    pub end_time: Option<NaiveDateTime>, // None = 仍在生产
}
