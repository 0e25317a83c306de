// ==========================================
// 产线停机核心 - 停机原因主数据
// ==========================================
// 由外部主数据流程维护，本核心只读
// 约束: (line, category, type, detail) 在解析意义上唯一；
//       后缀匹配可能一对多，取第一条
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeMasterEntry {
    pub master_id: String,
    pub line: String,
    pub category: String,   // 粗分类: Breakdown / Minor Stop / Changeover ...
    pub type_label: String, // 类型文本，历史数据可能带后缀
    pub detail: Option<String>,

    // ===== 展示属性 =====
    pub display_name: Option<String>,
    pub color: Option<String>,
    pub sort_order: Option<i64>,
}

impl DowntimeMasterEntry {
    /// 明细为空或仅空白时视为无明细
    pub fn detail_text(&self) -> Option<&str> {
        self.detail
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
    }
}
