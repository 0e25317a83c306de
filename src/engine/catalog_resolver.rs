// ==========================================
// 产线停机核心 - 停机原因主数据解析器
// ==========================================
// 预处理（一次性）:
// - 分类归一化（去空白/大写）
// - 短停改判: 0 < duration < 阈值 且分类为 BREAKDOWN -> MINOR STOP
// - 类型拆分: "前缀 - 后缀" -> TypeSelector { exact, suffix }
// 查找顺序（同一产线，首个命中即返回）:
// 1. 类型匹配 + 明细相等（双方均无明细也算相等）
// 2. 类型匹配，忽略明细（仅在给出明细时）
// 3. 分类为 MINOR STOP 且 1-2 落空 -> 在 BREAKDOWN 下重试 1-2
// ==========================================

use crate::config::{normalize_category, DowntimeRules};
use crate::domain::downtime_event::non_blank;
use crate::domain::downtime_master::DowntimeMasterEntry;
use crate::engine::error::{DowntimeError, DowntimeResult};
use crate::repository::DowntimeMasterRepository;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

// ==========================================
// TypeSelector - 类型选择器
// ==========================================
/// 类型字段拆分结果，只在预处理阶段生成一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeSelector {
    /// 相等匹配用（有后缀时为前缀部分）
    pub exact: String,
    /// 后缀（ends-with）匹配用
    pub suffix: Option<String>,
}

impl TypeSelector {
    /// 拆分类型文本；分隔符任一侧为空时按整体相等匹配
    pub fn parse(raw: &str, separator: char) -> Option<Self> {
        let text = normalize_text(raw)?;

        if let Some((head, tail)) = text.split_once(separator) {
            let head = head.trim();
            let tail = tail.trim();
            if !head.is_empty() && !tail.is_empty() {
                return Some(Self {
                    exact: head.to_string(),
                    suffix: Some(tail.to_string()),
                });
            }
        }

        Some(Self {
            exact: text,
            suffix: None,
        })
    }

    pub fn matches(&self, catalog_type: &str) -> bool {
        let Some(candidate) = normalize_text(catalog_type) else {
            return false;
        };
        match &self.suffix {
            Some(suffix) => candidate.ends_with(suffix.as_str()),
            None => candidate == self.exact,
        }
    }

    /// 后缀匹配一对多时，以前缀开头者优先
    fn is_preferred(&self, catalog_type: &str) -> bool {
        self.suffix.is_some()
            && normalize_text(catalog_type).map_or(false, |c| c.starts_with(self.exact.as_str()))
    }
}

// ==========================================
// 查找策略
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailRule {
    Exact,  // 明细相等（双方为空也算相等）
    Ignore, // 忽略明细
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupStep {
    pub category: String,
    pub detail_rule: DetailRule,
    /// 是否为 MINOR STOP -> BREAKDOWN 的重试步骤
    pub breakdown_retry: bool,
}

/// 命中来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CatalogMatchStep {
    Explicit,
    TypeAndDetail,
    TypeOnly,
    BreakdownTypeAndDetail,
    BreakdownTypeOnly,
}

impl From<&LookupStep> for CatalogMatchStep {
    fn from(step: &LookupStep) -> Self {
        match (step.breakdown_retry, step.detail_rule) {
            (false, DetailRule::Exact) => CatalogMatchStep::TypeAndDetail,
            (false, DetailRule::Ignore) => CatalogMatchStep::TypeOnly,
            (true, DetailRule::Exact) => CatalogMatchStep::BreakdownTypeAndDetail,
            (true, DetailRule::Ignore) => CatalogMatchStep::BreakdownTypeOnly,
        }
    }
}

// ==========================================
// 请求 / 预处理结果 / 解析结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct CatalogQuery<'a> {
    pub master_id: Option<&'a str>,
    pub line: Option<&'a str>,
    pub category: Option<&'a str>,
    pub type_label: Option<&'a str>,
    pub detail: Option<&'a str>,
}

/// 预处理后的选择器，下游不再解析原始文本
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogSelector {
    pub line: String,
    pub category: String,
    pub reclassified: bool,
    pub type_selector: TypeSelector,
    pub detail: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ResolvedCatalogEntry {
    pub entry: DowntimeMasterEntry,
    /// 查找时使用的分类（显式 master_id 时为 None）
    pub resolved_category: Option<String>,
    pub reclassified: bool,
    pub step: CatalogMatchStep,
}

// ==========================================
// CatalogResolver
// ==========================================
#[derive(Debug, Clone)]
pub struct CatalogResolver {
    rules: DowntimeRules,
}

impl CatalogResolver {
    pub fn new(rules: DowntimeRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &DowntimeRules {
        &self.rules
    }

    /// 解析停机原因主数据条目
    pub fn resolve(
        &self,
        conn: &Connection,
        query: &CatalogQuery<'_>,
        duration_min: i64,
    ) -> DowntimeResult<ResolvedCatalogEntry> {
        if let Some(master_id) = non_blank(query.master_id) {
            let entry = DowntimeMasterRepository::find_by_id_in(conn, master_id)?.ok_or_else(|| {
                DowntimeError::CatalogEntryNotFound {
                    context: format!("master_id={}", master_id),
                }
            })?;
            return Ok(ResolvedCatalogEntry {
                entry,
                resolved_category: None,
                reclassified: false,
                step: CatalogMatchStep::Explicit,
            });
        }

        let selector = self.prepare(query, duration_min)?;
        self.lookup(conn, &selector)
    }

    /// 预处理: 归一化分类、短停改判、拆分类型
    pub fn prepare(&self, query: &CatalogQuery<'_>, duration_min: i64) -> DowntimeResult<CatalogSelector> {
        let line = non_blank(query.line).ok_or(DowntimeError::MissingSelector { field: "line" })?;
        let raw_category =
            non_blank(query.category).ok_or(DowntimeError::MissingSelector { field: "category" })?;
        let type_selector = query
            .type_label
            .and_then(|t| TypeSelector::parse(t, self.rules.type_separator))
            .ok_or(DowntimeError::MissingSelector { field: "type" })?;

        let (category, reclassified) = self.reclassify(&normalize_category(raw_category), duration_min);
        if reclassified {
            tracing::debug!(
                line,
                duration_min,
                from = %self.rules.breakdown_category,
                to = %category,
                "短停改判"
            );
        }

        Ok(CatalogSelector {
            line: line.to_string(),
            category,
            reclassified,
            type_selector,
            detail: query.detail.and_then(normalize_text),
        })
    }

    /// 短停改判
    pub fn reclassify(&self, normalized_category: &str, duration_min: i64) -> (String, bool) {
        let is_short = duration_min > 0 && duration_min < self.rules.minor_stop_threshold_min;
        if is_short && normalized_category == self.rules.breakdown_category {
            (self.rules.minor_stop_category.clone(), true)
        } else {
            (normalized_category.to_string(), false)
        }
    }

    /// 有序查找策略
    pub fn lookup_plan(&self, category: &str, has_detail: bool) -> Vec<LookupStep> {
        let mut steps = Vec::with_capacity(4);
        let mut push_category = |category: &str, breakdown_retry: bool| {
            steps.push(LookupStep {
                category: category.to_string(),
                detail_rule: DetailRule::Exact,
                breakdown_retry,
            });
            if has_detail {
                steps.push(LookupStep {
                    category: category.to_string(),
                    detail_rule: DetailRule::Ignore,
                    breakdown_retry,
                });
            }
        };

        push_category(category, false);
        if category == self.rules.minor_stop_category {
            push_category(&self.rules.breakdown_category, true);
        }
        steps
    }

    /// 按策略顺序查找，首个命中即返回
    pub fn lookup(&self, conn: &Connection, selector: &CatalogSelector) -> DowntimeResult<ResolvedCatalogEntry> {
        let plan = self.lookup_plan(&selector.category, selector.detail.is_some());

        // 同一分类的相邻步骤复用候选集
        let mut candidates: Option<(String, Vec<DowntimeMasterEntry>)> = None;

        for step in &plan {
            let needs_fetch = candidates
                .as_ref()
                .map_or(true, |(category, _)| category != &step.category);
            if needs_fetch {
                let rows = DowntimeMasterRepository::list_by_line_and_category_in(
                    conn,
                    &selector.line,
                    &step.category,
                )?;
                candidates = Some((step.category.clone(), rows));
            }

            let Some((_, rows)) = candidates.as_ref() else {
                continue;
            };

            if let Some(entry) = pick(rows, selector, step.detail_rule) {
                let matched = CatalogMatchStep::from(step);
                tracing::debug!(
                    line = %selector.line,
                    category = %step.category,
                    master_id = %entry.master_id,
                    step = ?matched,
                    "主数据命中"
                );
                return Ok(ResolvedCatalogEntry {
                    entry: entry.clone(),
                    resolved_category: Some(step.category.clone()),
                    reclassified: selector.reclassified,
                    step: matched,
                });
            }
        }

        Err(DowntimeError::CatalogEntryNotFound {
            context: format!(
                "line={}, category={}, type={}{}, detail={}",
                selector.line,
                selector.category,
                selector.type_selector.exact,
                selector
                    .type_selector
                    .suffix
                    .as_ref()
                    .map(|s| format!(" (suffix={})", s))
                    .unwrap_or_default(),
                selector.detail.as_deref().unwrap_or("-"),
            ),
        })
    }
}

/// 在候选集中按类型/明细规则取第一条；后缀匹配时以前缀开头者优先
fn pick<'e>(
    rows: &'e [DowntimeMasterEntry],
    selector: &CatalogSelector,
    detail_rule: DetailRule,
) -> Option<&'e DowntimeMasterEntry> {
    let mut hits = rows.iter().filter(|entry| {
        selector.type_selector.matches(&entry.type_label)
            && match detail_rule {
                DetailRule::Ignore => true,
                DetailRule::Exact => {
                    entry.detail_text().and_then(normalize_text) == selector.detail
                }
            }
    });

    let first = hits.next()?;
    if selector.type_selector.is_preferred(&first.type_label) {
        return Some(first);
    }
    hits.find(|entry| selector.type_selector.is_preferred(&entry.type_label))
        .or(Some(first))
}

/// 去空白、大写；空串视为缺省
fn normalize_text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_uppercase())
    }
}
