// ==========================================
// 产线停机核心 - 停机事件 API
// ==========================================
// 职责: 对传输层暴露的核心操作
// - CreateDowntimeEvent / UpdateDowntimeEvent / DeleteDowntimeEvent
// - ResolveRunId / ResolveCatalogEntry（只解析不写入）
// - GetDowntimeEvent / ListDowntimeEventsByRun
// ==========================================

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, DowntimeRules};
use crate::db::SharedConnection;
use crate::domain::downtime_event::{DowntimeEvent, DowntimeEventInput};
use crate::domain::downtime_master::DowntimeMasterEntry;
use crate::domain::types::LOCAL_MINUTE_FORMAT;
use crate::engine::{CatalogMatchStep, CatalogQuery, DowntimeEventWriter};
use crate::repository::DowntimeEventRepository;

// ==========================================
// DTO
// ==========================================

/// 停机事件视图（时间为本地分钟精度文本）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeEventView {
    pub event_id: String,
    pub run_id: String,
    pub master_id: String,
    pub start_time: String,
    pub end_time: String,
    pub duration_min: i64,
    pub machine_id: Option<String>,
    pub note: Option<String>,
}

impl From<DowntimeEvent> for DowntimeEventView {
    fn from(event: DowntimeEvent) -> Self {
        Self {
            event_id: event.event_id,
            run_id: event.run_id,
            master_id: event.master_id,
            start_time: event.start_time.format(LOCAL_MINUTE_FORMAT).to_string(),
            end_time: event.end_time.format(LOCAL_MINUTE_FORMAT).to_string(),
            duration_min: event.duration_min,
            machine_id: event.machine_id,
            note: event.note,
        }
    }
}

/// 批次解析请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveRunRequest {
    #[serde(default)]
    pub plant: Option<String>,
    pub line: String,
    #[serde(default)]
    pub shift: Option<String>,
    pub start_time: String,
}

/// 主数据解析请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolveCatalogRequest {
    pub line: String,
    pub category: String,
    #[serde(rename = "type")]
    pub type_label: String,
    #[serde(default)]
    pub detail: Option<String>,
    pub duration_min: i64,
}

/// 主数据解析结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedCatalogView {
    pub entry: DowntimeMasterEntry,
    pub resolved_category: Option<String>,
    pub reclassified: bool,
    pub step: CatalogMatchStep,
}

// ==========================================
// DowntimeApi
// ==========================================
pub struct DowntimeApi {
    writer: Arc<DowntimeEventWriter>,
    event_repo: Arc<DowntimeEventRepository>,
}

impl DowntimeApi {
    pub fn new(writer: Arc<DowntimeEventWriter>, event_repo: Arc<DowntimeEventRepository>) -> Self {
        Self { writer, event_repo }
    }

    /// 从共享连接装配（规则从 config_kv 加载）
    pub fn from_connection(conn: SharedConnection) -> ApiResult<Self> {
        let rules = ConfigManager::new(conn.clone()).load_rules()?;
        Ok(Self::with_rules(conn, rules))
    }

    /// 使用给定规则装配
    pub fn with_rules(conn: SharedConnection, rules: DowntimeRules) -> Self {
        let writer = Arc::new(DowntimeEventWriter::new(conn.clone(), rules));
        let event_repo = Arc::new(DowntimeEventRepository::new(conn));
        Self::new(writer, event_repo)
    }

    /// 创建停机事件
    pub fn create_downtime_event(&self, input: &DowntimeEventInput) -> ApiResult<DowntimeEventView> {
        let event = self.writer.create(input)?;
        Ok(event.into())
    }

    /// 更新停机事件（全部派生字段重新解析）
    pub fn update_downtime_event(
        &self,
        event_id: &str,
        input: &DowntimeEventInput,
    ) -> ApiResult<DowntimeEventView> {
        let event_id = require_id(event_id)?;
        let event = self.writer.update(event_id, input)?;
        Ok(event.into())
    }

    /// 删除停机事件
    pub fn delete_downtime_event(&self, event_id: &str) -> ApiResult<()> {
        let event_id = require_id(event_id)?;
        self.writer.delete(event_id)?;
        Ok(())
    }

    /// 查询单条停机事件
    pub fn get_downtime_event(&self, event_id: &str) -> ApiResult<DowntimeEventView> {
        let event_id = require_id(event_id)?;
        self.event_repo
            .find_by_id(event_id)?
            .map(DowntimeEventView::from)
            .ok_or_else(|| ApiError::EventNotFound(event_id.to_string()))
    }

    /// 查询某批次下的停机事件
    pub fn list_downtime_events_by_run(&self, run_id: &str) -> ApiResult<Vec<DowntimeEventView>> {
        let run_id = require_id(run_id)?;
        let events = self.event_repo.list_by_run(run_id)?;
        Ok(events.into_iter().map(DowntimeEventView::from).collect())
    }

    /// 解析生产批次 ID
    pub fn resolve_run_id(&self, request: &ResolveRunRequest) -> ApiResult<String> {
        let run_id = self.writer.resolve_run_id(
            request.plant.as_deref(),
            &request.line,
            request.shift.as_deref(),
            &request.start_time,
        )?;
        Ok(run_id)
    }

    /// 解析停机原因主数据条目
    pub fn resolve_catalog_entry(&self, request: &ResolveCatalogRequest) -> ApiResult<ResolvedCatalogView> {
        let query = CatalogQuery {
            master_id: None,
            line: Some(request.line.as_str()),
            category: Some(request.category.as_str()),
            type_label: Some(request.type_label.as_str()),
            detail: request.detail.as_deref(),
        };
        let resolved = self.writer.resolve_catalog_entry(&query, request.duration_min)?;
        Ok(ResolvedCatalogView {
            entry: resolved.entry,
            resolved_category: resolved.resolved_category,
            reclassified: resolved.reclassified,
            step: resolved.step,
        })
    }
}

fn require_id(raw: &str) -> ApiResult<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ApiError::InvalidInput("ID不能为空".to_string()));
    }
    Ok(trimmed)
}
