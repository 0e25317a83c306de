// ==========================================
// 产线停机核心 - 停机事件写入编排
// ==========================================
// 创建: 时间归一化 -> 批次解析 -> 主数据解析 -> 冲突检测 -> 写入 + 审计
// 更新: 同一流程，全部派生字段重新解析后整体替换
// 删除: 按 ID 直接删除，不重新解析
// ==========================================
// 并发:
// - 创建/更新使用 BEGIN IMMEDIATE：事务开始即持有写锁，冲突查询与写入
//   构成同一临界区，跨连接/跨进程均不会出现“先查后写”竞态
// - 后到的写者在 busy_timeout 内等待，随后看到先写者已提交的记录
// - 任一步失败，Transaction 析构即回滚，无部分写入
// - 锁粒度是整个数据库而非产线: 同一进程内共享一个 Mutex<Connection>，
//   跨连接由 BEGIN IMMEDIATE 独占写锁，不同产线的写入同样逐个执行
//   （SQLite 本身也只允许一个写者）；只读查询不受影响
// ==========================================

use crate::config::DowntimeRules;
use crate::db::SharedConnection;
use crate::domain::action_log::DowntimeActionLog;
use crate::domain::downtime_event::{non_blank, DowntimeEvent, DowntimeEventInput};
use crate::domain::types::{DowntimeActionType, RunMatchSource};
use crate::engine::catalog_resolver::{CatalogMatchStep, CatalogQuery, CatalogResolver, ResolvedCatalogEntry};
use crate::engine::conflict_detector::{CandidateInterval, ConflictDetector};
use crate::engine::error::{DowntimeError, DowntimeResult};
use crate::engine::run_resolver::{ResolvedRun, RunQuery, RunResolver};
use crate::engine::time_normalizer::{NormalizedTime, TimeNormalizer};
use crate::repository::{
    DowntimeActionLogRepository, DowntimeEventRepository, RepositoryError,
};
use chrono::{NaiveDateTime, Timelike, Utc};
use rusqlite::{Connection, TransactionBehavior};
use std::sync::MutexGuard;
use uuid::Uuid;

/// 一次完整解析的中间结果
#[derive(Debug, Clone)]
struct ResolvedWrite {
    start: NormalizedTime,
    interval: CandidateInterval,
    run: ResolvedRun,
    catalog: ResolvedCatalogEntry,
}

// ==========================================
// DowntimeEventWriter
// ==========================================
pub struct DowntimeEventWriter {
    conn: SharedConnection,
    normalizer: TimeNormalizer,
    run_resolver: RunResolver,
    catalog_resolver: CatalogResolver,
    conflict_detector: ConflictDetector,
}

impl DowntimeEventWriter {
    /// 创建写入器
    ///
    /// # 参数
    /// - conn: 共享存储客户端（进程启动时打开）
    /// - rules: 解析规则快照
    pub fn new(conn: SharedConnection, rules: DowntimeRules) -> Self {
        Self {
            conn,
            normalizer: TimeNormalizer::new(rules.local_offset()),
            run_resolver: RunResolver::new(),
            catalog_resolver: CatalogResolver::new(rules),
            conflict_detector: ConflictDetector::new(),
        }
    }

    pub fn rules(&self) -> &DowntimeRules {
        self.catalog_resolver.rules()
    }

    fn get_conn(&self) -> DowntimeResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DowntimeError::StorageFailure(RepositoryError::LockError(e.to_string())))
    }

    // ==========================================
    // 创建
    // ==========================================
    pub fn create(&self, input: &DowntimeEventInput) -> DowntimeResult<DowntimeEvent> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let resolved = match self.resolve_in(&tx, input, None) {
            Ok(r) => r,
            Err(e) => {
                log_rejection("create", None, input, &e);
                return Err(e);
            }
        };

        let now = now_local(&self.normalizer);
        let event = DowntimeEvent {
            event_id: Uuid::new_v4().to_string(),
            run_id: resolved.run.run.run_id.clone(),
            master_id: resolved.catalog.entry.master_id.clone(),
            start_time: resolved.interval.start,
            end_time: resolved.interval.end,
            duration_min: input.duration_min,
            machine_id: non_blank(input.machine_id.as_deref()).map(str::to_string),
            note: non_blank(input.note.as_deref()).map(str::to_string),
            created_at: now,
            updated_at: now,
        };

        DowntimeEventRepository::insert_in(&tx, &event)?;
        record_action(&tx, &event, DowntimeActionType::Create, &resolved, now)?;
        tx.commit()?;

        log_committed("create", &event, &resolved);
        Ok(event)
    }

    // ==========================================
    // 更新（整体重新解析）
    // ==========================================
    pub fn update(&self, event_id: &str, input: &DowntimeEventInput) -> DowntimeResult<DowntimeEvent> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = DowntimeEventRepository::find_by_id_in(&tx, event_id)?.ok_or_else(|| {
            DowntimeError::EventNotFound {
                event_id: event_id.to_string(),
            }
        })?;

        let resolved = match self.resolve_in(&tx, input, Some(event_id)) {
            Ok(r) => r,
            Err(e) => {
                log_rejection("update", Some(event_id), input, &e);
                return Err(e);
            }
        };

        let now = now_local(&self.normalizer);
        let event = DowntimeEvent {
            event_id: existing.event_id.clone(),
            run_id: resolved.run.run.run_id.clone(),
            master_id: resolved.catalog.entry.master_id.clone(),
            start_time: resolved.interval.start,
            end_time: resolved.interval.end,
            duration_min: input.duration_min,
            machine_id: non_blank(input.machine_id.as_deref()).map(str::to_string),
            note: non_blank(input.note.as_deref()).map(str::to_string),
            created_at: existing.created_at,
            updated_at: now,
        };

        if DowntimeEventRepository::replace_in(&tx, &event)? == 0 {
            return Err(DowntimeError::EventNotFound {
                event_id: event_id.to_string(),
            });
        }
        record_action(&tx, &event, DowntimeActionType::Update, &resolved, now)?;
        tx.commit()?;

        if existing.run_id != event.run_id {
            tracing::info!(
                event_id = %event.event_id,
                from_run = %existing.run_id,
                to_run = %event.run_id,
                "停机事件批次归属变更"
            );
        }
        log_committed("update", &event, &resolved);
        Ok(event)
    }

    // ==========================================
    // 删除
    // ==========================================
    pub fn delete(&self, event_id: &str) -> DowntimeResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing = DowntimeEventRepository::find_by_id_in(&tx, event_id)?.ok_or_else(|| {
            DowntimeError::EventNotFound {
                event_id: event_id.to_string(),
            }
        })?;

        if DowntimeEventRepository::delete_in(&tx, event_id)? == 0 {
            return Err(DowntimeError::EventNotFound {
                event_id: event_id.to_string(),
            });
        }

        let log = DowntimeActionLog {
            action_id: Uuid::new_v4().to_string(),
            event_id: event_id.to_string(),
            action_type: DowntimeActionType::Delete,
            action_ts: now_local(&self.normalizer),
            payload_json: Some(serde_json::to_value(&existing).map_err(RepositoryError::from)?),
            detail: None,
        };
        DowntimeActionLogRepository::insert_in(&tx, &log)?;
        tx.commit()?;

        tracing::info!(event_id, run_id = %existing.run_id, "停机事件已删除");
        Ok(())
    }

    // ==========================================
    // 独立解析（不写入）
    // ==========================================

    /// 解析生产批次 ID，供其他协作方在不写事件时使用
    pub fn resolve_run_id(
        &self,
        plant: Option<&str>,
        line: &str,
        shift: Option<&str>,
        start_time: &str,
    ) -> DowntimeResult<String> {
        let start = self.normalizer.normalize(start_time)?;
        let conn = self.get_conn()?;
        let query = RunQuery {
            run_id: None,
            line: Some(line),
            plant,
            shift,
        };
        let resolved = self.run_resolver.resolve(&conn, &query, &start.local)?;
        Ok(resolved.run.run_id)
    }

    /// 解析停机原因主数据条目（含短停改判）
    pub fn resolve_catalog_entry(
        &self,
        query: &CatalogQuery<'_>,
        duration_min: i64,
    ) -> DowntimeResult<ResolvedCatalogEntry> {
        let conn = self.get_conn()?;
        self.catalog_resolver.resolve(&conn, query, duration_min)
    }

    /// 完整解析流程（在调用方事务内执行）
    fn resolve_in(
        &self,
        conn: &Connection,
        input: &DowntimeEventInput,
        exclude_event_id: Option<&str>,
    ) -> DowntimeResult<ResolvedWrite> {
        if input.duration_min <= 0 {
            return Err(DowntimeError::InvalidDuration {
                duration_min: input.duration_min,
            });
        }

        let start = self.normalizer.normalize(&input.start_time)?;
        // 结束时间不可存储时在任何查找之前拒绝
        let interval = CandidateInterval::from_duration(start.local, input.duration_min)?;

        // 批次与主数据互不依赖
        let run = self.run_resolver.resolve(
            conn,
            &RunQuery {
                run_id: input.run_id.as_deref(),
                line: Some(input.line.as_str()),
                plant: input.plant.as_deref(),
                shift: input.shift.as_deref(),
            },
            &start.local,
        )?;

        let catalog = self.catalog_resolver.resolve(
            conn,
            &CatalogQuery {
                master_id: input.master_id.as_deref(),
                line: Some(input.line.as_str()),
                category: input.category.as_deref(),
                type_label: input.type_label.as_deref(),
                detail: input.detail.as_deref(),
            },
            input.duration_min,
        )?;

        // 事件的产线经主数据条目推导
        self.conflict_detector
            .check(conn, &catalog.entry.line, &interval, exclude_event_id)?;

        Ok(ResolvedWrite {
            start,
            interval,
            run,
            catalog,
        })
    }
}

fn now_local(normalizer: &TimeNormalizer) -> NaiveDateTime {
    let now = Utc::now()
        .with_timezone(&normalizer.local_offset())
        .naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}

fn record_action(
    conn: &Connection,
    event: &DowntimeEvent,
    action_type: DowntimeActionType,
    resolved: &ResolvedWrite,
    now: NaiveDateTime,
) -> DowntimeResult<()> {
    let detail = format!(
        "run={} ({}), master={} ({}){}",
        resolved.run.run.run_id,
        resolved.run.source,
        resolved.catalog.entry.master_id,
        match_step_label(resolved.catalog.step),
        if resolved.catalog.reclassified { ", 短停改判" } else { "" },
    );

    let log = DowntimeActionLog {
        action_id: Uuid::new_v4().to_string(),
        event_id: event.event_id.clone(),
        action_type,
        action_ts: now,
        payload_json: Some(serde_json::to_value(event).map_err(RepositoryError::from)?),
        detail: Some(detail),
    };
    DowntimeActionLogRepository::insert_in(conn, &log)?;
    Ok(())
}

fn match_step_label(step: CatalogMatchStep) -> &'static str {
    match step {
        CatalogMatchStep::Explicit => "EXPLICIT",
        CatalogMatchStep::TypeAndDetail => "TYPE_AND_DETAIL",
        CatalogMatchStep::TypeOnly => "TYPE_ONLY",
        CatalogMatchStep::BreakdownTypeAndDetail => "BREAKDOWN_TYPE_AND_DETAIL",
        CatalogMatchStep::BreakdownTypeOnly => "BREAKDOWN_TYPE_ONLY",
    }
}

fn log_committed(op: &str, event: &DowntimeEvent, resolved: &ResolvedWrite) {
    tracing::info!(
        op,
        event_id = %event.event_id,
        line = %resolved.catalog.entry.line,
        run_id = %event.run_id,
        run_source = %resolved.run.source,
        master_id = %event.master_id,
        category = resolved.catalog.resolved_category.as_deref().unwrap_or("-"),
        reclassified = resolved.catalog.reclassified,
        start = %resolved.start,
        duration_min = event.duration_min,
        "停机事件已提交"
    );
    if resolved.run.source == RunMatchSource::PlantShiftWindow {
        tracing::debug!(event_id = %event.event_id, "批次经工厂/班次兜底匹配");
    }
}

fn log_rejection(op: &str, event_id: Option<&str>, input: &DowntimeEventInput, err: &DowntimeError) {
    tracing::warn!(
        op,
        event_id = event_id.unwrap_or("-"),
        line = %input.line,
        start = %input.start_time,
        duration_min = input.duration_min,
        error = %err,
        "停机事件写入被拒绝"
    );
}
