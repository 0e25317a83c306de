// ==========================================
// 产线停机核心 - 生产批次解析器
// ==========================================
// 优先级: EXPLICIT -> LINE_WINDOW -> PLANT_SHIFT_WINDOW -> RunNotFound
// 红线: Engine 不拼 SQL，查询委托 ProductionRunRepository
// ==========================================

use crate::domain::downtime_event::non_blank;
use crate::domain::production_run::ProductionRun;
use crate::domain::types::RunMatchSource;
use crate::engine::error::{DowntimeError, DowntimeResult};
use crate::repository::ProductionRunRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;

/// 批次解析请求
#[derive(Debug, Clone, Default)]
pub struct RunQuery<'a> {
    pub run_id: Option<&'a str>,
    pub line: Option<&'a str>,
    pub plant: Option<&'a str>,
    pub shift: Option<&'a str>,
}

/// 批次解析结果
#[derive(Debug, Clone)]
pub struct ResolvedRun {
    pub run: ProductionRun,
    pub source: RunMatchSource,
}

/// RunResolver - 生产批次解析器（无状态，在调用方给出的连接/事务上执行）
#[derive(Debug, Clone, Copy, Default)]
pub struct RunResolver;

impl RunResolver {
    pub fn new() -> Self {
        Self
    }

    /// 解析事件所属生产批次
    ///
    /// - 显式 run_id: 短路返回（仍校验存在）
    /// - 主策略: 该产线上时间窗包含 ts 的最近开始批次
    /// - 兜底: 主策略落空且给出 plant + shift 时，按 (plant, line, shift) 同规则查询
    pub fn resolve(
        &self,
        conn: &Connection,
        query: &RunQuery<'_>,
        ts: &NaiveDateTime,
    ) -> DowntimeResult<ResolvedRun> {
        if let Some(run_id) = non_blank(query.run_id) {
            return ProductionRunRepository::find_by_id_in(conn, run_id)?
                .map(|run| ResolvedRun {
                    run,
                    source: RunMatchSource::Explicit,
                })
                .ok_or_else(|| DowntimeError::RunNotFound {
                    context: format!("run_id={}", run_id),
                });
        }

        let line = non_blank(query.line).ok_or(DowntimeError::MissingSelector { field: "line" })?;

        if let Some(run) = ProductionRunRepository::find_containing_on_line(conn, line, ts)? {
            tracing::debug!(line, run_id = %run.run_id, at = %ts, "批次命中: 产线时间窗");
            return Ok(ResolvedRun {
                run,
                source: RunMatchSource::LineWindow,
            });
        }

        if let (Some(plant), Some(shift)) = (non_blank(query.plant), non_blank(query.shift)) {
            if let Some(run) =
                ProductionRunRepository::find_containing_by_plant_shift(conn, plant, line, shift, ts)?
            {
                tracing::debug!(plant, line, shift, run_id = %run.run_id, at = %ts, "批次命中: 工厂/班次兜底");
                return Ok(ResolvedRun {
                    run,
                    source: RunMatchSource::PlantShiftWindow,
                });
            }
        }

        Err(DowntimeError::RunNotFound {
            context: format!(
                "line={}, plant={}, shift={}, at={}",
                line,
                non_blank(query.plant).unwrap_or("-"),
                non_blank(query.shift).unwrap_or("-"),
                ts.format("%Y-%m-%d %H:%M")
            ),
        })
    }
}
