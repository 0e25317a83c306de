// ==========================================
// 产线停机核心 - 时间冲突检测
// ==========================================
// 半开区间 [start, end)：existing.start < end 且 existing.end > start
// 首尾相接不冲突；更新时排除被替换的事件本身
// 必须与随后的写入处于同一 IMMEDIATE 事务（见 DowntimeEventWriter）
// ==========================================

use crate::domain::downtime_event::compute_end_time;
use crate::domain::types::LOCAL_MINUTE_FORMAT;
use crate::engine::error::{DowntimeError, DowntimeResult};
use crate::repository::DowntimeEventRepository;
use chrono::NaiveDateTime;
use rusqlite::Connection;

/// 待检测区间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CandidateInterval {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl CandidateInterval {
    /// 由开始时间与时长构造；时长非正或结束时间不可存储时 InvalidDuration
    pub fn from_duration(start: NaiveDateTime, duration_min: i64) -> DowntimeResult<Self> {
        let end = if duration_min > 0 {
            compute_end_time(&start, duration_min)
        } else {
            None
        };
        end.map(|end| Self { start, end })
            .ok_or(DowntimeError::InvalidDuration { duration_min })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConflictDetector;

impl ConflictDetector {
    pub fn new() -> Self {
        Self
    }

    /// 检测同一产线上的重叠事件
    ///
    /// # 返回
    /// - Ok(()): 无冲突
    /// - Err(DowntimeOverlap): 携带第一条冲突事件
    pub fn check(
        &self,
        conn: &Connection,
        line: &str,
        interval: &CandidateInterval,
        exclude_event_id: Option<&str>,
    ) -> DowntimeResult<()> {
        let conflict = DowntimeEventRepository::find_overlapping_on_line_in(
            conn,
            line,
            &interval.start,
            &interval.end,
            exclude_event_id,
        )?;

        match conflict {
            None => Ok(()),
            Some(existing) => {
                tracing::warn!(
                    line,
                    conflicting_event_id = %existing.event_id,
                    candidate_start = %interval.start,
                    candidate_end = %interval.end,
                    "停机时间重叠"
                );
                Err(DowntimeError::DowntimeOverlap {
                    conflicting_event_id: existing.event_id,
                    conflicting_start: existing.start_time.format(LOCAL_MINUTE_FORMAT).to_string(),
                    conflicting_end: existing.end_time.format(LOCAL_MINUTE_FORMAT).to_string(),
                })
            }
        }
    }
}
