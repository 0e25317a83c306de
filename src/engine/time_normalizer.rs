// ==========================================
// 产线停机核心 - 时间归一化
// ==========================================
// 规则:
// 1. 带 UTC/数值偏移 -> 换算到本地参考时区（默认 UTC+7）
// 2. 不带偏移 -> 视为本地墙钟时间，原样保留（仅重新格式化）
// 3. 以上皆不匹配 -> 宽松解析兜底，仍失败则 InvalidTimestamp
// 输出恒为本地无时区、分钟精度；秒及以下截断
// 年份限定 1..=9999（四位年份的文本序即时间序）
// ==========================================

use crate::domain::downtime_event::MAX_STORABLE_YEAR;
use crate::domain::types::LOCAL_MINUTE_FORMAT;
use crate::engine::error::{DowntimeError, DowntimeResult};
use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M%:z",
    "%Y-%m-%d %H:%M%:z",
    "%Y-%m-%dT%H:%M:%S%.f%#z",
    "%Y-%m-%d %H:%M:%S%.f%#z",
    "%Y-%m-%dT%H:%M%#z",
    "%Y-%m-%d %H:%M%#z",
];

const LOCAL_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

// 宽松兜底（无偏移，按本地处理）
const PERMISSIVE_FORMATS: &[&str] = &[
    "%Y/%m/%d %H:%M:%S",
    "%Y/%m/%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
    "%Y%m%d%H%M%S",
    "%Y%m%d%H%M",
];

const PERMISSIVE_DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y"];

/// 时间来源（用于日志/排查）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimeSource {
    Offset,     // 带时区信息，已换算
    Local,      // 本地墙钟
    Permissive, // 宽松兜底
}

/// 归一化结果: 本地无时区、分钟精度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NormalizedTime {
    pub local: NaiveDateTime,
    pub source: TimeSource,
}

impl NormalizedTime {
    pub fn to_local_string(&self) -> String {
        self.local.format(LOCAL_MINUTE_FORMAT).to_string()
    }
}

impl fmt::Display for NormalizedTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_local_string())
    }
}

// ==========================================
// TimeNormalizer
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct TimeNormalizer {
    local_offset: FixedOffset,
}

impl TimeNormalizer {
    pub fn new(local_offset: FixedOffset) -> Self {
        Self { local_offset }
    }

    pub fn local_offset(&self) -> FixedOffset {
        self.local_offset
    }

    /// 归一化时间文本
    pub fn normalize(&self, input: &str) -> DowntimeResult<NormalizedTime> {
        let invalid = || DowntimeError::InvalidTimestamp {
            input: input.to_string(),
        };

        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (local, source) = self
            .parse_with_offset(trimmed)
            .map(|ts| (ts, TimeSource::Offset))
            .or_else(|| parse_local(trimmed).map(|ts| (ts, TimeSource::Local)))
            .or_else(|| self.parse_permissive(trimmed).map(|ts| (ts, TimeSource::Permissive)))
            .ok_or_else(invalid)?;

        let local = truncate_to_minute(local)
            .filter(|ts| (1..=MAX_STORABLE_YEAR).contains(&ts.year()))
            .ok_or_else(invalid)?;
        tracing::trace!(input = %trimmed, ?source, normalized = %local, "时间已归一化");

        Ok(NormalizedTime { local, source })
    }

    fn parse_with_offset(&self, input: &str) -> Option<NaiveDateTime> {
        let candidate = expand_utc_designator(input);

        DateTime::parse_from_rfc3339(&candidate)
            .ok()
            .or_else(|| {
                OFFSET_FORMATS
                    .iter()
                    .find_map(|fmt| DateTime::parse_from_str(&candidate, fmt).ok())
            })
            .map(|dt| self.to_local(dt))
    }

    fn parse_permissive(&self, input: &str) -> Option<NaiveDateTime> {
        if let Ok(dt) = DateTime::parse_from_rfc2822(input) {
            return Some(self.to_local(dt));
        }

        PERMISSIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
            .or_else(|| {
                PERMISSIVE_DATE_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDate::parse_from_str(input, fmt).ok())
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
            })
    }

    fn to_local(&self, dt: DateTime<FixedOffset>) -> NaiveDateTime {
        dt.with_timezone(&self.local_offset).naive_local()
    }
}

fn parse_local(input: &str) -> Option<NaiveDateTime> {
    LOCAL_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
}

/// 尾部 "Z" / " UTC" / " GMT" 统一展开为 "+00:00"
fn expand_utc_designator(input: &str) -> String {
    for suffix in [" UTC", " GMT", "UTC", "Z", "z"] {
        if let Some(head) = input.strip_suffix(suffix) {
            if head.chars().last().map_or(false, |c| c.is_ascii_digit()) {
                return format!("{}+00:00", head.trim_end());
            }
        }
    }
    input.to_string()
}

fn truncate_to_minute(ts: NaiveDateTime) -> Option<NaiveDateTime> {
    let time = NaiveTime::from_hms_opt(ts.hour(), ts.minute(), 0)?;
    Some(ts.date().and_time(time))
}
