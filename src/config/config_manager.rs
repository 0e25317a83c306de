// ==========================================
// 产线停机核心 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// 缺省/格式错误时回退默认值，格式错误记 warn
// ==========================================

use crate::db::SharedConnection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{FixedOffset, Offset, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 配置键
pub mod config_keys {
    pub const LOCAL_UTC_OFFSET_MINUTES: &str = "downtime.local_utc_offset_minutes";
    pub const MINOR_STOP_THRESHOLD_MIN: &str = "downtime.minor_stop_threshold_min";
    pub const TYPE_SEPARATOR: &str = "downtime.type_separator";
    pub const BREAKDOWN_CATEGORY: &str = "downtime.breakdown_category";
    pub const MINOR_STOP_CATEGORY: &str = "downtime.minor_stop_category";
}

const GLOBAL_SCOPE: &str = "global";

// ==========================================
// DowntimeRules - 解析规则快照
// ==========================================
// 一次加载，不可变，注入各解析器
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DowntimeRules {
    /// 本地参考时区偏移（分钟），默认 UTC+7
    pub local_utc_offset_minutes: i32,
    /// 短停阈值（分钟）：0 < duration < 阈值 的 Breakdown 改判为 Minor Stop
    pub minor_stop_threshold_min: i64,
    /// 类型字段分隔符（历史数据 "前缀 - 后缀"）
    pub type_separator: char,
    /// 归一化后的 Breakdown 分类名
    pub breakdown_category: String,
    /// 归一化后的 Minor Stop 分类名
    pub minor_stop_category: String,
}

impl Default for DowntimeRules {
    fn default() -> Self {
        Self {
            local_utc_offset_minutes: 7 * 60,
            minor_stop_threshold_min: 10,
            type_separator: '-',
            breakdown_category: "BREAKDOWN".to_string(),
            minor_stop_category: "MINOR STOP".to_string(),
        }
    }
}

impl DowntimeRules {
    /// 本地参考时区
    ///
    /// 偏移超出 ±24h 时回退 UTC+7
    pub fn local_offset(&self) -> FixedOffset {
        self.local_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(
                    offset_minutes = self.local_utc_offset_minutes,
                    "本地时区偏移非法，回退 UTC+7"
                );
                FixedOffset::east_opt(7 * 3600).unwrap_or_else(|| Utc.fix())
            })
    }
}

/// 分类文本归一化: 去空白、大写、下划线与连续空白折叠为单个空格
pub fn normalize_category(raw: &str) -> String {
    raw.trim()
        .to_uppercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 从共享连接创建 ConfigManager
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入（覆盖）global scope 的配置值
    pub fn set_global_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        Ok(())
    }

    /// 读取全部 global 配置
    pub fn get_all_global(&self) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            map.insert(key, value);
        }
        Ok(map)
    }

    /// 加载停机解析规则快照
    pub fn load_rules(&self) -> RepositoryResult<DowntimeRules> {
        let values = self.get_all_global()?;
        let defaults = DowntimeRules::default();

        let local_utc_offset_minutes = parse_or_default(
            &values,
            config_keys::LOCAL_UTC_OFFSET_MINUTES,
            defaults.local_utc_offset_minutes,
            |v| v.parse::<i32>().ok().filter(|m| m.abs() < 24 * 60),
        );

        let minor_stop_threshold_min = parse_or_default(
            &values,
            config_keys::MINOR_STOP_THRESHOLD_MIN,
            defaults.minor_stop_threshold_min,
            |v| v.parse::<i64>().ok().filter(|m| *m >= 0),
        );

        let type_separator = parse_or_default(
            &values,
            config_keys::TYPE_SEPARATOR,
            defaults.type_separator,
            |v| {
                let mut chars = v.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) if !c.is_whitespace() => Some(c),
                    _ => None,
                }
            },
        );

        let breakdown_category = parse_or_default(
            &values,
            config_keys::BREAKDOWN_CATEGORY,
            defaults.breakdown_category,
            |v| Some(normalize_category(v)).filter(|c| !c.is_empty()),
        );

        let minor_stop_category = parse_or_default(
            &values,
            config_keys::MINOR_STOP_CATEGORY,
            defaults.minor_stop_category,
            |v| Some(normalize_category(v)).filter(|c| !c.is_empty()),
        );

        let rules = DowntimeRules {
            local_utc_offset_minutes,
            minor_stop_threshold_min,
            type_separator,
            breakdown_category,
            minor_stop_category,
        };
        tracing::debug!(?rules, "停机解析规则已加载");
        Ok(rules)
    }
}

fn parse_or_default<T>(
    values: &HashMap<String, String>,
    key: &str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> T {
    match values.get(key) {
        None => default,
        Some(raw) => match parse(raw.trim()) {
            Some(v) => v,
            None => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                default
            }
        },
    }
}
