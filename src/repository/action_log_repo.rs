// ==========================================
// 产线停机核心 - 停机操作日志仓储
// ==========================================
// 红线: 审计记录与业务写入同事务，回滚时一并撤销
// ==========================================

use crate::db::SharedConnection;
use crate::domain::action_log::DowntimeActionLog;
use crate::domain::types::{parse_db_datetime, to_db_datetime, DowntimeActionType};
use crate::repository::error::{invalid_datetime, RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, Row};

pub struct DowntimeActionLogRepository {
    conn: SharedConnection,
}

impl DowntimeActionLogRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按事件查询审计记录（按时间升序）
    pub fn list_by_event(&self, event_id: &str) -> RepositoryResult<Vec<DowntimeActionLog>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT action_id, event_id, action_type, action_ts, payload_json, detail
            FROM downtime_action_log
            WHERE event_id = ?1
            ORDER BY action_ts ASC, rowid ASC
            "#,
        )?;
        let logs = stmt
            .query_map(params![event_id], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    pub fn insert_in(conn: &Connection, log: &DowntimeActionLog) -> RepositoryResult<()> {
        let payload = match &log.payload_json {
            Some(v) => Some(serde_json::to_string(v)?),
            None => None,
        };

        conn.execute(
            r#"
            INSERT INTO downtime_action_log (
                action_id, event_id, action_type, action_ts, payload_json, detail
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                log.action_id,
                log.event_id,
                log.action_type.to_db_str(),
                to_db_datetime(&log.action_ts),
                payload,
                log.detail,
            ],
        )?;
        Ok(())
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<DowntimeActionLog> {
    let type_raw: String = row.get(2)?;
    let action_type = DowntimeActionType::from_db_str(&type_raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            2,
            rusqlite::types::Type::Text,
            format!("未知操作类型: {}", type_raw).into(),
        )
    })?;

    let ts_raw: String = row.get(3)?;
    let action_ts = parse_db_datetime(&ts_raw).ok_or_else(|| invalid_datetime(3, &ts_raw))?;

    let payload_json = row
        .get::<_, Option<String>>(4)?
        .and_then(|s| serde_json::from_str(&s).ok());

    Ok(DowntimeActionLog {
        action_id: row.get(0)?,
        event_id: row.get(1)?,
        action_type,
        action_ts,
        payload_json,
        detail: row.get(5)?,
    })
}
