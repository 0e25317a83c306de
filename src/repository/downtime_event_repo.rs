// ==========================================
// 产线停机核心 - 停机事件仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 写入路径只在 DowntimeEventWriter 的事务内调用 *_in 函数
// ==========================================

use crate::db::SharedConnection;
use crate::domain::downtime_event::DowntimeEvent;
use crate::domain::types::{parse_db_datetime, to_db_datetime};
use crate::repository::error::{invalid_datetime, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "e.event_id, e.run_id, e.master_id, e.start_time, e.end_time, \
     e.duration_min, e.machine_id, e.note, e.created_at, e.updated_at";

// ==========================================
// DowntimeEventRepository - 停机事件仓储
// ==========================================
pub struct DowntimeEventRepository {
    conn: SharedConnection,
}

impl DowntimeEventRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, event_id: &str) -> RepositoryResult<Option<DowntimeEvent>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, event_id)
    }

    /// 查询某生产批次下的全部事件（按开始时间升序）
    pub fn list_by_run(&self, run_id: &str) -> RepositoryResult<Vec<DowntimeEvent>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM downtime_event e WHERE e.run_id = ?1 ORDER BY e.start_time ASC, e.event_id ASC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let events = stmt
            .query_map(params![run_id], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(events)
    }

    /// 统计事件总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM downtime_event", [], |row| row.get(0))?;
        Ok(n)
    }

    // ==========================================
    // 事务内操作
    // ==========================================

    pub fn find_by_id_in(conn: &Connection, event_id: &str) -> RepositoryResult<Option<DowntimeEvent>> {
        let sql = format!(
            "SELECT {} FROM downtime_event e WHERE e.event_id = ?1",
            SELECT_COLUMNS
        );
        let event = conn
            .query_row(&sql, params![event_id], map_row)
            .optional()?;
        Ok(event)
    }

    /// 查询同一产线上与 [start, end) 相交的第一条事件
    ///
    /// - 产线经事件的主数据条目推导
    /// - 半开区间: existing.start < end 且 existing.end > start，首尾相接不算冲突
    /// - exclude_event_id: 更新时排除被替换的事件本身
    pub fn find_overlapping_on_line_in(
        conn: &Connection,
        line: &str,
        start: &NaiveDateTime,
        end: &NaiveDateTime,
        exclude_event_id: Option<&str>,
    ) -> RepositoryResult<Option<DowntimeEvent>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM downtime_event e
            JOIN downtime_master m ON m.master_id = e.master_id
            WHERE UPPER(TRIM(m.line)) = UPPER(TRIM(?1))
              AND e.start_time < ?3
              AND e.end_time > ?2
              AND (?4 IS NULL OR e.event_id <> ?4)
            ORDER BY e.start_time ASC, e.event_id ASC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        let event = conn
            .query_row(
                &sql,
                params![line, to_db_datetime(start), to_db_datetime(end), exclude_event_id],
                map_row,
            )
            .optional()?;
        Ok(event)
    }

    pub fn insert_in(conn: &Connection, event: &DowntimeEvent) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO downtime_event (
                event_id, run_id, master_id, start_time, end_time,
                duration_min, machine_id, note, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                event.event_id,
                event.run_id,
                event.master_id,
                to_db_datetime(&event.start_time),
                to_db_datetime(&event.end_time),
                event.duration_min,
                event.machine_id,
                event.note,
                to_db_datetime(&event.created_at),
                to_db_datetime(&event.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 整体替换派生字段（run/master/时间）及附加信息，created_at 保持不变
    ///
    /// # 返回
    /// - Ok(usize): 受影响行数（0 表示事件不存在）
    pub fn replace_in(conn: &Connection, event: &DowntimeEvent) -> RepositoryResult<usize> {
        let affected = conn.execute(
            r#"
            UPDATE downtime_event
            SET run_id = ?2,
                master_id = ?3,
                start_time = ?4,
                end_time = ?5,
                duration_min = ?6,
                machine_id = ?7,
                note = ?8,
                updated_at = ?9
            WHERE event_id = ?1
            "#,
            params![
                event.event_id,
                event.run_id,
                event.master_id,
                to_db_datetime(&event.start_time),
                to_db_datetime(&event.end_time),
                event.duration_min,
                event.machine_id,
                event.note,
                to_db_datetime(&event.updated_at),
            ],
        )?;
        Ok(affected)
    }

    /// # 返回
    /// - Ok(usize): 受影响行数（0 表示事件不存在）
    pub fn delete_in(conn: &Connection, event_id: &str) -> RepositoryResult<usize> {
        let affected = conn.execute(
            "DELETE FROM downtime_event WHERE event_id = ?1",
            params![event_id],
        )?;
        Ok(affected)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<DowntimeEvent> {
    let parse_at = |idx: usize| -> rusqlite::Result<NaiveDateTime> {
        let raw: String = row.get(idx)?;
        parse_db_datetime(&raw).ok_or_else(|| invalid_datetime(idx, &raw))
    };

    Ok(DowntimeEvent {
        event_id: row.get(0)?,
        run_id: row.get(1)?,
        master_id: row.get(2)?,
        start_time: parse_at(3)?,
        end_time: parse_at(4)?,
        duration_min: row.get(5)?,
        machine_id: row.get(6)?,
        note: row.get(7)?,
        created_at: parse_at(8)?,
        updated_at: parse_at(9)?,
    })
}
