// ==========================================
// 产线停机核心 - 生产批次仓储（只读）
// ==========================================
// 红线: Repository 不含业务逻辑
// 生产批次由外部流程维护；insert 仅供种子数据/测试夹具使用
// ==========================================

use crate::db::SharedConnection;
use crate::domain::production_run::ProductionRun;
use crate::domain::types::{parse_db_datetime, to_db_datetime};
use crate::repository::error::{invalid_datetime, RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str = "run_id, plant, line, shift, start_time, end_time";

// ==========================================
// ProductionRunRepository - 生产批次仓储
// ==========================================
pub struct ProductionRunRepository {
    conn: SharedConnection,
}

impl ProductionRunRepository {
    /// 从共享连接创建仓储实例
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按 run_id 查询
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<ProductionRun>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, run_id)
    }

    /// 写入批次（种子数据/测试夹具）
    pub fn insert(&self, run: &ProductionRun) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_in(&conn, run)
    }

    // ==========================================
    // 事务内查询
    // ==========================================

    pub fn find_by_id_in(conn: &Connection, run_id: &str) -> RepositoryResult<Option<ProductionRun>> {
        let sql = format!("SELECT {} FROM production_run WHERE run_id = ?1", SELECT_COLUMNS);
        let run = conn
            .query_row(&sql, params![run_id], map_row)
            .optional()?;
        Ok(run)
    }

    /// 查询产线上包含时间点 ts 的最近开始批次
    ///
    /// 包含规则: start_time <= ts 且 (end_time IS NULL 或 end_time >= ts)
    /// 并列时取 start_time 最大者
    /// 产线按去空白、忽略大小写比较（与主数据、重叠查询一致）
    pub fn find_containing_on_line(
        conn: &Connection,
        line: &str,
        ts: &NaiveDateTime,
    ) -> RepositoryResult<Option<ProductionRun>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM production_run
            WHERE UPPER(TRIM(line)) = UPPER(TRIM(?1))
              AND start_time <= ?2
              AND (end_time IS NULL OR end_time >= ?2)
            ORDER BY start_time DESC, run_id DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS
        );
        let run = conn
            .query_row(&sql, params![line, to_db_datetime(ts)], map_row)
            .optional()?;
        Ok(run)
    }

    /// 兜底: 按 (plant, line, shift) 查询包含 ts 的最近开始批次
    ///
    /// plant/shift 按去空白、忽略大小写比较；产线再忽略空格、'-'、'_'
    /// （如 "LINE_A" 与 "line-a"），由 plant + shift 收窄范围
    pub fn find_containing_by_plant_shift(
        conn: &Connection,
        plant: &str,
        line: &str,
        shift: &str,
        ts: &NaiveDateTime,
    ) -> RepositoryResult<Option<ProductionRun>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM production_run
            WHERE UPPER(TRIM(plant)) = UPPER(TRIM(?1))
              AND {line_key} = {arg_key}
              AND UPPER(TRIM(shift)) = UPPER(TRIM(?3))
              AND start_time <= ?4
              AND (end_time IS NULL OR end_time >= ?4)
            ORDER BY start_time DESC, run_id DESC
            LIMIT 1
            "#,
            SELECT_COLUMNS,
            line_key = loose_line_key("line"),
            arg_key = loose_line_key("?2"),
        );
        let run = conn
            .query_row(&sql, params![plant, line, shift, to_db_datetime(ts)], map_row)
            .optional()?;
        Ok(run)
    }

    pub fn insert_in(conn: &Connection, run: &ProductionRun) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO production_run (run_id, plant, line, shift, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                run.run_id,
                run.plant,
                run.line,
                run.shift,
                to_db_datetime(&run.start_time),
                run.end_time.as_ref().map(to_db_datetime),
            ],
        )?;
        Ok(())
    }
}

/// 去掉空格与 '-'、'_' 后大写的产线比较键
fn loose_line_key(expr: &str) -> String {
    format!(
        "REPLACE(REPLACE(REPLACE(UPPER({}), ' ', ''), '-', ''), '_', '')",
        expr
    )
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<ProductionRun> {
    let start_raw: String = row.get(4)?;
    let end_raw: Option<String> = row.get(5)?;

    let start_time = parse_db_datetime(&start_raw).ok_or_else(|| invalid_datetime(4, &start_raw))?;
    let end_time = match end_raw {
        Some(raw) => Some(parse_db_datetime(&raw).ok_or_else(|| invalid_datetime(5, &raw))?),
        None => None,
    };

    Ok(ProductionRun {
        run_id: row.get(0)?,
        plant: row.get(1)?,
        line: row.get(2)?,
        shift: row.get(3)?,
        start_time,
        end_time,
    })
}
