// ==========================================
// 产线停机核心 - 停机原因主数据仓储（只读）
// ==========================================
// 红线: Repository 不含业务逻辑（匹配策略在 CatalogResolver）
// ==========================================

use crate::config::normalize_category;
use crate::db::SharedConnection;
use crate::domain::downtime_master::DowntimeMasterEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};

const SELECT_COLUMNS: &str =
    "master_id, line, category, type_label, detail, display_name, color, sort_order";

// ==========================================
// DowntimeMasterRepository - 停机主数据仓储
// ==========================================
pub struct DowntimeMasterRepository {
    conn: SharedConnection,
}

impl DowntimeMasterRepository {
    pub fn new(conn: SharedConnection) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn find_by_id(&self, master_id: &str) -> RepositoryResult<Option<DowntimeMasterEntry>> {
        let conn = self.get_conn()?;
        Self::find_by_id_in(&conn, master_id)
    }

    /// 写入主数据（种子数据/测试夹具）
    pub fn insert(&self, entry: &DowntimeMasterEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::insert_in(&conn, entry)
    }

    // ==========================================
    // 事务内查询
    // ==========================================

    pub fn find_by_id_in(
        conn: &Connection,
        master_id: &str,
    ) -> RepositoryResult<Option<DowntimeMasterEntry>> {
        let sql = format!("SELECT {} FROM downtime_master WHERE master_id = ?1", SELECT_COLUMNS);
        let entry = conn
            .query_row(&sql, params![master_id], map_row)
            .optional()?;
        Ok(entry)
    }

    /// 按产线 + 分类取候选集
    ///
    /// - 产线: 去空白、忽略大小写（SQL 侧）
    /// - 分类: 两侧均经 normalize_category（下划线、连续空白折叠），在 Rust 侧过滤
    /// - 顺序: sort_order（空值最后）, master_id；“取第一条”依赖此顺序
    pub fn list_by_line_and_category_in(
        conn: &Connection,
        line: &str,
        normalized_category: &str,
    ) -> RepositoryResult<Vec<DowntimeMasterEntry>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM downtime_master
            WHERE UPPER(TRIM(line)) = UPPER(TRIM(?1))
            ORDER BY sort_order IS NULL, sort_order ASC, master_id ASC
            "#,
            SELECT_COLUMNS
        );
        let wanted = normalize_category(normalized_category);
        let mut stmt = conn.prepare(&sql)?;
        let entries = stmt
            .query_map(params![line], map_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries
            .into_iter()
            .filter(|entry| normalize_category(&entry.category) == wanted)
            .collect())
    }

    pub fn insert_in(conn: &Connection, entry: &DowntimeMasterEntry) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO downtime_master (
                master_id, line, category, type_label, detail,
                display_name, color, sort_order
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                entry.master_id,
                entry.line,
                entry.category,
                entry.type_label,
                entry.detail,
                entry.display_name,
                entry.color,
                entry.sort_order,
            ],
        )?;
        Ok(())
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<DowntimeMasterEntry> {
    Ok(DowntimeMasterEntry {
        master_id: row.get(0)?,
        line: row.get(1)?,
        category: row.get(2)?,
        type_label: row.get(3)?,
        detail: row.get(4)?,
        display_name: row.get(5)?,
        color: row.get(6)?,
        sort_order: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{configure_sqlite_connection, ensure_schema};
    use std::sync::{Arc, Mutex};

    fn setup_test_db() -> SharedConnection {
        let conn = Connection::open_in_memory().unwrap();
        configure_sqlite_connection(&conn).unwrap();
        ensure_schema(&conn).unwrap();
        Arc::new(Mutex::new(conn))
    }

    fn make_entry(id: &str, category: &str, type_label: &str, sort_order: Option<i64>) -> DowntimeMasterEntry {
        DowntimeMasterEntry {
            master_id: id.to_string(),
            line: "LINE A".to_string(),
            category: category.to_string(),
            type_label: type_label.to_string(),
            detail: None,
            display_name: None,
            color: None,
            sort_order,
        }
    }

    fn lookup(conn: &SharedConnection, line: &str, category: &str) -> Vec<String> {
        let guard = conn.lock().unwrap();
        DowntimeMasterRepository::list_by_line_and_category_in(&guard, line, category)
            .unwrap()
            .into_iter()
            .map(|e| e.master_id)
            .collect()
    }

    #[test]
    fn test_category_lookup_is_normalized() {
        let conn = setup_test_db();
        let repo = DowntimeMasterRepository::new(conn.clone());
        repo.insert(&make_entry("M1", "Minor Stop", "ELECTRICAL", None)).unwrap();
        repo.insert(&make_entry("M2", "minor_stop", "MECHANICAL", None)).unwrap();
        repo.insert(&make_entry("M3", "Breakdown", "ELECTRICAL", None)).unwrap();
        // 历史录入的内部连续空白
        repo.insert(&make_entry("M4", " Minor  Stop ", "JAM", None)).unwrap();

        assert_eq!(lookup(&conn, "line a", "MINOR STOP"), vec!["M1", "M2", "M4"]);
        assert_eq!(lookup(&conn, "LINE A", "minor   stop"), vec!["M1", "M2", "M4"]);
    }

    #[test]
    fn test_sort_order_precedes_id() {
        let conn = setup_test_db();
        let repo = DowntimeMasterRepository::new(conn.clone());
        repo.insert(&make_entry("M1", "Breakdown", "A", None)).unwrap();
        repo.insert(&make_entry("M2", "Breakdown", "B", Some(2))).unwrap();
        repo.insert(&make_entry("M3", "Breakdown", "C", Some(1))).unwrap();

        assert_eq!(lookup(&conn, "LINE A", "BREAKDOWN"), vec!["M3", "M2", "M1"]);
    }

    #[test]
    fn test_find_by_id() {
        let repo = DowntimeMasterRepository::new(setup_test_db());
        repo.insert(&make_entry("M1", "Breakdown", "HYDRAULIC", None)).unwrap();

        assert_eq!(repo.find_by_id("M1").unwrap().map(|e| e.type_label), Some("HYDRAULIC".to_string()));
        assert!(repo.find_by_id("M9").unwrap().is_none());
    }
}
