// ==========================================
// 产线停机核心 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键/busy_timeout）
// - busy_timeout 即语句超时：任何步骤都不会无限阻塞
// - 建表幂等，进程启动时显式调用
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 共享存储客户端（显式创建、显式注入）
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表，并包装为共享存储客户端
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 幂等建表
///
/// production_run / downtime_master 由外部流程维护，这里只保证表结构存在。
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS production_run (
            run_id TEXT PRIMARY KEY,
            plant TEXT NOT NULL,
            line TEXT NOT NULL,
            shift TEXT NOT NULL,
            start_time TEXT NOT NULL,
            end_time TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_production_run_line_start
            ON production_run(line, start_time);

        CREATE TABLE IF NOT EXISTS downtime_master (
            master_id TEXT PRIMARY KEY,
            line TEXT NOT NULL,
            category TEXT NOT NULL,
            type_label TEXT NOT NULL,
            detail TEXT,
            display_name TEXT,
            color TEXT,
            sort_order INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_downtime_master_line_category
            ON downtime_master(line, category);

        CREATE TABLE IF NOT EXISTS downtime_event (
            event_id TEXT PRIMARY KEY,
            run_id TEXT NOT NULL REFERENCES production_run(run_id),
            master_id TEXT NOT NULL REFERENCES downtime_master(master_id),
            start_time TEXT NOT NULL,
            end_time TEXT NOT NULL,
            duration_min INTEGER NOT NULL,
            machine_id TEXT,
            note TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_downtime_event_master_time
            ON downtime_event(master_id, start_time, end_time);

        CREATE INDEX IF NOT EXISTS idx_downtime_event_run
            ON downtime_event(run_id);

        CREATE TABLE IF NOT EXISTS downtime_action_log (
            action_id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            payload_json TEXT,
            detail TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_downtime_action_log_event
            ON downtime_action_log(event_id, action_ts);
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 默认数据库路径
///
/// 优先级: 环境变量 LINE_DOWNTIME_DB_PATH -> 用户数据目录 -> 当前目录
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("LINE_DOWNTIME_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./line_downtime.db");

    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("line-downtime");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("line_downtime.db");
        } else {
            tracing::warn!("无法创建数据目录，使用当前目录: {}", dir.display());
        }
    }

    path.to_string_lossy().to_string()
}
