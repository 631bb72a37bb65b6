//! Schema 初始化子模块
//!
//! ## 职责
//! - 创建/迁移数据库表结构与索引
//! - 设置 SQLite 运行参数（WAL、外键）
//!
//! ## 错误语义
//! - DDL 失败统一映射为 `AppError::Database`
//!
//! 迁移只做加法：新列一律可空，旧行以 `NULL` 填充即合法。

use rusqlite::Connection;

use crate::error::AppError;

const SCHEMA_VERSION: i64 = 2;

fn get_user_version(conn: &Connection) -> Result<i64, AppError> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| AppError::Database(format!("读取数据库版本失败: {}", e)))
}

fn set_user_version(conn: &Connection, version: i64) -> Result<(), AppError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| AppError::Database(format!("写入数据库版本失败: {}", e)))
}

fn create_history_indexes(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_history_touched ON history(touched_at DESC, id DESC);
         CREATE INDEX IF NOT EXISTS idx_history_fingerprint ON history(fingerprint, touched_at DESC);
         CREATE INDEX IF NOT EXISTS idx_history_favorite_touched ON history(is_favorite, touched_at DESC);",
    )
    .map_err(|e| AppError::Database(format!("创建历史索引失败: {}", e)))
}

fn create_base_tables(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            kind TEXT NOT NULL,
            payload TEXT NOT NULL,
            fingerprint TEXT NOT NULL,
            thumbnail BLOB,
            source_app_name TEXT,
            source_app_icon BLOB,
            created_at INTEGER NOT NULL,
            touched_at INTEGER NOT NULL,
            is_favorite INTEGER NOT NULL DEFAULT 0 CHECK (is_favorite IN (0, 1))
        );",
    )
    .map_err(|e| AppError::Database(format!("创建基础表失败: {}", e)))?;

    create_history_indexes(conn)
}

fn migrate_pinboards(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS pinboards (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_pinboards_name ON pinboards(name);",
    )
    .map_err(|e| AppError::Database(format!("创建钉板表失败: {}", e)))?;

    // 旧行以 NULL 填充；失败即列已存在
    let _ = conn.execute("ALTER TABLE history ADD COLUMN pinboard_id INTEGER", []);

    conn.execute_batch(
        "CREATE INDEX IF NOT EXISTS idx_history_pinboard ON history(pinboard_id);",
    )
    .map_err(|e| AppError::Database(format!("创建钉板索引失败: {}", e)))
}

pub(super) fn initialize_schema(conn: &Connection) -> Result<(), AppError> {
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")
        .ok();

    create_base_tables(conn)?;

    let mut version = get_user_version(conn)?;
    if version < 1 {
        set_user_version(conn, 1)?;
        version = 1;
    }

    if version < 2 {
        migrate_pinboards(conn)?;
        set_user_version(conn, 2)?;
        version = 2;
    }

    if version != SCHEMA_VERSION {
        return Err(AppError::Database(format!(
            "数据库版本不匹配: current={}, expected={}",
            version, SCHEMA_VERSION
        )));
    }

    Ok(())
}
