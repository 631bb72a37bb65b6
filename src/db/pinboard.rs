//! 钉板管理子模块
//!
//! ## 职责
//! - 提供钉板的增删改查能力
//! - 删除钉板时将其下条目的归属清为 `NULL`（条目本身保留）
//!
//! ## 错误语义
//! - 钉板查询与写入失败统一映射为 `AppError::Database`

use rusqlite::{params, Connection};

use crate::error::AppError;

use super::{Ledger, Pinboard};

fn list_pinboards(conn: &Connection) -> Result<Vec<Pinboard>, AppError> {
    let mut stmt = conn
        .prepare("SELECT id, name, created_at FROM pinboards ORDER BY name ASC")
        .map_err(|e| AppError::Database(format!("准备查询失败: {}", e)))?;

    let pinboards = stmt
        .query_map([], |row| {
            Ok(Pinboard {
                id: row.get(0)?,
                name: row.get(1)?,
                created_at: row.get(2)?,
            })
        })
        .map_err(|e| AppError::Database(format!("查询钉板失败: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))?;

    Ok(pinboards)
}

fn create_pinboard(conn: &Connection, name: String) -> Result<Pinboard, AppError> {
    let now = chrono::Utc::now().timestamp_millis();
    conn.execute(
        "INSERT INTO pinboards (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )
    .map_err(|e| AppError::Database(format!("创建钉板失败: {}", e)))?;

    let id = conn.last_insert_rowid();
    Ok(Pinboard {
        id,
        name,
        created_at: now,
    })
}

fn rename_pinboard(conn: &Connection, id: i64, name: String) -> Result<(), AppError> {
    conn.execute(
        "UPDATE pinboards SET name = ?1 WHERE id = ?2",
        params![name, id],
    )
    .map_err(|e| AppError::Database(format!("重命名钉板失败: {}", e)))?;
    Ok(())
}

fn delete_pinboard(conn: &Connection, id: i64) -> Result<(), AppError> {
    // 先解除条目归属，条目本身保留在历史中
    conn.execute(
        "UPDATE history SET pinboard_id = NULL WHERE pinboard_id = ?1",
        params![id],
    )
    .map_err(|e| AppError::Database(format!("解除钉板归属失败: {}", e)))?;

    conn.execute("DELETE FROM pinboards WHERE id = ?1", params![id])
        .map_err(|e| AppError::Database(format!("删除钉板失败: {}", e)))?;
    Ok(())
}

impl Ledger {
    pub fn list_pinboards(&self) -> Result<Vec<Pinboard>, AppError> {
        self.with_conn(list_pinboards)
    }

    pub fn create_pinboard(&self, name: String) -> Result<Pinboard, AppError> {
        self.with_conn(|conn| create_pinboard(conn, name))
    }

    pub fn rename_pinboard(&self, id: i64, name: String) -> Result<(), AppError> {
        self.with_conn(|conn| rename_pinboard(conn, id, name))
    }

    pub fn delete_pinboard(&self, id: i64) -> Result<(), AppError> {
        self.with_conn(|conn| delete_pinboard(conn, id))
    }
}
