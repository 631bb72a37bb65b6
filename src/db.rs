//! 历史账本模块
//!
//! # 设计思路
//!
//! 所有持久化条目集中在单张 `history` 表中，由 `Ledger` 统一管控。
//! 全部变更都按 `id` 寻址，不存在按位置的变更 API——这是并发
//! 缩略图回写下重排仍然安全的根本原因。
//!
//! # 优势
//!
//! - **类型安全**：Rust struct + serde，编译期保证数据结构正确
//! - **一致性**：单一数据源，采集协调器是唯一的写入指挥方
//! - **可维护性**：SQL 逻辑集中在 `ledger` / `pinboard` 子模块

use std::fs;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;

use crate::capture::ContentKind;
use crate::error::AppError;

mod cleanup;
mod ledger;
mod pinboard;
mod schema;

// ============================================================================
// 数据模型
// ============================================================================

/// 持久化的剪贴板历史条目
///
/// `id` 终生不变且不复用；创建后仅 `thumbnail`、`source_app_*`、
/// `is_favorite`、`pinboard_id` 与排序键 `touched_at` 允许变更。
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    pub kind: ContentKind,
    /// 内联文本/链接/路径列表；图片为落盘负载文件路径
    pub payload: String,
    pub fingerprint: String,
    pub thumbnail: Option<Vec<u8>>,
    pub source_app_name: Option<String>,
    pub source_app_icon: Option<Vec<u8>>,
    pub created_at: i64,
    /// 排序键：账本按此列倒序即"最新在头"
    pub touched_at: i64,
    pub is_favorite: bool,
    pub pinboard_id: Option<i64>,
}

/// 待插入条目（id 与时间戳由账本分配）
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub kind: ContentKind,
    pub payload: String,
    pub fingerprint: String,
    pub thumbnail: Option<Vec<u8>>,
    pub source_app_name: Option<String>,
    pub source_app_icon: Option<Vec<u8>>,
}

/// 钉板（条目的命名分组）
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pinboard {
    pub id: i64,
    pub name: String,
    pub created_at: i64,
}

/// 账本统计信息
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerStats {
    pub total: i64,
    pub today: i64,
    pub favorites: i64,
    pub pinned: i64,
}

// ============================================================================
// 账本
// ============================================================================

/// 历史账本：`history` 表的唯一所有者
///
/// 内部以单互斥锁串行化连接访问；采集路径本身是单写者设计，
/// 此锁只为外部查询/变更调用与采集线程的交错提供保护。
pub struct Ledger {
    conn: Mutex<Connection>,
}

impl Ledger {
    /// 打开（或创建）数据库并执行 Schema 迁移
    pub fn open(db_path: &Path) -> Result<Self, AppError> {
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Database(format!("创建数据库目录失败: {}", e)))?;
        }
        log::info!("数据库路径: {}", db_path.display());

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Database(format!("打开数据库失败: {}", e)))?;

        schema::initialize_schema(&conn)?;

        Ok(Ledger {
            conn: Mutex::new(conn),
        })
    }

    /// 内存数据库（测试与降级运行）
    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Database(format!("打开内存数据库失败: {}", e)))?;
        schema::initialize_schema(&conn)?;
        Ok(Ledger {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn with_conn<T>(
        &self,
        op: impl FnOnce(&Connection) -> Result<T, AppError>,
    ) -> Result<T, AppError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| AppError::Database(format!("获取数据库锁失败: {}", e)))?;
        op(&conn)
    }
}
