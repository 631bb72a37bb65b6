use rusqlite::{params, Connection, OptionalExtension};

use crate::capture::ContentKind;
use crate::error::AppError;

use super::{cleanup, HistoryEntry, Ledger, LedgerStats, NewEntry};

const ENTRY_COLUMNS: &str = "id, kind, payload, fingerprint, thumbnail, source_app_name, \
     source_app_icon, created_at, touched_at, is_favorite, pinboard_id";

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn entry_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<HistoryEntry> {
    let kind_str: String = row.get(1)?;
    Ok(HistoryEntry {
        id: row.get(0)?,
        // kind 列由本库写入，未知值按文本兜底
        kind: ContentKind::parse(&kind_str).unwrap_or(ContentKind::Text),
        payload: row.get(2)?,
        fingerprint: row.get(3)?,
        thumbnail: row.get(4)?,
        source_app_name: row.get(5)?,
        source_app_icon: row.get(6)?,
        created_at: row.get(7)?,
        touched_at: row.get(8)?,
        is_favorite: row.get::<_, i64>(9)? != 0,
        pinboard_id: row.get(10)?,
    })
}

fn query_entry(conn: &Connection, id: i64) -> Result<Option<HistoryEntry>, AppError> {
    conn.query_row(
        &format!("SELECT {ENTRY_COLUMNS} FROM history WHERE id = ?1"),
        params![id],
        entry_from_row,
    )
    .optional()
    .map_err(|e| AppError::Database(format!("查询条目失败: {}", e)))
}

/// LIKE 模式转义：用户输入按字面子串匹配
fn escape_like(term: &str) -> String {
    term.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

impl Ledger {
    /// 在账本头部插入新条目，返回带 id 与时间戳的完整记录
    pub fn insert_at_head(&self, new: NewEntry) -> Result<HistoryEntry, AppError> {
        self.with_conn(|conn| {
            let now = now_ms();
            conn.execute(
                "INSERT INTO history (kind, payload, fingerprint, thumbnail, source_app_name, \
                 source_app_icon, created_at, touched_at, is_favorite, pinboard_id)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 0, NULL)",
                params![
                    new.kind.as_str(),
                    new.payload,
                    new.fingerprint,
                    new.thumbnail,
                    new.source_app_name,
                    new.source_app_icon,
                    now,
                ],
            )
            .map_err(|e| AppError::Database(format!("插入记录失败: {}", e)))?;

            let id = conn.last_insert_rowid();
            Ok(HistoryEntry {
                id,
                kind: new.kind,
                payload: new.payload,
                fingerprint: new.fingerprint,
                thumbnail: new.thumbnail,
                source_app_name: new.source_app_name,
                source_app_icon: new.source_app_icon,
                created_at: now,
                touched_at: now,
                is_favorite: false,
                pinboard_id: None,
            })
        })
    }

    /// 在最近 `window` 条内查找指纹相同的最新条目
    ///
    /// 回溯窗口是去重语义的一部分：只有近期条目才会被"再次复制
    /// 置顶"，任意久远的旧条目不被复活。
    pub fn find_recent_by_fingerprint(
        &self,
        fingerprint: &str,
        window: u32,
    ) -> Result<Option<HistoryEntry>, AppError> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {ENTRY_COLUMNS} FROM (
                         SELECT {ENTRY_COLUMNS} FROM history
                         ORDER BY touched_at DESC, id DESC LIMIT ?1
                     ) WHERE fingerprint = ?2
                     ORDER BY touched_at DESC, id DESC LIMIT 1"
                ),
                params![window as i64, fingerprint],
                entry_from_row,
            )
            .optional()
            .map_err(|e| AppError::Database(format!("指纹查询失败: {}", e)))
        })
    }

    pub fn get_entry(&self, id: i64) -> Result<Option<HistoryEntry>, AppError> {
        self.with_conn(|conn| query_entry(conn, id))
    }

    /// 删除条目并清理不再被引用的图片负载文件
    pub fn remove_by_id(&self, id: i64) -> Result<bool, AppError> {
        self.with_conn(|conn| cleanup::delete_entry_with_cleanup(conn, id))
    }

    /// 按 id 回写缩略图
    ///
    /// 条目已被删除时写入自然落空，返回 `false`；这不是错误。
    pub fn update_thumbnail(&self, id: i64, thumbnail: &[u8]) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE history SET thumbnail = ?1 WHERE id = ?2",
                    params![thumbnail, id],
                )
                .map_err(|e| AppError::Database(format!("写入缩略图失败: {}", e)))?;
            Ok(affected > 0)
        })
    }

    /// 按 id 回写来源应用信息
    pub fn update_source_app(
        &self,
        id: i64,
        name: &str,
        icon: Option<&[u8]>,
    ) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE history SET source_app_name = ?1, source_app_icon = ?2 WHERE id = ?3",
                    params![name, icon, id],
                )
                .map_err(|e| AppError::Database(format!("写入来源应用失败: {}", e)))?;
            Ok(affected > 0)
        })
    }

    /// 将既有条目移到账本头部（只动排序键，内容不变）
    pub fn touch_to_head(&self, id: i64) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE history SET touched_at = ?1 WHERE id = ?2",
                    params![now_ms(), id],
                )
                .map_err(|e| AppError::Database(format!("置顶更新失败: {}", e)))?;
            Ok(affected > 0)
        })
    }

    /// 切换收藏标志，返回新状态
    pub fn toggle_favorite(&self, id: i64) -> Result<bool, AppError> {
        self.with_conn(|conn| {
            let affected = conn
                .execute(
                    "UPDATE history SET is_favorite = 1 - is_favorite WHERE id = ?1",
                    params![id],
                )
                .map_err(|e| AppError::Database(format!("切换收藏失败: {}", e)))?;
            if affected == 0 {
                return Err(AppError::EntryNotFound(id));
            }
            let value: i64 = conn
                .query_row(
                    "SELECT is_favorite FROM history WHERE id = ?1",
                    params![id],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Database(format!("读取收藏状态失败: {}", e)))?;
            Ok(value != 0)
        })
    }

    /// 设置或清除条目的钉板归属
    pub fn set_pinboard(&self, id: i64, pinboard_id: Option<i64>) -> Result<(), AppError> {
        self.with_conn(|conn| {
            if let Some(pid) = pinboard_id {
                let exists: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM pinboards WHERE id = ?1",
                        params![pid],
                        |row| row.get(0),
                    )
                    .map_err(|e| AppError::Database(format!("检查钉板失败: {}", e)))?;
                if exists == 0 {
                    return Err(AppError::Database(format!("钉板不存在: id={pid}")));
                }
            }

            let affected = conn
                .execute(
                    "UPDATE history SET pinboard_id = ?1 WHERE id = ?2",
                    params![pinboard_id, id],
                )
                .map_err(|e| AppError::Database(format!("设置钉板失败: {}", e)))?;
            if affected == 0 {
                return Err(AppError::EntryNotFound(id));
            }
            Ok(())
        })
    }

    /// 最新在前的分页查询
    pub fn get_history(&self, limit: u32, offset: u32) -> Result<Vec<HistoryEntry>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM history
                     ORDER BY touched_at DESC, id DESC LIMIT ?1 OFFSET ?2"
                ))
                .map_err(|e| AppError::Database(format!("准备查询失败: {}", e)))?;

            let items = stmt
                .query_map(params![limit as i64, offset as i64], entry_from_row)
                .map_err(|e| AppError::Database(format!("查询历史失败: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))?;

            Ok(items)
        })
    }

    /// 简单子串扫描（非全文索引）
    pub fn search(&self, term: &str, limit: u32) -> Result<Vec<HistoryEntry>, AppError> {
        self.with_conn(|conn| {
            let pattern = format!("%{}%", escape_like(term));
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM history
                     WHERE payload LIKE ?1 ESCAPE '\\'
                     ORDER BY touched_at DESC, id DESC LIMIT ?2"
                ))
                .map_err(|e| AppError::Database(format!("准备搜索失败: {}", e)))?;

            let items = stmt
                .query_map(params![pattern, limit as i64], entry_from_row)
                .map_err(|e| AppError::Database(format!("搜索失败: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))?;

            Ok(items)
        })
    }

    /// 指定钉板下的条目
    pub fn pinboard_items(&self, pinboard_id: i64) -> Result<Vec<HistoryEntry>, AppError> {
        self.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {ENTRY_COLUMNS} FROM history
                     WHERE pinboard_id = ?1
                     ORDER BY touched_at DESC, id DESC"
                ))
                .map_err(|e| AppError::Database(format!("准备钉板查询失败: {}", e)))?;

            let items = stmt
                .query_map(params![pinboard_id], entry_from_row)
                .map_err(|e| AppError::Database(format!("钉板查询失败: {}", e)))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| AppError::Database(format!("读取行失败: {}", e)))?;

            Ok(items)
        })
    }

    pub fn entry_count(&self) -> Result<i64, AppError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
                .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))
        })
    }

    pub fn stats(&self) -> Result<LedgerStats, AppError> {
        self.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
                .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))?;

            let favorites: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM history WHERE is_favorite = 1",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Database(format!("查询收藏数失败: {}", e)))?;

            let pinned: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM history WHERE pinboard_id IS NOT NULL",
                    [],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Database(format!("查询钉选数失败: {}", e)))?;

            let start_of_day = {
                let now = chrono::Local::now();
                now.date_naive()
                    .and_hms_opt(0, 0, 0)
                    .and_then(|t| t.and_local_timezone(now.timezone()).single())
                    .map(|t| t.timestamp_millis())
                    .unwrap_or(0)
            };

            let today: i64 = conn
                .query_row(
                    "SELECT COUNT(*) FROM history WHERE created_at >= ?1",
                    params![start_of_day],
                    |row| row.get(0),
                )
                .map_err(|e| AppError::Database(format!("查询今日数失败: {}", e)))?;

            Ok(LedgerStats {
                total,
                today,
                favorites,
                pinned,
            })
        })
    }

    /// 将账本裁剪到条目上限，返回删除数量
    ///
    /// 收藏与钉选条目不参与裁剪，从最旧的普通条目开始删除。
    pub fn prune_to_limit(&self, limit: u32) -> Result<usize, AppError> {
        self.with_conn(|conn| {
            let total: i64 = conn
                .query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))
                .map_err(|e| AppError::Database(format!("查询总数失败: {}", e)))?;

            let overflow = total - limit as i64;
            if overflow <= 0 {
                return Ok(0);
            }

            let ids = collect_prunable_ids(
                conn,
                "SELECT id FROM history WHERE is_favorite = 0 AND pinboard_id IS NULL
                 ORDER BY touched_at ASC, id ASC LIMIT ?1",
                params![overflow],
            )?;

            cleanup::delete_entries_with_cleanup(conn, &ids)
        })
    }

    /// 删除早于 `cutoff_ms` 的普通条目，返回删除数量
    pub fn prune_older_than(&self, cutoff_ms: i64) -> Result<usize, AppError> {
        self.with_conn(|conn| {
            let ids = collect_prunable_ids(
                conn,
                "SELECT id FROM history WHERE touched_at < ?1 \
                 AND is_favorite = 0 AND pinboard_id IS NULL",
                params![cutoff_ms],
            )?;

            cleanup::delete_entries_with_cleanup(conn, &ids)
        })
    }

    /// 清空所有非收藏、非钉选条目，返回删除数量
    pub fn clear_history(&self) -> Result<usize, AppError> {
        self.with_conn(|conn| {
            let ids = collect_prunable_ids(
                conn,
                "SELECT id FROM history WHERE is_favorite = 0 AND pinboard_id IS NULL",
                params![],
            )?;

            cleanup::delete_entries_with_cleanup(conn, &ids)
        })
    }
}

fn collect_prunable_ids(
    conn: &Connection,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<i64>, AppError> {
    let mut stmt = conn
        .prepare(sql)
        .map_err(|e| AppError::Database(format!("准备裁剪查询失败: {}", e)))?;
    let ids = stmt
        .query_map(args, |row| row.get::<_, i64>(0))
        .map_err(|e| AppError::Database(format!("查询裁剪条目失败: {}", e)))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| AppError::Database(format!("读取裁剪条目失败: {}", e)))?;
    Ok(ids)
}
