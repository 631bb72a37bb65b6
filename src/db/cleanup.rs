//! 图片负载的孤儿清理
//!
//! 图片条目的 `payload` 即落盘 PNG 的路径。删除条目后，若没有
//! 其他条目仍引用同一文件（Case B 置顶会让新旧条目短暂共享负载），
//! 则一并删除文件；仅处理本应用生成的归管文件，用户文件不受影响。

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::capture::ContentKind;
use crate::error::AppError;
use crate::storage::is_managed_blob;

fn blob_candidate(kind: &str, payload: &str) -> Option<PathBuf> {
    if kind != ContentKind::Image.as_str() {
        return None;
    }
    let path = PathBuf::from(payload);
    if path.is_absolute() && is_managed_blob(&path) {
        Some(path)
    } else {
        None
    }
}

fn remove_orphan_blob(conn: &Connection, path: &Path) -> Result<(), AppError> {
    let path_str = path.to_string_lossy().to_string();

    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM history WHERE kind = 'image' AND payload = ?1",
            params![path_str],
            |row| row.get(0),
        )
        .map_err(|e| AppError::Database(format!("检查负载引用失败: {}", e)))?;

    if count == 0 {
        match fs::remove_file(path) {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(AppError::Storage(format!(
                    "删除负载文件失败 '{}': {}",
                    path.display(),
                    e
                )));
            }
        }
    }

    Ok(())
}

fn cleanup_blobs(conn: &Connection, candidates: HashSet<PathBuf>) -> Result<(), AppError> {
    for path in candidates {
        remove_orphan_blob(conn, &path)?;
    }
    Ok(())
}

fn collect_blob_candidates(
    conn: &Connection,
    ids: &[i64],
) -> Result<HashSet<PathBuf>, AppError> {
    if ids.is_empty() {
        return Ok(HashSet::new());
    }

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "SELECT kind, payload FROM history WHERE id IN ({})",
        placeholders.join(",")
    );

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| AppError::Database(format!("准备查询待删条目失败: {}", e)))?;

    let rows = stmt
        .query_map(params_from_iter(ids.iter()), |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(|e| AppError::Database(format!("查询待删条目失败: {}", e)))?;

    let mut result = HashSet::new();
    for row in rows {
        let (kind, payload) =
            row.map_err(|e| AppError::Database(format!("读取待删条目失败: {}", e)))?;
        if let Some(path) = blob_candidate(&kind, &payload) {
            result.insert(path);
        }
    }

    Ok(result)
}

pub(super) fn delete_entry_with_cleanup(conn: &Connection, id: i64) -> Result<bool, AppError> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT kind, payload FROM history WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| AppError::Database(format!("查询待删除记录失败: {}", e)))?;

    let Some((kind, payload)) = row else {
        return Ok(false);
    };

    conn.execute("DELETE FROM history WHERE id = ?1", params![id])
        .map_err(|e| AppError::Database(format!("删除记录失败: {}", e)))?;

    if let Some(path) = blob_candidate(&kind, &payload) {
        remove_orphan_blob(conn, &path)?;
    }
    Ok(true)
}

pub(super) fn delete_entries_with_cleanup(
    conn: &Connection,
    ids: &[i64],
) -> Result<usize, AppError> {
    if ids.is_empty() {
        return Ok(0);
    }

    let candidates = collect_blob_candidates(conn, ids)?;

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "DELETE FROM history WHERE id IN ({})",
        placeholders.join(",")
    );
    let deleted = conn
        .execute(&sql, params_from_iter(ids.iter()))
        .map_err(|e| AppError::Database(format!("批量删除失败: {}", e)))?;

    cleanup_blobs(conn, candidates)?;
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
        let _ = fs::create_dir_all(&dir);
        dir
    }

    fn setup_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory sqlite failed");
        conn.execute_batch(
            "CREATE TABLE history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                kind TEXT NOT NULL,
                payload TEXT NOT NULL
            )",
        )
        .expect("create history table failed");
        conn
    }

    fn insert_row(conn: &Connection, kind: &str, payload: &str) -> i64 {
        conn.execute(
            "INSERT INTO history (kind, payload) VALUES (?1, ?2)",
            params![kind, payload],
        )
        .expect("insert row failed");
        conn.last_insert_rowid()
    }

    #[test]
    fn blob_candidate_only_accepts_managed_image_payloads() {
        let dir = unique_temp_dir("clipingest_candidates");
        let managed = dir.join("img_20260101010101000.png");
        let user_file = dir.join("holiday.png");

        assert!(blob_candidate("image", &managed.to_string_lossy()).is_some());
        assert!(blob_candidate("image", &user_file.to_string_lossy()).is_none());
        assert!(blob_candidate("files", &managed.to_string_lossy()).is_none());
        assert!(blob_candidate("image", "relative/img_1.png").is_none());

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn delete_entry_removes_row_and_orphan_blob() {
        let dir = unique_temp_dir("clipingest_delete_flow");
        let file_path = dir.join("img_20260101010101000.png");
        fs::write(&file_path, b"test").expect("create temp file failed");

        let conn = setup_conn();
        let id = insert_row(&conn, "image", &file_path.to_string_lossy());

        assert!(delete_entry_with_cleanup(&conn, id).expect("delete flow should succeed"));

        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM history WHERE id = ?1", params![id], |row| {
                row.get(0)
            })
            .expect("count row failed");
        assert_eq!(count, 0, "row should be deleted from history");
        assert!(!file_path.exists(), "orphan managed file should be removed");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn delete_entry_keeps_blob_still_referenced_by_other_row() {
        let dir = unique_temp_dir("clipingest_keep_shared");
        let file_path = dir.join("img_20260101010101000.png");
        fs::write(&file_path, b"shared").expect("create temp file failed");

        let conn = setup_conn();
        let id1 = insert_row(&conn, "image", &file_path.to_string_lossy());
        let _id2 = insert_row(&conn, "image", &file_path.to_string_lossy());

        assert!(delete_entry_with_cleanup(&conn, id1).expect("delete should succeed"));
        assert!(file_path.exists(), "shared blob must be kept");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn delete_missing_entry_returns_false() {
        let conn = setup_conn();
        assert!(!delete_entry_with_cleanup(&conn, 42).expect("missing id is not an error"));
    }

    #[test]
    fn bulk_delete_keeps_shared_and_removes_unique_blob() {
        let dir = unique_temp_dir("clipingest_bulk_flow");
        let shared = dir.join("img_20260101010101001.png");
        let unique = dir.join("img_20260101010101002.png");
        fs::write(&shared, b"shared").expect("create shared file failed");
        fs::write(&unique, b"unique").expect("create unique file failed");

        let conn = setup_conn();
        let id1 = insert_row(&conn, "image", &shared.to_string_lossy());
        let _id2 = insert_row(&conn, "image", &shared.to_string_lossy());
        let id3 = insert_row(&conn, "image", &unique.to_string_lossy());

        let deleted =
            delete_entries_with_cleanup(&conn, &[id1, id3]).expect("bulk delete should succeed");
        assert_eq!(deleted, 2);

        assert!(shared.exists(), "shared blob should be kept");
        assert!(!unique.exists(), "unique blob should be removed as orphan");

        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn user_files_in_file_list_entries_are_never_deleted() {
        let dir = unique_temp_dir("clipingest_user_files");
        let user_file = dir.join("holiday.png");
        fs::write(&user_file, b"user").expect("create user file failed");

        let conn = setup_conn();
        let id = insert_row(&conn, "files", &user_file.to_string_lossy());

        assert!(delete_entry_with_cleanup(&conn, id).expect("delete should succeed"));
        assert!(user_file.exists(), "non-managed file should not be removed");

        let _ = fs::remove_dir_all(&dir);
    }
}
