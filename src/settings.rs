//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件形式存放在数据目录下，宽容加载：文件缺失用
//! 默认值，未知键忽略，各字段缺省时取默认。可调项覆盖历史上限、
//! 去重回溯窗口、监听节流间隔与缩略图策略。
//!
//! # 实现思路
//!
//! - `serde(default)` 保证旧版本设置文件可以直接加载。
//! - 节流间隔等带边界的值在读取侧 clamp，而不是在写入侧拒绝。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const SETTINGS_FILE: &str = "settings.json";

const EVENT_MIN_INTERVAL_DEFAULT_MS: u64 = 80;
const EVENT_MIN_INTERVAL_MIN_MS: u64 = 20;
const EVENT_MIN_INTERVAL_MAX_MS: u64 = 5_000;

/// 缩略图生成策略
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ThumbnailSettings {
    /// 单次尝试的超时（毫秒）
    pub timeout_ms: u64,
    /// 编码后输出的字节上限，超出则放弃该次尝试
    pub max_bytes: usize,
    /// 缩略图最长边（像素）
    pub max_dimension: u32,
}

impl Default for ThumbnailSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 3_000,
            max_bytes: 50 * 1024,
            max_dimension: 256,
        }
    }
}

/// 应用设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Settings {
    /// 历史条目上限，超出时裁剪最旧的非收藏、非钉选条目
    pub history_limit: u32,
    /// 指纹去重的回溯窗口（条数）；缺省时取 `history_limit`
    pub dedup_window: Option<u32>,
    /// 剪贴板变化事件的最小处理间隔（毫秒）
    pub event_min_interval_ms: u64,
    /// 图片负载目录覆盖
    pub blob_dir: Option<String>,
    /// 数据库目录覆盖
    pub db_dir: Option<String>,
    pub thumbnail: ThumbnailSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            history_limit: 500,
            dedup_window: None,
            event_min_interval_ms: EVENT_MIN_INTERVAL_DEFAULT_MS,
            blob_dir: None,
            db_dir: None,
            thumbnail: ThumbnailSettings::default(),
        }
    }
}

impl Settings {
    /// 生效的去重回溯窗口，至少为 1
    pub fn effective_dedup_window(&self) -> u32 {
        self.dedup_window.unwrap_or(self.history_limit).max(1)
    }

    /// clamp 后的监听节流间隔
    pub fn normalized_event_min_interval_ms(&self) -> u64 {
        self.event_min_interval_ms
            .clamp(EVENT_MIN_INTERVAL_MIN_MS, EVENT_MIN_INTERVAL_MAX_MS)
    }
}

fn settings_file_path(data_dir: &Path) -> PathBuf {
    data_dir.join(SETTINGS_FILE)
}

/// 从数据目录加载设置
///
/// 文件缺失返回默认值；文件损坏返回错误（不静默覆盖用户数据）。
pub fn load_settings(data_dir: &Path) -> Result<Settings, AppError> {
    let path = settings_file_path(data_dir);
    if !path.exists() {
        return Ok(Settings::default());
    }

    let content = fs::read_to_string(&path)?;
    serde_json::from_str(&content)
        .map_err(|e| AppError::Storage(format!("解析设置文件失败: {}", e)))
}

/// 将设置持久化到数据目录
pub fn save_settings(data_dir: &Path, settings: &Settings) -> Result<(), AppError> {
    fs::create_dir_all(data_dir)
        .map_err(|e| AppError::Storage(format!("创建应用数据目录失败: {}", e)))?;

    let content = serde_json::to_string_pretty(settings)
        .map_err(|e| AppError::Storage(format!("序列化设置失败: {}", e)))?;

    fs::write(settings_file_path(data_dir), content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_temp_dir() -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("clock error")
            .as_nanos();
        let dir = std::env::temp_dir().join(format!("clipingest-settings-test-{nanos}"));
        fs::create_dir_all(&dir).expect("create temp dir");
        dir
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = unique_temp_dir();
        let settings = load_settings(&dir).expect("load settings");
        assert_eq!(settings.history_limit, 500);
        assert_eq!(settings.thumbnail.max_bytes, 50 * 1024);
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = unique_temp_dir();
        let mut settings = Settings::default();
        settings.history_limit = 42;
        settings.dedup_window = Some(10);
        settings.blob_dir = Some("D:/blobs".to_string());

        save_settings(&dir, &settings).expect("save settings");
        let loaded = load_settings(&dir).expect("load settings");

        assert_eq!(loaded.history_limit, 42);
        assert_eq!(loaded.dedup_window, Some(10));
        assert_eq!(loaded.blob_dir.as_deref(), Some("D:/blobs"));
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn unknown_and_missing_keys_are_tolerated() {
        let dir = unique_temp_dir();
        fs::write(
            dir.join(SETTINGS_FILE),
            r#"{ "historyLimit": 7, "someFutureKey": true }"#,
        )
        .expect("write partial settings");

        let loaded = load_settings(&dir).expect("load settings");
        assert_eq!(loaded.history_limit, 7);
        assert_eq!(
            loaded.event_min_interval_ms,
            EVENT_MIN_INTERVAL_DEFAULT_MS
        );
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = unique_temp_dir();
        fs::write(dir.join(SETTINGS_FILE), "not-json").expect("write invalid settings");
        assert!(load_settings(&dir).is_err());
        let _ = fs::remove_dir_all(dir);
    }

    #[test]
    fn event_min_interval_clamps_bounds() {
        let mut settings = Settings::default();
        settings.event_min_interval_ms = 5;
        assert_eq!(settings.normalized_event_min_interval_ms(), 20);
        settings.event_min_interval_ms = 80;
        assert_eq!(settings.normalized_event_min_interval_ms(), 80);
        settings.event_min_interval_ms = 6_000;
        assert_eq!(settings.normalized_event_min_interval_ms(), 5_000);
    }

    #[test]
    fn dedup_window_falls_back_to_history_limit() {
        let mut settings = Settings::default();
        settings.history_limit = 30;
        assert_eq!(settings.effective_dedup_window(), 30);
        settings.dedup_window = Some(12);
        assert_eq!(settings.effective_dedup_window(), 12);
        settings.dedup_window = Some(0);
        assert_eq!(settings.effective_dedup_window(), 1);
    }
}
