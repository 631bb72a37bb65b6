//! 图片负载存储模块
//!
//! # 设计思路
//!
//! 图片类条目的像素负载不进数据库，落盘为 PNG 文件，数据库只存
//! 文件路径。统一管理存储目录（支持用户自定义目录），目录不存在
//! 时自动创建，命名带时间戳前缀以便孤儿清理识别归管文件。
//!
//! # 实现思路
//!
//! - 优先使用设置中的自定义目录，未设置时回退到数据目录下的
//!   `images` 子目录。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。
//! - 仅 `img_` 前缀 + `.png` 扩展名的文件视为本应用生成，
//!   清理逻辑绝不触碰用户自己的文件。

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use image::ImageFormat;
use serde::Serialize;

use crate::capture::RawImage;
use crate::error::AppError;

/// 存储目录信息
#[derive(Debug, Clone, Serialize)]
pub struct StorageInfo {
    pub path: String,
    pub total_size: u64,
    pub file_count: u64,
}

/// 判断路径是否为本应用生成的图片负载文件
pub fn is_managed_blob(path: &Path) -> bool {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();

    file_name.starts_with("img_") && ext == "png"
}

/// 图片负载存储
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    /// 解析并创建存储目录
    ///
    /// # 参数
    /// * `data_dir` - 应用数据目录
    /// * `custom_dir` - 用户自定义目录（可选，空串视为未设置）
    pub fn new(data_dir: &Path, custom_dir: Option<&str>) -> Result<Self, AppError> {
        let dir = match custom_dir {
            Some(custom) if !custom.is_empty() => PathBuf::from(custom),
            _ => data_dir.join("images"),
        };

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                AppError::Storage(format!("创建图片目录 '{}' 失败: {}", dir.display(), e))
            })?;
        }

        Ok(BlobStore { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// 将原始像素保存为 PNG 负载文件，返回落盘路径
    pub fn save_image(&self, image: &RawImage) -> Result<PathBuf, AppError> {
        let buffer = image::RgbaImage::from_raw(
            image.width as u32,
            image.height as u32,
            image.rgba.clone(),
        )
        .ok_or_else(|| AppError::Storage("创建图像缓冲区失败".to_string()))?;

        let timestamp = Local::now().format("%Y%m%d%H%M%S%f");
        let file_name = format!("img_{}.png", timestamp);
        let file_path = self.dir.join(&file_name);

        buffer
            .save_with_format(&file_path, ImageFormat::Png)
            .map_err(|e| AppError::Storage(format!("保存图片失败: {}", e)))?;

        Ok(file_path)
    }

    /// 存储目录统计（路径 + 占用大小 + 文件数）
    pub fn info(&self) -> StorageInfo {
        let mut total_size: u64 = 0;
        let mut file_count: u64 = 0;

        if let Ok(entries) = fs::read_dir(&self.dir) {
            for entry in entries.flatten() {
                if let Ok(metadata) = entry.metadata() {
                    if metadata.is_file() {
                        total_size += metadata.len();
                        file_count += 1;
                    }
                }
            }
        }

        StorageInfo {
            path: self.dir.to_string_lossy().to_string(),
            total_size,
            file_count,
        }
    }
}
