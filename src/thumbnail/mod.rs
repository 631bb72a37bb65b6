//! 缩略图生成模块
//!
//! # 设计思路
//!
//! 尽力而为、绝不阻塞采集：每个符合条件的条目派生一个独立任务，
//! 按回退链依次尝试，首个成功即止；整链失败的结果是"无缩略图"，
//! 这是成功态而非错误。
//!
//! 回退链：
//! 1. 图片条目：进程内解码 + 缩放（图片永远先走这条）
//! 2. 文件条目：平台原生文档预览服务
//! 3. 扩展名像图片时直接解码文件
//! 4. 平台通用文件类型图标（最终兜底）
//!
//! # 实现思路
//!
//! - 每次尝试包在 `spawn_blocking` + `tokio::time::timeout` 里；
//!   超时视为失败落入下一环，不重试。被放弃的阻塞任务允许自行
//!   结束，结果丢弃。
//! - 编码后超出字节上限同样视为该次尝试失败（持久化前检查）。
//! - 多文件条目只取首个文件，这是刻意的简化。

mod raster;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::platform::PlatformAccessor;
use crate::settings::ThumbnailSettings;

/// 缩略图链路错误（仅在链路内部流转，不向协调器传播）
#[derive(Debug, thiserror::Error)]
pub enum ThumbnailError {
    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("预览能力不可用：{0}")]
    Unavailable(String),
}

/// 缩略图生成策略（由设置换算而来）
#[derive(Debug, Clone)]
pub struct ThumbnailConfig {
    /// 单次尝试的超时
    pub timeout: Duration,
    /// 编码后输出的字节上限
    pub max_bytes: usize,
    /// 缩略图最长边
    pub max_dimension: u32,
}

impl From<&ThumbnailSettings> for ThumbnailConfig {
    fn from(settings: &ThumbnailSettings) -> Self {
        ThumbnailConfig {
            timeout: Duration::from_millis(settings.timeout_ms),
            max_bytes: settings.max_bytes,
            max_dimension: settings.max_dimension,
        }
    }
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        ThumbnailConfig::from(&ThumbnailSettings::default())
    }
}

/// 缩略图对象：图片负载文件，或多文件捕获的首个文件
#[derive(Debug, Clone)]
pub(crate) enum ThumbnailTarget {
    ImageBlob(PathBuf),
    File(PathBuf),
}

/// 将原始像素图标缩放并编码为 PNG（来源应用图标补全用）
///
/// 任何失败都折叠为 `None`：图标缺失是正常结果。
pub(crate) fn encode_icon_png(raw: &crate::capture::RawImage, max_dimension: u32) -> Option<Vec<u8>> {
    let image = raster::raw_to_dynamic(raw).ok()?;
    let scaled = raster::downscale(image, max_dimension).ok()?;
    raster::encode_png(&scaled).ok()
}

/// 扩展名提示为图片的文件才值得直接解码
const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "gif", "bmp", "webp", "tif", "tiff", "ico",
];

fn extension_suggests_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            IMAGE_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

/// 单次尝试：阻塞执行 + 超时 + 大小上限
///
/// 任何失败都降级为 `None` 落入下一环；超时的阻塞任务不被取消，
/// 其结果在完成后被丢弃。
async fn attempt<F>(config: &ThumbnailConfig, stage: &'static str, op: F) -> Option<Vec<u8>>
where
    F: FnOnce() -> Result<Vec<u8>, ThumbnailError> + Send + 'static,
{
    let outcome = tokio::time::timeout(config.timeout, tokio::task::spawn_blocking(op)).await;

    match outcome {
        Err(_) => {
            log::debug!("⏱️ 缩略图尝试超时（{stage}）");
            None
        }
        Ok(Err(join_err)) => {
            log::debug!("缩略图任务中断（{stage}）: {join_err}");
            None
        }
        Ok(Ok(Err(err))) => {
            log::debug!("缩略图尝试失败（{stage}）: {err}");
            None
        }
        Ok(Ok(Ok(bytes))) => {
            if bytes.len() > config.max_bytes {
                log::debug!(
                    "🚫 缩略图超出大小上限（{stage}）: {} > {} 字节",
                    bytes.len(),
                    config.max_bytes
                );
                return None;
            }
            Some(bytes)
        }
    }
}

/// 执行回退链，返回编码后的 PNG 字节
///
/// `None` 表示整链失败：条目保持空缩略图，属于可接受的成功态。
pub(crate) async fn generate(
    accessor: Arc<dyn PlatformAccessor>,
    config: &ThumbnailConfig,
    target: ThumbnailTarget,
) -> Option<Vec<u8>> {
    match target {
        ThumbnailTarget::ImageBlob(path) => {
            let max_dimension = config.max_dimension;
            attempt(config, "raster", move || {
                let bytes = std::fs::read(&path)
                    .map_err(|e| ThumbnailError::FileSystem(format!("读取图片负载失败：{}", e)))?;
                let decoded = raster::decode_bytes(&bytes)?;
                let scaled = raster::downscale(decoded, max_dimension)?;
                raster::encode_png(&scaled)
            })
            .await
        }
        ThumbnailTarget::File(path) => {
            // 2. 平台文档预览服务
            {
                let accessor = Arc::clone(&accessor);
                let path = path.clone();
                let max_dimension = config.max_dimension;
                if let Some(bytes) = attempt(config, "preview", move || {
                    let raw = accessor
                        .document_preview(&path, max_dimension)
                        .ok_or_else(|| {
                            ThumbnailError::Unavailable("平台未返回文档预览".to_string())
                        })?;
                    let image = raster::raw_to_dynamic(&raw)?;
                    let scaled = raster::downscale(image, max_dimension)?;
                    raster::encode_png(&scaled)
                })
                .await
                {
                    return Some(bytes);
                }
            }

            // 3. 扩展名提示为图片时直接解码
            if extension_suggests_image(&path) {
                let decode_path = path.clone();
                let max_dimension = config.max_dimension;
                if let Some(bytes) = attempt(config, "decode", move || {
                    let bytes = std::fs::read(&decode_path)
                        .map_err(|e| ThumbnailError::FileSystem(format!("读取文件失败：{}", e)))?;
                    if !raster::sniff_is_image(&bytes) {
                        return Err(ThumbnailError::Decode("文件内容不是图片".to_string()));
                    }
                    let decoded = raster::decode_bytes(&bytes)?;
                    let scaled = raster::downscale(decoded, max_dimension)?;
                    raster::encode_png(&scaled)
                })
                .await
                {
                    return Some(bytes);
                }
            }

            // 4. 通用文件类型图标兜底
            {
                let accessor = Arc::clone(&accessor);
                let max_dimension = config.max_dimension;
                attempt(config, "icon", move || {
                    let raw = accessor.file_type_icon(&path).ok_or_else(|| {
                        ThumbnailError::Unavailable("平台未返回类型图标".to_string())
                    })?;
                    let image = raster::raw_to_dynamic(&raw)?;
                    let scaled = raster::downscale(image, max_dimension)?;
                    raster::encode_png(&scaled)
                })
                .await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FormatHint, RawCapture, RawImage};
    use crate::platform::{AppIdentity, ReadFailure};
    use image::GenericImageView;
    use std::time::{SystemTime, UNIX_EPOCH};

    /// 可编排的测试访问器：预览/图标按字段返回，可注入延迟
    struct ScriptedAccessor {
        preview: Option<RawImage>,
        icon: Option<RawImage>,
        preview_delay: Option<Duration>,
    }

    impl ScriptedAccessor {
        fn silent() -> Self {
            ScriptedAccessor {
                preview: None,
                icon: None,
                preview_delay: None,
            }
        }
    }

    impl PlatformAccessor for ScriptedAccessor {
        fn detect_format(&self) -> FormatHint {
            FormatHint::default()
        }

        fn read_content(&self, _hint: &FormatHint) -> Result<RawCapture, ReadFailure> {
            Ok(RawCapture::default())
        }

        fn frontmost_app(&self) -> Option<AppIdentity> {
            None
        }

        fn app_icon(&self, _app: &AppIdentity) -> Option<RawImage> {
            None
        }

        fn document_preview(&self, _path: &Path, _max_px: u32) -> Option<RawImage> {
            if let Some(delay) = self.preview_delay {
                std::thread::sleep(delay);
            }
            self.preview.clone()
        }

        fn file_type_icon(&self, _path: &Path) -> Option<RawImage> {
            self.icon.clone()
        }

        fn write_text(&self, _text: &str) -> Result<(), ReadFailure> {
            Ok(())
        }

        fn write_image(&self, _image: &RawImage) -> Result<(), ReadFailure> {
            Ok(())
        }

        fn write_files(&self, _paths: &[String]) -> Result<(), ReadFailure> {
            Ok(())
        }
    }

    fn solid_raw_image(width: usize, height: usize) -> RawImage {
        RawImage {
            width,
            height,
            rgba: vec![180u8; width * height * 4],
        }
    }

    fn unique_temp_dir(prefix: &str) -> PathBuf {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("{}_{}", prefix, nanos));
        let _ = std::fs::create_dir_all(&dir);
        dir
    }

    fn write_png(path: &Path, width: u32, height: u32) {
        let buffer = image::RgbaImage::from_fn(width, height, |x, y| {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        });
        buffer
            .save_with_format(path, image::ImageFormat::Png)
            .expect("write test png");
    }

    #[tokio::test]
    async fn image_blob_is_decoded_and_capped_to_max_dimension() {
        let dir = unique_temp_dir("clipingest_thumb_blob");
        let blob = dir.join("img_test.png");
        write_png(&blob, 600, 400);

        let config = ThumbnailConfig::default();
        let bytes = generate(
            Arc::new(ScriptedAccessor::silent()),
            &config,
            ThumbnailTarget::ImageBlob(blob),
        )
        .await
        .expect("thumbnail should be produced");

        assert!(bytes.len() <= config.max_bytes);
        let decoded = image::load_from_memory(&bytes).expect("decode thumbnail");
        assert!(decoded.width() <= config.max_dimension);
        assert!(decoded.height() <= config.max_dimension);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn oversized_output_is_never_returned() {
        let dir = unique_temp_dir("clipingest_thumb_cap");
        let blob = dir.join("img_test.png");
        write_png(&blob, 256, 256);

        let config = ThumbnailConfig {
            max_bytes: 16,
            ..ThumbnailConfig::default()
        };
        let result = generate(
            Arc::new(ScriptedAccessor::silent()),
            &config,
            ThumbnailTarget::ImageBlob(blob),
        )
        .await;

        assert!(result.is_none(), "over-cap thumbnails must be rejected");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn file_target_prefers_platform_preview() {
        let accessor = ScriptedAccessor {
            preview: Some(solid_raw_image(40, 30)),
            icon: Some(solid_raw_image(8, 8)),
            preview_delay: None,
        };

        let config = ThumbnailConfig::default();
        let bytes = generate(
            Arc::new(accessor),
            &config,
            ThumbnailTarget::File(PathBuf::from("/docs/report.pdf")),
        )
        .await
        .expect("preview should win");

        let decoded = image::load_from_memory(&bytes).expect("decode thumbnail");
        assert_eq!((decoded.width(), decoded.height()), (40, 30));
    }

    #[tokio::test]
    async fn file_target_falls_back_to_direct_decode_for_image_files() {
        let dir = unique_temp_dir("clipingest_thumb_direct");
        let file = dir.join("photo.png");
        write_png(&file, 64, 48);

        let config = ThumbnailConfig::default();
        let bytes = generate(
            Arc::new(ScriptedAccessor::silent()),
            &config,
            ThumbnailTarget::File(file),
        )
        .await
        .expect("direct decode should succeed");

        let decoded = image::load_from_memory(&bytes).expect("decode thumbnail");
        assert_eq!((decoded.width(), decoded.height()), (64, 48));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn preview_timeout_falls_through_to_icon() {
        let accessor = ScriptedAccessor {
            preview: Some(solid_raw_image(100, 100)),
            icon: Some(solid_raw_image(10, 10)),
            preview_delay: Some(Duration::from_millis(200)),
        };

        let config = ThumbnailConfig {
            timeout: Duration::from_millis(20),
            ..ThumbnailConfig::default()
        };
        let bytes = generate(
            Arc::new(accessor),
            &config,
            ThumbnailTarget::File(PathBuf::from("/docs/big.docx")),
        )
        .await
        .expect("icon fallback should produce a thumbnail");

        // 预览超时后应落到 10x10 的图标，而不是 100x100 的预览
        let decoded = image::load_from_memory(&bytes).expect("decode thumbnail");
        assert_eq!((decoded.width(), decoded.height()), (10, 10));
    }

    #[tokio::test]
    async fn exhausted_chain_yields_none() {
        let config = ThumbnailConfig::default();
        let result = generate(
            Arc::new(ScriptedAccessor::silent()),
            &config,
            ThumbnailTarget::File(PathBuf::from("/docs/unknown.bin")),
        )
        .await;
        assert!(result.is_none(), "chain exhaustion is a success state");
    }
}
