//! 默认平台访问实现
//!
//! 跨平台读写统一走 `arboard`，文件列表/图标/预览等平台特有能力
//! 按 `cfg` 委托给同级平台模块；不支持的平台一律返回 `None`。

use std::borrow::Cow;
use std::path::Path;

use crate::capture::{FormatHint, RawCapture, RawImage};

use super::{AppIdentity, PlatformAccessor, ReadFailure};

/// 系统剪贴板访问器
///
/// 无状态；`arboard::Clipboard` 按调用创建，避免跨线程持有平台句柄。
#[derive(Debug, Default)]
pub struct SystemAccessor;

impl SystemAccessor {
    pub fn new() -> Self {
        SystemAccessor
    }

    fn open_clipboard() -> Result<arboard::Clipboard, ReadFailure> {
        arboard::Clipboard::new().map_err(|e| ReadFailure::Unavailable(e.to_string()))
    }
}

impl PlatformAccessor for SystemAccessor {
    fn detect_format(&self) -> FormatHint {
        #[cfg(windows)]
        {
            super::windows::probe_formats()
        }
        #[cfg(not(windows))]
        {
            // 无廉价探测能力的平台向上近似；read_content 给出真值
            FormatHint {
                has_files: false,
                has_image: true,
                has_text: true,
            }
        }
    }

    fn read_content(&self, hint: &FormatHint) -> Result<RawCapture, ReadFailure> {
        let mut capture = RawCapture::default();

        if hint.has_files {
            #[cfg(windows)]
            {
                capture.files = super::windows::read_file_list().unwrap_or_default();
            }
        }

        if capture.files.is_empty() && (hint.has_image || hint.has_text) {
            let mut clipboard = Self::open_clipboard()?;

            if hint.has_image {
                capture.image = clipboard.get_image().ok().map(|data| RawImage {
                    width: data.width,
                    height: data.height,
                    rgba: data.bytes.into_owned(),
                });
            }

            if hint.has_text {
                capture.text = clipboard.get_text().ok();
            }
        }

        Ok(capture)
    }

    fn frontmost_app(&self) -> Option<AppIdentity> {
        #[cfg(windows)]
        {
            super::windows::frontmost_app()
        }
        #[cfg(target_os = "macos")]
        {
            super::macos::frontmost_app()
        }
        #[cfg(not(any(windows, target_os = "macos")))]
        {
            None
        }
    }

    fn app_icon(&self, app: &AppIdentity) -> Option<RawImage> {
        #[cfg(windows)]
        {
            let exe = app.identifier.as_deref()?;
            super::windows::file_type_icon(Path::new(exe))
        }
        #[cfg(not(windows))]
        {
            let _ = app;
            None
        }
    }

    fn document_preview(&self, path: &Path, max_px: u32) -> Option<RawImage> {
        #[cfg(windows)]
        {
            super::windows::document_preview(path, max_px)
        }
        #[cfg(not(windows))]
        {
            let _ = (path, max_px);
            None
        }
    }

    fn file_type_icon(&self, path: &Path) -> Option<RawImage> {
        #[cfg(windows)]
        {
            super::windows::file_type_icon(path)
        }
        #[cfg(not(windows))]
        {
            let _ = path;
            None
        }
    }

    fn write_text(&self, text: &str) -> Result<(), ReadFailure> {
        let mut clipboard = Self::open_clipboard()?;
        clipboard
            .set_text(text.to_string())
            .map_err(|e| ReadFailure::WriteRejected(e.to_string()))
    }

    fn write_image(&self, image: &RawImage) -> Result<(), ReadFailure> {
        let mut clipboard = Self::open_clipboard()?;
        let data = arboard::ImageData {
            width: image.width,
            height: image.height,
            bytes: Cow::Borrowed(&image.rgba),
        };
        clipboard
            .set_image(data)
            .map_err(|e| ReadFailure::WriteRejected(e.to_string()))
    }

    fn write_files(&self, paths: &[String]) -> Result<(), ReadFailure> {
        #[cfg(windows)]
        {
            super::windows::write_file_list(paths)
        }
        #[cfg(not(windows))]
        {
            let _ = paths;
            Err(ReadFailure::WriteRejected(
                "文件列表写回仅在 Windows 上支持".to_string(),
            ))
        }
    }
}
