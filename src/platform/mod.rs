//! 平台剪贴板访问层
//!
//! # 设计思路
//!
//! 核心逻辑绝不按平台分支，只面向一个能力接口编程：能力缺失
//! （无前台窗口、无图标、权限被拒）一律以 `None` 表达，是正常
//! 结果而非错误。各平台实现（Windows 原生 API、macOS Cocoa、
//! 其余平台 arboard 通用路径）对上层完全透明。
//!
//! # 实现思路
//!
//! - `PlatformAccessor` 为 `Send + Sync` 的对象安全 trait，
//!   所有方法都是有界时长的同步调用；需要超时保护的调用方
//!   （缩略图链路）自行用 `spawn_blocking` + `timeout` 包裹。
//! - `SystemAccessor` 是默认实现：跨平台部分走 `arboard`，
//!   平台特有部分（文件列表、图标、文档预览）按 `cfg` 委托
//!   给 `windows` / `macos` 子模块。

mod system;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(windows)]
mod windows;

pub use system::SystemAccessor;

use std::path::Path;

use crate::capture::{FormatHint, RawCapture, RawImage};

/// 前台应用标识
///
/// `identifier` 在 Windows 上是可执行文件路径，在 macOS 上是
/// bundle identifier；用作图标缓存键。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppIdentity {
    pub name: String,
    pub identifier: Option<String>,
}

impl AppIdentity {
    /// 图标缓存键：优先用稳定标识，回退到名称
    pub fn cache_key(&self) -> String {
        self.identifier
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }
}

/// 剪贴板读写失败
///
/// 仅覆盖"剪贴板整体不可用"的情况；单个表示缺失不构成失败。
#[derive(Debug, thiserror::Error)]
pub enum ReadFailure {
    /// 剪贴板被其他应用占用或平台拒绝访问
    #[error("剪贴板不可用: {0}")]
    Unavailable(String),

    /// 写回操作失败
    #[error("剪贴板写入失败: {0}")]
    WriteRejected(String),
}

/// 平台剪贴板能力接口
///
/// 探测（`detect_format`）允许向上近似：能力贫乏的平台可以报告
/// "可能存在"，由 `read_content` 的物化结果给出真值。
pub trait PlatformAccessor: Send + Sync {
    /// 廉价探测当前剪贴板上的表示，不物化内容
    fn detect_format(&self) -> FormatHint;

    /// 按探测结果物化内容
    ///
    /// 单个表示读取失败记为缺失；仅当剪贴板整体无法访问时返回 `Err`。
    fn read_content(&self, hint: &FormatHint) -> Result<RawCapture, ReadFailure>;

    /// 当前前台应用标识，尽力而为
    fn frontmost_app(&self) -> Option<AppIdentity>;

    /// 提取应用图标，与标识查询相互独立地可失败
    fn app_icon(&self, app: &AppIdentity) -> Option<RawImage>;

    /// 平台原生文档预览服务（文档、媒体等多种文件类型）
    fn document_preview(&self, path: &Path, max_px: u32) -> Option<RawImage>;

    /// 平台通用文件类型图标，预览链路的最终兜底
    fn file_type_icon(&self, path: &Path) -> Option<RawImage>;

    /// 将文本写回系统剪贴板（copy-back 专用，不经过采集管线）
    fn write_text(&self, text: &str) -> Result<(), ReadFailure>;

    /// 将图片写回系统剪贴板
    fn write_image(&self, image: &RawImage) -> Result<(), ReadFailure>;

    /// 将文件列表写回系统剪贴板（平台不支持时返回 `Err`）
    fn write_files(&self, paths: &[String]) -> Result<(), ReadFailure>;
}

/// 无能力访问器：所有平台能力按缺失处理
///
/// 用于无头环境（CI、服务器）与测试。探测恒为空，读取恒为空，
/// 写回静默丢弃——与"能力缺失是正常结果"的契约一致。
#[derive(Debug, Default)]
pub struct NullAccessor;

impl PlatformAccessor for NullAccessor {
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
        None
    }

    fn file_type_icon(&self, _path: &Path) -> Option<RawImage> {
        None
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
