//! 剪贴板内容分类模块
//!
//! # 设计思路
//!
//! 同一次复制操作往往会在系统剪贴板上同时留下多种表示
//! （例如复制文件时既有文件列表又有路径文本），分类器必须用
//! 固定的优先级消解歧义，保证各平台行为一致：
//!
//! **文件列表 > 图片 > 文本**，其中链接是对文本分类结果的二次
//! 细化（URL 形态的单行文本重新标记为 `Link`），音频是文件列表
//! 分支内按扩展名识别的特化，不构成独立优先级。
//!
//! # 实现思路
//!
//! - `RawCapture` 是平台访问层一次物化读取的原始结果。
//! - `classify` 是纯函数：输入原始读取，输出恰好一个
//!   `CapturedContent` 变体，或 `None`（本轮无可入库内容）。
//! - URL 识别使用预编译正则（`once_cell::Lazy`），只接受单行、
//!   无空白的 http/https 形态。

pub mod fingerprint;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

// ============================================================================
// 原始读取结果
// ============================================================================

/// 原始像素图（arboard 布局：RGBA，每像素 4 字节，行优先）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawImage {
    pub width: usize,
    pub height: usize,
    pub rgba: Vec<u8>,
}

impl RawImage {
    /// 像素缓冲长度与宽高是否一致
    pub fn is_well_formed(&self) -> bool {
        self.width
            .checked_mul(self.height)
            .and_then(|pixels| pixels.checked_mul(4))
            .map(|expected| expected == self.rgba.len() && expected > 0)
            .unwrap_or(false)
    }
}

/// 廉价探测结果：当前剪贴板上各表示是否存在
///
/// 由平台访问层的 `detect_format` 返回，不物化任何内容。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FormatHint {
    pub has_files: bool,
    pub has_image: bool,
    pub has_text: bool,
}

impl FormatHint {
    pub fn is_empty(&self) -> bool {
        !self.has_files && !self.has_image && !self.has_text
    }
}

/// 一次物化读取的全部原始表示
///
/// 分类器只消费此结构，不直接接触平台 API。
#[derive(Debug, Default)]
pub struct RawCapture {
    pub files: Vec<String>,
    pub image: Option<RawImage>,
    pub text: Option<String>,
}

// ============================================================================
// 分类结果
// ============================================================================

/// 分类后的剪贴板内容，每次剪贴板事件恰好产生一个变体
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CapturedContent {
    Text(String),
    Image(RawImage),
    Files(Vec<String>),
    Link(String),
    Audio(Vec<String>),
}

/// 内容类别，持久化到数据库的 `kind` 列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Text,
    Image,
    Files,
    Link,
    Audio,
}

impl ContentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentKind::Text => "text",
            ContentKind::Image => "image",
            ContentKind::Files => "files",
            ContentKind::Link => "link",
            ContentKind::Audio => "audio",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "text" => Some(ContentKind::Text),
            "image" => Some(ContentKind::Image),
            "files" => Some(ContentKind::Files),
            "link" => Some(ContentKind::Link),
            "audio" => Some(ContentKind::Audio),
            _ => None,
        }
    }
}

impl CapturedContent {
    pub fn kind(&self) -> ContentKind {
        match self {
            CapturedContent::Text(_) => ContentKind::Text,
            CapturedContent::Image(_) => ContentKind::Image,
            CapturedContent::Files(_) => ContentKind::Files,
            CapturedContent::Link(_) => ContentKind::Link,
            CapturedContent::Audio(_) => ContentKind::Audio,
        }
    }

    /// 是否有资格生成缩略图（图片与文件类条目）
    pub fn wants_thumbnail(&self) -> bool {
        matches!(
            self,
            CapturedContent::Image(_) | CapturedContent::Files(_) | CapturedContent::Audio(_)
        )
    }
}

// ============================================================================
// 分类
// ============================================================================

/// 音频扩展名集合，文件列表分支内的特化判断
const AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "wav", "flac", "ogg", "oga", "m4a", "aac", "wma", "aif", "aiff", "opus",
];

/// URL 形态：单行、无空白的 http/https 文本
static LINK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://\S+$").expect("链接正则编译失败")
});

fn has_audio_extension(path: &str) -> bool {
    std::path::Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let lower = ext.to_ascii_lowercase();
            AUDIO_EXTENSIONS.contains(&lower.as_str())
        })
        .unwrap_or(false)
}

fn is_link_shaped(text: &str) -> bool {
    LINK_PATTERN.is_match(text)
}

/// 对一次原始读取做分类，返回恰好一个内容变体
///
/// 返回 `None` 表示本轮无可入库内容（空文本、畸形图片等），
/// 调用方应静默跳过本轮，这是正常环境条件而非错误。
pub fn classify(raw: RawCapture) -> Option<CapturedContent> {
    // 文件列表优先：同一选区的文件表示不能被降级为路径文本
    if !raw.files.is_empty() {
        let all_audio = raw.files.iter().all(|path| has_audio_extension(path));
        if all_audio {
            return Some(CapturedContent::Audio(raw.files));
        }
        return Some(CapturedContent::Files(raw.files));
    }

    if let Some(image) = raw.image {
        if image.is_well_formed() {
            return Some(CapturedContent::Image(image));
        }
        log::debug!(
            "🚫 图片缓冲与宽高不一致 ({}x{}, {} 字节)，跳过本轮",
            image.width,
            image.height,
            image.rgba.len()
        );
        return None;
    }

    if let Some(text) = raw.text {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return None;
        }
        if is_link_shaped(trimmed) {
            return Some(CapturedContent::Link(trimmed.to_string()));
        }
        return Some(CapturedContent::Text(trimmed.to_string()));
    }

    None
}
