//! 内容指纹模块
//!
//! # 设计思路
//!
//! 指纹是剪贴板内容的确定性等值键：同一内容哪怕隔几分钟再次复制，
//! 也必须得到完全相同的指纹。去重/置顶引擎只比较指纹，不比较原始
//! 负载。
//!
//! - 文本/链接：精确字节等值。
//! - 图片：宽高 + 原始像素字节等值（精确去重，不做感知哈希）。
//! - 文件/音频列表：顺序敏感的路径列表等值，保持"首个文件"语义。
//!
//! # 实现思路
//!
//! blake3 对域标签 + 定界编码取摘要，十六进制字符串入库。
//! 纯函数，无 I/O，无时钟。

use super::CapturedContent;

/// 内容等值键（blake3 摘要的十六进制表示）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

fn hash_paths(hasher: &mut blake3::Hasher, paths: &[String]) {
    for path in paths {
        hasher.update(path.as_bytes());
        // 定界符防止 ["ab","c"] 与 ["a","bc"] 同值
        hasher.update(b"\0");
    }
}

/// 计算一个内容变体的指纹
///
/// 域标签保证不同变体不会因负载巧合而碰撞
/// （例如路径文本与单元素文件列表）。
pub fn fingerprint(content: &CapturedContent) -> Fingerprint {
    let mut hasher = blake3::Hasher::new();
    match content {
        CapturedContent::Text(text) => {
            hasher.update(b"text\0");
            hasher.update(text.as_bytes());
        }
        CapturedContent::Link(url) => {
            hasher.update(b"link\0");
            hasher.update(url.as_bytes());
        }
        CapturedContent::Image(image) => {
            hasher.update(b"image\0");
            hasher.update(&(image.width as u64).to_le_bytes());
            hasher.update(&(image.height as u64).to_le_bytes());
            hasher.update(&image.rgba);
        }
        CapturedContent::Files(paths) => {
            hasher.update(b"files\0");
            hash_paths(&mut hasher, paths);
        }
        CapturedContent::Audio(paths) => {
            hasher.update(b"audio\0");
            hash_paths(&mut hasher, paths);
        }
    }
    Fingerprint(hasher.finalize().to_hex().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::RawImage;
    use proptest::prelude::*;

    #[test]
    fn identical_text_yields_identical_fingerprint() {
        let a = fingerprint(&CapturedContent::Text("hello".to_string()));
        let b = fingerprint(&CapturedContent::Text("hello".to_string()));
        assert_eq!(a, b);
    }

    #[test]
    fn text_and_link_with_same_payload_differ() {
        let text = fingerprint(&CapturedContent::Text("https://a.example".to_string()));
        let link = fingerprint(&CapturedContent::Link("https://a.example".to_string()));
        assert_ne!(text, link);
    }

    #[test]
    fn path_list_is_order_sensitive() {
        let ab = fingerprint(&CapturedContent::Files(vec![
            "/x/a.png".to_string(),
            "/x/b.txt".to_string(),
        ]));
        let ba = fingerprint(&CapturedContent::Files(vec![
            "/x/b.txt".to_string(),
            "/x/a.png".to_string(),
        ]));
        assert_ne!(ab, ba);
    }

    #[test]
    fn path_boundaries_do_not_collide() {
        let split_one_way = fingerprint(&CapturedContent::Files(vec![
            "ab".to_string(),
            "c".to_string(),
        ]));
        let split_other_way = fingerprint(&CapturedContent::Files(vec![
            "a".to_string(),
            "bc".to_string(),
        ]));
        assert_ne!(split_one_way, split_other_way);
    }

    #[test]
    fn single_pixel_change_changes_image_fingerprint() {
        let mut rgba = vec![10u8; 16];
        let base = fingerprint(&CapturedContent::Image(RawImage {
            width: 2,
            height: 2,
            rgba: rgba.clone(),
        }));
        rgba[5] ^= 0xFF;
        let changed = fingerprint(&CapturedContent::Image(RawImage {
            width: 2,
            height: 2,
            rgba,
        }));
        assert_ne!(base, changed);
    }

    proptest! {
        #[test]
        fn fingerprint_is_deterministic_for_text(s in ".*") {
            let first = fingerprint(&CapturedContent::Text(s.clone()));
            let second = fingerprint(&CapturedContent::Text(s));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn fingerprint_is_deterministic_for_path_lists(
            paths in proptest::collection::vec("[a-zA-Z0-9/._-]{1,32}", 0..8)
        ) {
            let first = fingerprint(&CapturedContent::Files(paths.clone()));
            let second = fingerprint(&CapturedContent::Files(paths));
            prop_assert_eq!(first, second);
        }

        #[test]
        fn different_text_rarely_collides(a in ".{1,64}", b in ".{1,64}") {
            prop_assume!(a != b);
            let fa = fingerprint(&CapturedContent::Text(a));
            let fb = fingerprint(&CapturedContent::Text(b));
            prop_assert_ne!(fa, fb);
        }
    }
}
