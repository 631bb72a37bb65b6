//! # 解码与缩放流水线
//!
//! ## 设计思路
//!
//! 将"字节 → 图像 → 缩略图 PNG"的过程集中管理。降采样优先走
//! `fast_image_resize`，失败时回退 `image::resize`，保证链路不因
//! 缩放实现问题而中断。
//!
//! ## 实现思路
//!
//! 1. `infer` 嗅探字节是否为图片（文件兜底解码前的防护）
//! 2. 解码为 `DynamicImage`
//! 3. 超过最长边上限时按比例降采样（只缩不放）
//! 4. 编码为 PNG 字节

use std::io::Cursor;

use fast_image_resize as fr;
use image::{DynamicImage, GenericImageView, ImageBuffer, Rgba};

use crate::capture::RawImage;

use super::ThumbnailError;

/// 字节流是否呈现图片特征
pub(super) fn sniff_is_image(bytes: &[u8]) -> bool {
    infer::get(bytes)
        .map(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .unwrap_or(false)
}

pub(super) fn decode_bytes(bytes: &[u8]) -> Result<DynamicImage, ThumbnailError> {
    image::load_from_memory(bytes)
        .map_err(|e| ThumbnailError::Decode(format!("图片解码失败：{}", e)))
}

/// 原始像素缓冲转 `DynamicImage`
pub(super) fn raw_to_dynamic(raw: &RawImage) -> Result<DynamicImage, ThumbnailError> {
    let buffer = image::RgbaImage::from_raw(
        raw.width as u32,
        raw.height as u32,
        raw.rgba.clone(),
    )
    .ok_or_else(|| ThumbnailError::Decode("像素缓冲与宽高不一致".to_string()))?;
    Ok(DynamicImage::ImageRgba8(buffer))
}

/// 按最长边上限降采样；尺寸已达标时原样返回
pub(super) fn downscale(
    image: DynamicImage,
    max_dimension: u32,
) -> Result<DynamicImage, ThumbnailError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(ThumbnailError::Decode("图片尺寸为零".to_string()));
    }
    if width <= max_dimension && height <= max_dimension {
        return Ok(image);
    }

    let scale = (max_dimension as f64 / width as f64).min(max_dimension as f64 / height as f64);
    let target_width = ((width as f64 * scale).floor() as u32).max(1);
    let target_height = ((height as f64 * scale).floor() as u32).max(1);

    match resize_with_fast_image_resize(&image, target_width, target_height) {
        Ok(resized) => Ok(resized),
        Err(err) => {
            log::warn!("⚠️ fast_image_resize 降采样失败，回退 image::resize_exact：{}", err);
            Ok(image.resize_exact(
                target_width,
                target_height,
                image::imageops::FilterType::Lanczos3,
            ))
        }
    }
}

fn resize_with_fast_image_resize(
    image: &DynamicImage,
    target_width: u32,
    target_height: u32,
) -> Result<DynamicImage, ThumbnailError> {
    let src = image.to_rgba8();
    let (src_width, src_height) = src.dimensions();

    let src_image = fr::images::Image::from_vec_u8(
        src_width,
        src_height,
        src.into_raw(),
        fr::PixelType::U8x4,
    )
    .map_err(|e| ThumbnailError::Decode(format!("构建源图像缓冲失败：{}", e)))?;

    let mut dst_image = fr::images::Image::new(target_width, target_height, fr::PixelType::U8x4);

    let mut resizer = fr::Resizer::new();
    let options = fr::ResizeOptions::new()
        .resize_alg(fr::ResizeAlg::Convolution(fr::FilterType::Lanczos3));

    resizer
        .resize(&src_image, &mut dst_image, Some(&options))
        .map_err(|e| ThumbnailError::Decode(format!("fast_image_resize 执行失败：{}", e)))?;

    let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
        target_width,
        target_height,
        dst_image.into_vec(),
    )
    .ok_or_else(|| ThumbnailError::Decode("fast_image_resize 输出缓冲长度异常".to_string()))?;

    Ok(DynamicImage::ImageRgba8(rgba))
}

pub(super) fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ThumbnailError> {
    let mut buf = Cursor::new(Vec::new());
    image
        .write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| ThumbnailError::Encode(format!("编码 PNG 失败：{}", e)))?;
    Ok(buf.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker_image(width: u32, height: u32) -> DynamicImage {
        let buffer = image::RgbaImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                image::Rgba([255, 255, 255, 255])
            } else {
                image::Rgba([0, 0, 0, 255])
            }
        });
        DynamicImage::ImageRgba8(buffer)
    }

    #[test]
    fn downscale_respects_max_dimension() {
        let image = checker_image(640, 480);
        let scaled = downscale(image, 128).expect("downscale");
        let (w, h) = scaled.dimensions();
        assert!(w <= 128 && h <= 128);
        assert_eq!(w, 128, "landscape image scales by its longer edge");
    }

    #[test]
    fn downscale_keeps_small_images_untouched() {
        let image = checker_image(64, 32);
        let scaled = downscale(image, 128).expect("downscale");
        assert_eq!(scaled.dimensions(), (64, 32));
    }

    #[test]
    fn encode_then_decode_roundtrip_keeps_dimensions() {
        let image = checker_image(20, 10);
        let bytes = encode_png(&image).expect("encode");
        assert!(sniff_is_image(&bytes));
        let decoded = decode_bytes(&bytes).expect("decode");
        assert_eq!(decoded.dimensions(), (20, 10));
    }

    #[test]
    fn raw_to_dynamic_rejects_inconsistent_buffer() {
        let raw = RawImage {
            width: 4,
            height: 4,
            rgba: vec![0u8; 10],
        };
        assert!(raw_to_dynamic(&raw).is_err());
    }

    #[test]
    fn sniff_rejects_text_bytes() {
        assert!(!sniff_is_image(b"hello clipboard"));
    }
}
