//! # 解码、缩放与编码流水线
//!
//! ## 设计思路
//!
//! 将“字节 → 图像 → 目标尺寸 → 目标格式字节”的过程集中管理，并在关键节点增加资源上限控制。
//! 优先读取 header 做尺寸检查，再进行完整解码，降低恶意输入触发高内存开销的风险。
//!
//! ## 实现思路
//!
//! 1. 猜测格式并读取 header 尺寸，按像素/内存上限快速拒绝
//! 2. 完整解码
//! 3. 按“先宽后高”的两段式约束计算输出尺寸（只缩小，不放大）
//! 4. `fast_image_resize` 卷积缩放，失败时回退 `image::resize_exact`
//! 5. 按生效格式编码：WebP（`webp`）、JPEG / PNG（`image`）

use fast_image_resize as fr;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, GenericImageView, ImageBuffer, ImageEncoder, ImageReader, Rgba};
use std::io::Cursor;

use super::{ImageConfig, ImageError, ImageNormalizer, TargetFormat};

/// 按请求上限计算输出尺寸，保持原始宽高比。
///
/// 两段式约束：先把超宽的图按宽度缩到 `max_width`；
/// 再独立检查（可能已缩放过的）高度，超高时按高度缩到 `max_height`。
/// 原图已在上限内时尺寸不变，任何情况下都不放大。
///
/// # 示例
/// ```rust
/// use cafe_image_normalizer::image_handler::compute_target_dimensions;
///
/// assert_eq!(compute_target_dimensions(2000, 1000, 800, 800), (800, 400));
/// assert_eq!(compute_target_dimensions(1000, 3000, 800, 800), (267, 800));
/// assert_eq!(compute_target_dimensions(300, 300, 800, 800), (300, 300));
/// ```
pub fn compute_target_dimensions(
    width: u32,
    height: u32,
    max_width: u32,
    max_height: u32,
) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }

    let mut target_width = width as f64;
    let mut target_height = height as f64;

    if target_width > max_width as f64 {
        target_height = target_height * max_width as f64 / target_width;
        target_width = max_width as f64;
    }

    if target_height > max_height as f64 {
        target_width = target_width * max_height as f64 / target_height;
        target_height = max_height as f64;
    }

    let round = |value: f64, bound: u32| (value.round() as u32).clamp(1, bound);
    (round(target_width, width), round(target_height, height))
}

impl ImageNormalizer {
    /// 解码原始字节，解码前先按 header 尺寸校验资源上限。
    pub(crate) fn decode_source(bytes: &[u8], config: &ImageConfig) -> Result<DynamicImage, ImageError> {
        if bytes.is_empty() {
            return Err(ImageError::Decode("图片内容为空".to_string()));
        }

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let (header_width, header_height) = Self::inspect_dimensions_from_memory(bytes)?;
        Self::validate_pixel_limits(config, header_width, header_height)?;
        Self::validate_decoded_memory_limits(config, header_width, header_height)?;

        let decoded = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?
            .decode()
            .map_err(|e| ImageError::Decode(format!("图片解码失败：{}", e)))?;

        let (width, height) = decoded.dimensions();
        if width == 0 || height == 0 {
            return Err(ImageError::Decode(format!("解码结果尺寸异常：{}x{}", width, height)));
        }
        Self::validate_pixel_limits(config, width, height)?;

        Ok(decoded)
    }

    /// 仅通过内存中的图片头信息读取宽高。
    fn inspect_dimensions_from_memory(bytes: &[u8]) -> Result<(u32, u32), ImageError> {
        let reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|e| ImageError::Decode(format!("无法识别图片格式：{}", e)))?;

        if reader.format().is_none() {
            return Err(ImageError::Decode("无法识别图片格式".to_string()));
        }

        reader
            .into_dimensions()
            .map_err(|e| ImageError::Decode(format!("无法读取图片尺寸：{}", e)))
    }

    fn validate_pixel_limits(config: &ImageConfig, width: u32, height: u32) -> Result<(), ImageError> {
        let pixels = (width as u64)
            .checked_mul(height as u64)
            .ok_or_else(|| ImageError::ResourceLimit("图片像素数溢出".to_string()))?;

        if pixels > config.max_decoded_pixels {
            return Err(ImageError::ResourceLimit(format!(
                "图片像素过大：{} 像素（限制：{} 像素）",
                pixels, config.max_decoded_pixels
            )));
        }

        Ok(())
    }

    fn validate_decoded_memory_limits(
        config: &ImageConfig,
        width: u32,
        height: u32,
    ) -> Result<(), ImageError> {
        let estimated = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| ImageError::ResourceLimit("图片解码内存估算溢出".to_string()))?;

        if estimated > config.max_decoded_bytes {
            return Err(ImageError::ResourceLimit(format!(
                "图片解码预计内存过大：{:.2} MB（限制：{:.2} MB）",
                estimated as f64 / 1024.0 / 1024.0,
                config.max_decoded_bytes as f64 / 1024.0 / 1024.0
            )));
        }

        Ok(())
    }

    /// 将图像渲染到目标尺寸；尺寸未变化时原样返回。
    pub(crate) fn resize_surface(
        image: DynamicImage,
        target_width: u32,
        target_height: u32,
        filter: FilterType,
    ) -> Result<DynamicImage, ImageError> {
        if image.dimensions() == (target_width, target_height) {
            return Ok(image);
        }

        let dst_buffer = Self::acquire_surface(target_width, target_height)?;

        match Self::resize_with_fast_image_resize(&image, dst_buffer, target_width, target_height, filter) {
            Ok(resized) => Ok(resized),
            Err(err) => {
                log::warn!(
                    "⚠️ fast_image_resize 缩放失败，回退 image::resize_exact：{}",
                    err
                );
                Ok(image.resize_exact(target_width, target_height, filter))
            }
        }
    }

    /// 申请目标绘制缓冲；内存不足时视为运行环境无法提供绘制表面。
    fn acquire_surface(width: u32, height: u32) -> Result<Vec<u8>, ImageError> {
        let len = (width as usize)
            .checked_mul(height as usize)
            .and_then(|pixels| pixels.checked_mul(4))
            .ok_or_else(|| {
                ImageError::UnsupportedEnvironment(format!("绘制表面尺寸溢出：{}x{}", width, height))
            })?;

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(len).map_err(|e| {
            ImageError::UnsupportedEnvironment(format!(
                "无法申请 {}x{} 绘制表面：{}",
                width, height, e
            ))
        })?;
        buffer.resize(len, 0);
        Ok(buffer)
    }

    fn resize_with_fast_image_resize(
        image: &DynamicImage,
        dst_buffer: Vec<u8>,
        target_width: u32,
        target_height: u32,
        filter: FilterType,
    ) -> Result<DynamicImage, ImageError> {
        let src = image.to_rgba8();
        let (src_width, src_height) = src.dimensions();

        let src_image = fr::images::Image::from_vec_u8(
            src_width,
            src_height,
            src.into_raw(),
            fr::PixelType::U8x4,
        )
        .map_err(|e| ImageError::UnsupportedEnvironment(format!("构建源图像缓冲失败：{}", e)))?;

        let mut dst_image =
            fr::images::Image::from_vec_u8(target_width, target_height, dst_buffer, fr::PixelType::U8x4)
                .map_err(|e| ImageError::UnsupportedEnvironment(format!("构建目标缓冲失败：{}", e)))?;

        let mut resizer = fr::Resizer::new();
        let options = fr::ResizeOptions::new().resize_alg(fr::ResizeAlg::Convolution(
            Self::to_fast_filter(filter),
        ));

        resizer
            .resize(&src_image, &mut dst_image, Some(&options))
            .map_err(|e| ImageError::UnsupportedEnvironment(format!("fast_image_resize 执行失败：{}", e)))?;

        let rgba = ImageBuffer::<Rgba<u8>, Vec<u8>>::from_raw(
            target_width,
            target_height,
            dst_image.into_vec(),
        )
        .ok_or_else(|| ImageError::UnsupportedEnvironment("fast_image_resize 输出缓冲长度异常".to_string()))?;

        let resized = DynamicImage::ImageRgba8(rgba);
        if image.color().has_alpha() {
            Ok(resized)
        } else {
            Ok(DynamicImage::ImageRgb8(resized.to_rgb8()))
        }
    }

    fn to_fast_filter(filter: FilterType) -> fr::FilterType {
        match filter {
            FilterType::Nearest => fr::FilterType::Box,
            FilterType::Triangle => fr::FilterType::Bilinear,
            FilterType::CatmullRom => fr::FilterType::CatmullRom,
            FilterType::Gaussian => fr::FilterType::Mitchell,
            FilterType::Lanczos3 => fr::FilterType::Lanczos3,
        }
    }

    /// 按生效格式编码；质量参数对无损格式无效。
    pub(crate) fn encode_surface(
        image: &DynamicImage,
        format: TargetFormat,
        quality: f32,
    ) -> Result<Vec<u8>, ImageError> {
        let (width, height) = image.dimensions();

        let bytes = match format {
            TargetFormat::Webp => {
                let webp_quality = (quality * 100.0).clamp(0.0, 100.0);
                let encoded = if image.color().has_alpha() {
                    let rgba = image.to_rgba8();
                    webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                        .encode_simple(false, webp_quality)
                        .map(|memory| memory.to_vec())
                } else {
                    let rgb = image.to_rgb8();
                    webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                        .encode_simple(false, webp_quality)
                        .map(|memory| memory.to_vec())
                };
                encoded.map_err(|e| ImageError::Encode(format!("WebP 编码失败：{:?}", e)))?
            }
            TargetFormat::Jpeg => {
                let rgb = image.to_rgb8();
                let mut buffer = Vec::new();
                JpegEncoder::new_with_quality(&mut buffer, Self::jpeg_quality(quality))
                    .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
                    .map_err(|e| ImageError::Encode(format!("JPEG 编码失败：{}", e)))?;
                buffer
            }
            TargetFormat::Png => {
                let rgba = image.to_rgba8();
                let mut buffer = Vec::new();
                PngEncoder::new(&mut buffer)
                    .write_image(rgba.as_raw(), width, height, ExtendedColorType::Rgba8)
                    .map_err(|e| ImageError::Encode(format!("PNG 编码失败：{}", e)))?;
                buffer
            }
        };

        if bytes.is_empty() {
            return Err(ImageError::Encode(format!("{} 编码器输出为空", format)));
        }

        Ok(bytes)
    }

    fn jpeg_quality(quality: f32) -> u8 {
        ((quality * 100.0).round() as u8).clamp(1, 100)
    }
}
