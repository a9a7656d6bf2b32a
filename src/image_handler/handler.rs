//! # 核心编排模块
//!
//! ## 设计思路
//!
//! `ImageNormalizer` 只负责流程编排与配置管理，不关心图片从哪里来、最终传到哪里去。
//! 处理链路固定为：
//! 1. 校验请求 + 读取配置快照
//! 2. 协商生效格式（WebP 不可用时回退 JPEG）
//! 3. 解码 → 计算尺寸 → 缩放 → 编码
//! 4. 合成新文件名并输出压缩报告
//!
//! ## 实现思路
//!
//! - 配置通过 `Arc<RwLock<ImageConfig>>` 支持运行时动态切档。
//! - 单次请求内使用“同一配置快照”，避免处理中途配置漂移。
//! - 失败一律返回 `ImageError`，不会返回空或损坏的数据；
//!   `normalize_or_original` 封装了“失败就上传原图”的调用方回退策略。
//! - 记录 `decode/resize/encode/total` 阶段耗时，便于性能诊断。

use std::sync::{Arc, RwLock};
use std::time::Instant;

use bytes::Bytes;
use serde::Serialize;

use super::format::{format_size, output_file_name};
use super::pipeline::compute_target_dimensions;
use super::probe::CapabilityProbe;
use super::{
    CompressionRequest, ImageConfig, ImageError, ImagePerformanceProfile, NormalizedImage,
    SourceImage, TargetFormat, UploadFile,
};

/// 图片压缩器。
///
/// 克隆开销很小：配置与能力探测器都在 `Arc` 内共享。
#[derive(Debug, Clone)]
pub struct ImageNormalizer {
    pub(super) config: Arc<RwLock<ImageConfig>>,
    pub(super) probe: Arc<CapabilityProbe>,
}

/// 单次压缩的诊断记录，仅用于观测，不影响控制流。
///
/// 随 `NormalizedImage::report` 返回，调用方可序列化后另行上报。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompressionReport {
    pub original_size: u64,
    pub compressed_size: u64,
    pub saved_percent: f64,
    pub width: u32,
    pub height: u32,
    pub format: TargetFormat,
}

impl CompressionReport {
    pub fn new(original_size: u64, compressed_size: u64, width: u32, height: u32, format: TargetFormat) -> Self {
        let saved_percent = if original_size == 0 {
            0.0
        } else {
            let ratio = 1.0 - compressed_size as f64 / original_size as f64;
            (ratio * 1000.0).round() / 10.0
        };

        Self {
            original_size,
            compressed_size,
            saved_percent,
            width,
            height,
            format,
        }
    }
}

/// 调用方回退策略的结果。
#[derive(Debug)]
pub enum NormalizeOutcome {
    /// 压缩成功。
    Compressed(NormalizedImage),
    /// 压缩失败，沿用未修改的原图。
    Original { source: SourceImage, error: ImageError },
}

impl NormalizeOutcome {
    pub fn is_compressed(&self) -> bool {
        matches!(self, Self::Compressed(_))
    }

    /// 转换为待上传文件；回退时名称、类型与字节都与原图完全一致。
    pub fn into_upload(self) -> UploadFile {
        match self {
            Self::Compressed(image) => image.into(),
            Self::Original { source, .. } => source.into(),
        }
    }
}

impl ImageNormalizer {
    /// 使用进程级共享的 WebP 能力探测器创建压缩器。
    ///
    /// # 示例
    /// ```rust
    /// use cafe_image_normalizer::image_handler::{ImageConfig, ImageNormalizer};
    ///
    /// let normalizer = ImageNormalizer::new(ImageConfig::default());
    /// let _profile = normalizer.get_performance_profile()?;
    /// # Ok::<(), cafe_image_normalizer::image_handler::ImageError>(())
    /// ```
    pub fn new(config: ImageConfig) -> Self {
        Self::with_probe(config, CapabilityProbe::shared())
    }

    /// 注入自定义能力探测器，主要用于测试。
    pub fn with_probe(config: ImageConfig, probe: Arc<CapabilityProbe>) -> Self {
        Self {
            config: Arc::new(RwLock::new(config)),
            probe,
        }
    }

    /// 获取配置快照，保证单次请求链路使用一致参数。
    pub fn config_snapshot(&self) -> Result<ImageConfig, ImageError> {
        self.config
            .read()
            .map(|cfg| cfg.clone())
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))
    }

    /// 设置性能档位。
    pub fn set_performance_profile(&self, profile: ImagePerformanceProfile) -> Result<(), ImageError> {
        let mut config = self
            .config
            .write()
            .map_err(|_| ImageError::ResourceLimit("配置写入锁已中毒".to_string()))?;
        config.apply_performance_profile(profile);

        log::info!(
            "⚙️ 已切换图片性能档位：{:?}（filter={:?}）",
            profile,
            config.resize_filter
        );

        Ok(())
    }

    /// 获取当前生效档位。
    pub fn get_performance_profile(&self) -> Result<ImagePerformanceProfile, ImageError> {
        let config = self
            .config
            .read()
            .map_err(|_| ImageError::ResourceLimit("配置读取锁已中毒".to_string()))?;
        Ok(config.infer_performance_profile())
    }

    /// 协商生效格式。
    ///
    /// 只有请求 WebP 时才会查询能力探测器；JPEG / PNG 原样通过。
    pub fn effective_format(&self, requested: TargetFormat) -> TargetFormat {
        match requested {
            TargetFormat::Webp if !self.probe.is_supported() => TargetFormat::Jpeg,
            other => other,
        }
    }

    /// 压缩主入口（同步）。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use cafe_image_normalizer::image_handler::{
    ///     CompressionRequest, ImageConfig, ImageNormalizer, SourceImage,
    /// };
    ///
    /// let normalizer = ImageNormalizer::new(ImageConfig::default());
    /// let source = SourceImage::from_file("menu/latte.jpg", &ImageConfig::default())?;
    /// let normalized = normalizer.normalize(&source, &CompressionRequest::default())?;
    /// assert!(normalized.width <= 800 && normalized.height <= 800);
    /// # Ok::<(), cafe_image_normalizer::image_handler::ImageError>(())
    /// ```
    pub fn normalize(
        &self,
        source: &SourceImage,
        request: &CompressionRequest,
    ) -> Result<NormalizedImage, ImageError> {
        request.validate()?;
        let config = self.config_snapshot()?;
        let total_start = Instant::now();

        let format = self.effective_format(request.target_format());
        if format != request.target_format() {
            log::debug!("目标格式 {} 不可用，改用 {}", request.target_format(), format);
        }

        let decode_start = Instant::now();
        let decoded = Self::decode_source(&source.bytes, &config)?;
        let (native_width, native_height) = (decoded.width(), decoded.height());
        let decode_elapsed = decode_start.elapsed();

        let (width, height) = compute_target_dimensions(
            native_width,
            native_height,
            request.max_width(),
            request.max_height(),
        );

        let resize_start = Instant::now();
        let resized = Self::resize_surface(decoded, width, height, config.resize_filter)?;
        let resize_elapsed = resize_start.elapsed();

        let encode_start = Instant::now();
        let encoded = Self::encode_surface(&resized, format, request.quality())?;
        let encode_elapsed = encode_start.elapsed();

        let name = output_file_name(&source.name, format, chrono::Utc::now().timestamp_millis());
        let report = CompressionReport::new(
            source.len() as u64,
            encoded.len() as u64,
            width,
            height,
            format,
        );

        log::info!(
            "✅ 图片压缩完成 - {} -> {}（节省 {}%）尺寸: {}x{} -> {}x{} 格式: {}",
            format_size(report.original_size),
            format_size(report.compressed_size),
            report.saved_percent,
            native_width,
            native_height,
            width,
            height,
            format
        );
        log::debug!(
            "图片压缩耗时 - decode={}ms resize={}ms encode={}ms total={}ms",
            decode_elapsed.as_millis(),
            resize_elapsed.as_millis(),
            encode_elapsed.as_millis(),
            total_start.elapsed().as_millis()
        );

        Ok(NormalizedImage {
            name,
            mime_type: format.mime_type().to_string(),
            bytes: Bytes::from(encoded),
            width,
            height,
            report,
        })
    }

    /// 在 tokio 阻塞线程池中执行压缩，避免阻塞异步调度线程。
    pub async fn normalize_async(
        &self,
        source: &SourceImage,
        request: &CompressionRequest,
    ) -> Result<NormalizedImage, ImageError> {
        let normalizer = self.clone();
        let source = source.clone();
        let request = *request;

        tokio::task::spawn_blocking(move || normalizer.normalize(&source, &request))
            .await
            .map_err(|e| ImageError::UnsupportedEnvironment(format!("压缩线程执行失败：{}", e)))?
    }

    /// 压缩失败时回退为原图。
    ///
    /// 所有压缩内部错误只记录日志，不再向上抛出。
    pub async fn normalize_or_original(
        &self,
        source: SourceImage,
        request: &CompressionRequest,
    ) -> NormalizeOutcome {
        match self.normalize_async(&source, request).await {
            Ok(image) => NormalizeOutcome::Compressed(image),
            Err(error) => {
                log::warn!(
                    "⚠️ 图片压缩失败，回退上传原图 - 文件: {} code={} stage={}：{}",
                    source.name,
                    error.code(),
                    error.stage(),
                    error
                );
                NormalizeOutcome::Original { source, error }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
    use std::io::Cursor;

    fn always_supported() -> bool {
        true
    }

    fn never_supported() -> bool {
        false
    }

    fn normalizer(check: fn() -> bool) -> ImageNormalizer {
        ImageNormalizer::with_probe(ImageConfig::default(), Arc::new(CapabilityProbe::new(check)))
    }

    fn create_png_bytes(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgba([(x % 255) as u8, (y % 255) as u8, ((x + y) % 255) as u8, 255])
        });

        let mut cursor = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut cursor, ImageFormat::Png)
            .expect("failed to encode test image");
        cursor.into_inner()
    }

    #[test]
    fn webp_request_falls_back_to_jpeg_when_unsupported() {
        let normalizer = normalizer(never_supported);

        for _ in 0..3 {
            assert_eq!(normalizer.effective_format(TargetFormat::Webp), TargetFormat::Jpeg);
        }
        assert_eq!(normalizer.effective_format(TargetFormat::Png), TargetFormat::Png);
        assert_eq!(normalizer.effective_format(TargetFormat::Jpeg), TargetFormat::Jpeg);
    }

    #[test]
    fn non_webp_requests_do_not_trigger_probe() {
        let probe = Arc::new(CapabilityProbe::new(never_supported));
        let normalizer = ImageNormalizer::with_probe(ImageConfig::default(), Arc::clone(&probe));

        normalizer.effective_format(TargetFormat::Png);
        normalizer.effective_format(TargetFormat::Jpeg);
        assert!(!probe.is_probed());
    }

    #[test]
    fn normalize_downscales_and_renames() {
        let normalizer = normalizer(always_supported);
        let source = SourceImage::new("espresso.png", "image/png", create_png_bytes(1200, 600));

        let normalized = normalizer
            .normalize(&source, &CompressionRequest::default())
            .expect("normalize should succeed");

        assert_eq!((normalized.width, normalized.height), (800, 400));
        assert_eq!(normalized.mime_type, "image/webp");
        assert!(normalized.name.starts_with("espresso_"));
        assert!(normalized.name.ends_with(".webp"));
        assert!(!normalized.is_empty());
    }

    #[test]
    fn normalize_uses_jpeg_when_probe_fails() {
        let normalizer = normalizer(never_supported);
        let source = SourceImage::new("muffin.png", "image/png", create_png_bytes(100, 100));

        let normalized = normalizer
            .normalize(&source, &CompressionRequest::default())
            .expect("normalize should succeed");

        assert_eq!(normalized.mime_type, "image/jpeg");
        assert!(normalized.name.ends_with(".jpg"));
        assert_eq!(image::guess_format(&normalized.bytes).ok(), Some(ImageFormat::Jpeg));
    }

    #[test]
    fn normalize_rejects_invalid_request_before_decoding() {
        let normalizer = normalizer(always_supported);
        let source = SourceImage::new("bad.bin", "image/png", vec![0u8; 4]);
        let request = CompressionRequest::default().with_quality(2.0);

        let result = normalizer.normalize(&source, &request);
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn performance_profile_switches_at_runtime() {
        let normalizer = normalizer(always_supported);
        normalizer
            .set_performance_profile(ImagePerformanceProfile::Quality)
            .expect("set profile failed");

        assert_eq!(
            normalizer.get_performance_profile().expect("get profile failed"),
            ImagePerformanceProfile::Quality
        );
    }

    #[test]
    fn report_computes_saved_percentage() {
        let report = CompressionReport::new(1000, 250, 800, 400, TargetFormat::Webp);
        assert!((report.saved_percent - 75.0).abs() < f64::EPSILON);

        let empty = CompressionReport::new(0, 10, 1, 1, TargetFormat::Png);
        assert_eq!(empty.saved_percent, 0.0);
    }

    #[tokio::test]
    async fn fallback_outcome_returns_untouched_source() {
        let normalizer = normalizer(always_supported);
        let source = SourceImage::new("broken.jpg", "image/jpeg", b"\xFF\xD8 truncated".to_vec());

        let outcome = normalizer
            .normalize_or_original(source.clone(), &CompressionRequest::default())
            .await;

        assert!(!outcome.is_compressed());
        let upload = outcome.into_upload();
        assert_eq!(upload.name, source.name);
        assert_eq!(upload.mime_type, source.mime_type);
        assert_eq!(upload.bytes, source.bytes);
    }
}
