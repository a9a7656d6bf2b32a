//! # 配置模块
//!
//! ## 设计思路
//!
//! 将所有“可调策略”集中管理，分成两层：
//! - `CompressionRequest`：单次压缩的目标约束（尺寸上限、质量、目标格式），构造后不可变。
//! - `ImageConfig`：进程级策略（体积/像素上限、重采样滤镜、默认请求）。
//!
//! 性能档位（quality / balanced / speed）作为高层语义，映射到底层重采样滤镜。
//!
//! ## 实现思路
//!
//! - `Default` 提供生产可用的平衡配置（800×800、质量 0.85、WebP）。
//! - `CompressionRequest` 通过 serde 缺省字段支持从 JSON 局部覆盖。
//! - `ImagePerformanceProfile` 负责档位字符串解析与反向输出。
//! - 任何档位都不会使用最近邻采样。

use std::fmt;

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use super::ImageError;

/// 输出目标格式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    /// 现代压缩格式，需要运行环境支持，否则回退为 JPEG。
    Webp,
    /// 通用回退格式。
    #[serde(alias = "jpg")]
    Jpeg,
    /// 无损格式，质量参数被忽略。
    Png,
}

impl TargetFormat {
    /// 从外部字符串解析格式，接受短名、扩展名与 MIME 类型。
    ///
    /// # 示例
    /// ```rust
    /// use cafe_image_normalizer::image_handler::TargetFormat;
    ///
    /// assert_eq!(TargetFormat::parse("image/jpeg")?, TargetFormat::Jpeg);
    /// assert_eq!(TargetFormat::parse("JPG")?, TargetFormat::Jpeg);
    /// # Ok::<(), cafe_image_normalizer::image_handler::ImageError>(())
    /// ```
    pub fn parse(value: &str) -> Result<Self, ImageError> {
        let normalized = value.trim().to_ascii_lowercase();
        let short = normalized.strip_prefix("image/").unwrap_or(&normalized);
        match short {
            "webp" => Ok(Self::Webp),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            other => Err(ImageError::InvalidFormat(format!(
                "未知目标格式：{}（可选：webp / jpeg / png）",
                other
            ))),
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Webp => "image/webp",
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpg",
            Self::Png => "png",
        }
    }

    /// 无损格式编码时忽略质量参数。
    pub fn is_lossless(self) -> bool {
        matches!(self, Self::Png)
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Webp => "webp",
            Self::Jpeg => "jpeg",
            Self::Png => "png",
        })
    }
}

/// 单次压缩请求。
///
/// 未指定的字段取默认值：`800 × 800`、质量 `0.85`、目标格式 WebP。
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressionRequest {
    max_width: u32,
    max_height: u32,
    quality: f32,
    target_format: TargetFormat,
}

impl Default for CompressionRequest {
    fn default() -> Self {
        Self {
            max_width: 800,
            max_height: 800,
            quality: 0.85,
            target_format: TargetFormat::Webp,
        }
    }
}

impl CompressionRequest {
    pub fn with_max_width(mut self, max_width: u32) -> Self {
        self.max_width = max_width;
        self
    }

    pub fn with_max_height(mut self, max_height: u32) -> Self {
        self.max_height = max_height;
        self
    }

    pub fn with_quality(mut self, quality: f32) -> Self {
        self.quality = quality;
        self
    }

    pub fn with_target_format(mut self, target_format: TargetFormat) -> Self {
        self.target_format = target_format;
        self
    }

    pub fn max_width(&self) -> u32 {
        self.max_width
    }

    pub fn max_height(&self) -> u32 {
        self.max_height
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn target_format(&self) -> TargetFormat {
        self.target_format
    }

    /// 在执行任何解码工作前校验请求参数。
    pub fn validate(&self) -> Result<(), ImageError> {
        if self.max_width == 0 || self.max_height == 0 {
            return Err(ImageError::InvalidFormat(format!(
                "尺寸上限必须大于 0：{}x{}",
                self.max_width, self.max_height
            )));
        }
        if !self.quality.is_finite() || !(0.0..=1.0).contains(&self.quality) {
            return Err(ImageError::InvalidFormat(format!(
                "质量参数必须在 0~1 之间：{}",
                self.quality
            )));
        }
        Ok(())
    }
}

/// 进程级图片处理配置。
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// 读取原始字节时允许的最大文件体积（字节）。
    pub max_file_size: u64,
    /// 解码后的像素上限（`width * height`）。
    pub max_decoded_pixels: u64,
    /// 解码阶段允许的预计内存上限（按 RGBA 估算，字节）。
    pub max_decoded_bytes: u64,
    /// 重采样滤镜策略。
    pub resize_filter: FilterType,
    /// 调用方未显式给出请求时使用的默认请求。
    pub default_request: CompressionRequest,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_file_size: 50 * 1024 * 1024,
            max_decoded_pixels: 40_000_000,
            max_decoded_bytes: 160 * 1024 * 1024,
            resize_filter: FilterType::CatmullRom,
            default_request: CompressionRequest::default(),
        }
    }
}

/// 图片性能档位（面向产品/用户语义）。
///
/// - `Quality`：Lanczos3，尽量保真
/// - `Balanced`：CatmullRom（双三次），质量与性能平衡
/// - `Speed`：Triangle（双线性），优先速度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImagePerformanceProfile {
    Quality,
    Balanced,
    Speed,
}

impl ImagePerformanceProfile {
    /// 从外部字符串解析档位。
    ///
    /// # 示例
    /// ```rust
    /// use cafe_image_normalizer::image_handler::ImagePerformanceProfile;
    ///
    /// let p = ImagePerformanceProfile::from_str("balanced")?;
    /// assert_eq!(p.as_str(), "balanced");
    /// # Ok::<(), cafe_image_normalizer::image_handler::ImageError>(())
    /// ```
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(profile: &str) -> Result<Self, ImageError> {
        match profile.trim().to_lowercase().as_str() {
            "quality" => Ok(Self::Quality),
            "balanced" => Ok(Self::Balanced),
            "speed" => Ok(Self::Speed),
            other => Err(ImageError::InvalidFormat(format!(
                "未知性能档位：{}（可选：quality / balanced / speed）",
                other
            ))),
        }
    }

    /// 将档位输出为稳定字符串，供配置文件持久化。
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Quality => "quality",
            Self::Balanced => "balanced",
            Self::Speed => "speed",
        }
    }

    fn filter(self) -> FilterType {
        match self {
            Self::Quality => FilterType::Lanczos3,
            Self::Balanced => FilterType::CatmullRom,
            Self::Speed => FilterType::Triangle,
        }
    }
}

impl ImageConfig {
    /// 基于当前滤镜反推性能档位。
    pub fn infer_performance_profile(&self) -> ImagePerformanceProfile {
        match self.resize_filter {
            FilterType::Lanczos3 => ImagePerformanceProfile::Quality,
            FilterType::Triangle | FilterType::Nearest => ImagePerformanceProfile::Speed,
            FilterType::CatmullRom | FilterType::Gaussian => ImagePerformanceProfile::Balanced,
        }
    }

    /// 应用指定性能档位到实际参数。
    pub fn apply_performance_profile(&mut self, profile: ImagePerformanceProfile) {
        self.resize_filter = profile.filter();
    }
}
