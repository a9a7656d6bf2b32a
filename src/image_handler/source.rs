//! # 数据源与中间模型
//!
//! ## 设计思路
//!
//! 将“调用方输入”“压缩产物”“待上传文件”三种语义解耦：
//! - `SourceImage` 表示调用方选中的原始文件（字节 + 声明的 MIME + 文件名）
//! - `NormalizedImage` 表示压缩后的新文件（额外携带最终像素尺寸与压缩报告）
//! - `UploadFile` 表示交给存储服务的最终输入，两者都可以转换过去
//!
//! 字节统一使用 `bytes::Bytes`，回退上传原图时只增加引用计数，不复制数据。

use bytes::Bytes;

use super::CompressionReport;

/// 判断声明的内容类型是否为图片。
///
/// 仅做前缀判断，结果只是建议性的：返回 `true` 并不保证字节可以被解码。
///
/// # 示例
/// ```rust
/// use cafe_image_normalizer::image_handler::is_image;
///
/// assert!(is_image("image/png"));
/// assert!(!is_image("application/pdf"));
/// ```
pub fn is_image(mime_type: &str) -> bool {
    let trimmed = mime_type.trim_start();
    trimmed
        .get(..6)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"))
}

/// 调用方选中的原始图片。
///
/// 压缩流程只读取它，不在返回后保留任何引用。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl SourceImage {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 压缩产物。
///
/// 不变式：`width`/`height` 均不超过请求上限，且不会大于原图尺寸。
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedImage {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
    pub width: u32,
    pub height: u32,
    /// 本次压缩的诊断记录，可直接序列化后上报。
    pub report: CompressionReport,
}

impl NormalizedImage {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// 交给存储服务的文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl From<SourceImage> for UploadFile {
    fn from(source: SourceImage) -> Self {
        Self {
            name: source.name,
            mime_type: source.mime_type,
            bytes: source.bytes,
        }
    }
}

impl From<NormalizedImage> for UploadFile {
    fn from(image: NormalizedImage) -> Self {
        Self {
            name: image.name,
            mime_type: image.mime_type,
            bytes: image.bytes,
        }
    }
}
