//! # 图片压缩模块（image_handler）
//!
//! ## 设计思路
//!
//! 该模块将“来源加载 → 能力协商 → 解码缩放 → 编码命名 → 失败回退”
//! 按职责拆分为多个子模块，避免单文件膨胀与耦合。
//!
//! - `service`：上传服务（MIME 校验 → 压缩 → 失败回退原图 → 上传）
//! - `handler`：编排整条压缩流水线（`ImageNormalizer`）
//! - `loader`：负责本地文件 / Data URL 加载与体积校验
//! - `pipeline`：负责解码、像素限制、尺寸计算、缩放与编码
//! - `probe`：进程级 WebP 能力探测（只探测一次）
//! - `format`：输出文件名合成与体积格式化
//! - `config/error/source`：配置、错误、数据模型
//!
//! ## 新同事快速上手
//!
//! ```text
//! 调用方选中文件
//!    ↓
//! is_image（MIME 前缀校验，仅此一处会向用户报错）
//!    ↓
//! handler.rs（配置快照 + 格式协商 + 阶段耗时日志）
//!    ├─ probe.rs（WebP 不可用 → JPEG）
//!    └─ pipeline.rs（解码 + 两段式尺寸约束 + 缩放 + 编码）
//!    ↓
//! NormalizedImage，或失败时原样返回 SourceImage
//! ```

mod config;
mod error;
mod format;
mod handler;
mod loader;
mod pipeline;
mod probe;
mod service;
mod source;

pub use config::{CompressionRequest, ImageConfig, ImagePerformanceProfile, TargetFormat};
pub use error::ImageError;
pub use format::{format_size, output_file_name};
pub use handler::{CompressionReport, ImageNormalizer, NormalizeOutcome};
pub use pipeline::compute_target_dimensions;
pub use service::{ImageUploadService, UploadReceipt};
pub use probe::{CapabilityProbe, probe_webp_decoding, supports_modern_format};
pub use source::{NormalizedImage, SourceImage, UploadFile, is_image};
