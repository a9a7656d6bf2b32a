//! # 现代格式能力探测
//!
//! ## 设计思路
//!
//! 是否能处理 WebP 取决于运行环境（编解码器是否可用），在进程生命周期内不会变化，
//! 因此只在第一次需要时探测一次，之后一直复用结果，永不失效。
//!
//! ## 实现思路
//!
//! - `CapabilityProbe` 内部使用 `OnceCell<bool>` 缓存结果，线程安全、惰性计算。
//! - 默认检查会在严格的解码上限下解码一张内置的 1×1 WebP 样本；
//!   解码失败或尺寸不符都视为“不支持”。
//! - 进程级单例通过 `once_cell::sync::Lazy` 提供；测试可以注入自定义检查函数。

use std::io::Cursor;
use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose};
use image::{ImageFormat, ImageReader, Limits};
use once_cell::sync::{Lazy, OnceCell};

/// 1×1 有损 WebP 样本。
const WEBP_SAMPLE_BASE64: &str = "UklGRiIAAABXRUJQVlA4IBYAAAAwAQCdASoBAAEADsD+JaQAA3AAAAAA";
const PROBE_MAX_DIMENSION: u32 = 16;
const PROBE_MAX_ALLOC: u64 = 64 * 1024;

static WEBP_PROBE: Lazy<Arc<CapabilityProbe>> =
    Lazy::new(|| Arc::new(CapabilityProbe::new(probe_webp_decoding)));

/// 一次性能力探测，结果在首次查询后缓存。
pub struct CapabilityProbe {
    supported: OnceCell<bool>,
    check: fn() -> bool,
}

impl CapabilityProbe {
    /// 使用给定的检查函数创建探测器；检查函数最多执行一次。
    pub fn new(check: fn() -> bool) -> Self {
        Self {
            supported: OnceCell::new(),
            check,
        }
    }

    /// 进程级共享的 WebP 探测器。
    pub fn shared() -> Arc<Self> {
        Arc::clone(&WEBP_PROBE)
    }

    /// 查询能力，首次调用时执行实际探测。
    pub fn is_supported(&self) -> bool {
        *self.supported.get_or_init(|| {
            let supported = (self.check)();
            log::info!(
                "🔍 现代格式能力探测完成：{}",
                if supported { "支持 WebP" } else { "不支持 WebP，将回退为 JPEG" }
            );
            supported
        })
    }

    /// 是否已经完成探测。
    pub fn is_probed(&self) -> bool {
        self.supported.get().is_some()
    }
}

impl std::fmt::Debug for CapabilityProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityProbe")
            .field("supported", &self.supported.get())
            .finish()
    }
}

/// 当前进程是否支持现代压缩格式。
///
/// 幂等；第一次调用执行探测，后续调用返回缓存结果。
pub fn supports_modern_format() -> bool {
    WEBP_PROBE.is_supported()
}

/// 在严格上限下解码内置 WebP 样本。
pub fn probe_webp_decoding() -> bool {
    let sample = match general_purpose::STANDARD.decode(WEBP_SAMPLE_BASE64) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("⚠️ WebP 探测样本解析失败：{}", err);
            return false;
        }
    };

    let mut limits = Limits::default();
    limits.max_image_width = Some(PROBE_MAX_DIMENSION);
    limits.max_image_height = Some(PROBE_MAX_DIMENSION);
    limits.max_alloc = Some(PROBE_MAX_ALLOC);

    let mut reader = ImageReader::with_format(Cursor::new(sample), ImageFormat::WebP);
    reader.limits(limits);

    match reader.decode() {
        Ok(decoded) => decoded.width() == 1 && decoded.height() == 1,
        Err(err) => {
            log::debug!("WebP 探测解码失败：{}", err);
            false
        }
    }
}
