//! # 加载模块
//!
//! ## 设计思路
//!
//! 统一处理调用方两种常见来源（本地文件 / Data URL）的原始字节加载，
//! 并在“尽可能早”的阶段执行体积校验，尽快失败，减少不必要的内存消耗。
//!
//! 这里只负责得到 `SourceImage`，不判断内容能否解码：
//! MIME 校验属于调用方，解码失败由压缩流程报告。
//!
//! ## 实现思路
//!
//! - 文件：存在性 + metadata 体积限制 + 读取；MIME 先按扩展名，再按文件签名（`infer`）。
//! - Data URL：解析 `data:<mime>;base64,` 头，先估算解码体积再真正解码。

use base64::{Engine as _, engine::general_purpose};
use std::path::Path;

use super::{ImageConfig, ImageError, SourceImage};

const FALLBACK_MIME: &str = "application/octet-stream";

impl SourceImage {
    /// 从本地路径加载原始图片。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use cafe_image_normalizer::image_handler::{ImageConfig, SourceImage};
    ///
    /// let source = SourceImage::from_file("menu/latte.jpg", &ImageConfig::default())?;
    /// assert_eq!(source.name, "latte.jpg");
    /// # Ok::<(), cafe_image_normalizer::image_handler::ImageError>(())
    /// ```
    pub fn from_file(path: impl AsRef<Path>, config: &ImageConfig) -> Result<Self, ImageError> {
        let file_path = path.as_ref();
        log::info!("📁 开始读取本地图片 - 路径: {}", file_path.display());

        if !file_path.exists() {
            return Err(ImageError::FileSystem(format!(
                "文件不存在：{}",
                file_path.display()
            )));
        }

        let metadata = std::fs::metadata(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取文件信息：{}", e)))?;

        if metadata.len() > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "文件过大：{:.2} MB（限制：{:.2} MB）",
                metadata.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let bytes = std::fs::read(file_path)
            .map_err(|e| ImageError::FileSystem(format!("无法读取图片文件：{}", e)))?;

        let name = file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| ImageError::FileSystem(format!("路径缺少文件名：{}", file_path.display())))?;

        let mime_type = mime_from_extension(file_path)
            .map(str::to_string)
            .unwrap_or_else(|| sniff_mime(&bytes));

        Ok(SourceImage::new(name, mime_type, bytes))
    }

    /// 从 `data:<mime>;base64,<payload>` 形式的字符串加载原始图片。
    pub fn from_data_url(
        data: &str,
        name: impl Into<String>,
        config: &ImageConfig,
    ) -> Result<Self, ImageError> {
        log::info!("📝 开始处理 Data URL 图片");

        let (mime_type, payload) = split_data_url(data)?;
        let bytes = decode_base64_with_limit(payload, config.max_file_size)?;

        if bytes.len() as u64 > config.max_file_size {
            return Err(ImageError::ResourceLimit(format!(
                "Base64 解码后体积过大：{:.2} MB（限制：{:.2} MB）",
                bytes.len() as f64 / 1024.0 / 1024.0,
                config.max_file_size as f64 / 1024.0 / 1024.0
            )));
        }

        let mime_type = if mime_type.is_empty() {
            sniff_mime(&bytes)
        } else {
            mime_type.to_string()
        };

        Ok(SourceImage::new(name, mime_type, bytes))
    }
}

fn split_data_url(data: &str) -> Result<(&str, &str), ImageError> {
    let normalized = data.trim();
    let rest = normalized
        .strip_prefix("data:")
        .ok_or_else(|| ImageError::InvalidFormat("无效的 Data URL 格式".to_string()))?;

    let marker = rest
        .find(";base64,")
        .ok_or_else(|| ImageError::InvalidFormat("缺少 base64 标记".to_string()))?;

    Ok((&rest[..marker], &rest[marker + 8..]))
}

fn estimate_base64_decoded_upper_bound_len(base64_data: &str) -> Result<u64, ImageError> {
    let len = base64_data.trim().len() as u64;
    let groups = len
        .checked_add(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 输入长度溢出".to_string()))?
        / 4;

    groups
        .checked_mul(3)
        .ok_or_else(|| ImageError::ResourceLimit("Base64 解码体积估算溢出".to_string()))
}

fn decode_base64_with_limit(payload: &str, max_file_size: u64) -> Result<Vec<u8>, ImageError> {
    let estimated_len = estimate_base64_decoded_upper_bound_len(payload)?;
    if estimated_len > max_file_size {
        return Err(ImageError::ResourceLimit(format!(
            "Base64 预计解码体积过大：{:.2} MB（限制：{:.2} MB）",
            estimated_len as f64 / 1024.0 / 1024.0,
            max_file_size as f64 / 1024.0 / 1024.0
        )));
    }

    general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ImageError::Decode(format!("Base64 解码失败：{}", e)))
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let extension = path.extension()?.to_str()?.to_ascii_lowercase();
    let mime = match extension.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "bmp" => "image/bmp",
        "tif" | "tiff" => "image/tiff",
        "svg" => "image/svg+xml",
        "heic" => "image/heic",
        "avif" => "image/avif",
        _ => return None,
    };
    Some(mime)
}

/// 按文件签名推断 MIME，无法识别时返回通用二进制类型。
fn sniff_mime(bytes: &[u8]) -> String {
    infer::get(bytes)
        .map(|kind| kind.mime_type().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{SystemTime, UNIX_EPOCH};

    const PNG_SIGNATURE: [u8; 12] = [137, 80, 78, 71, 13, 10, 26, 10, 0, 0, 0, 13];

    fn unique_temp_dir(tag: &str) -> std::path::PathBuf {
        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let dir = std::env::temp_dir().join(format!("cafe_loader_{tag}_{ts}"));
        std::fs::create_dir_all(&dir).expect("create temp dir failed");
        dir
    }

    #[test]
    fn data_url_keeps_declared_mime() {
        let encoded = general_purpose::STANDARD.encode(PNG_SIGNATURE);
        let data = format!("data:image/png;base64,{encoded}");

        let source = SourceImage::from_data_url(&data, "logo.png", &ImageConfig::default())
            .expect("data url should parse");

        assert_eq!(source.mime_type, "image/png");
        assert_eq!(source.name, "logo.png");
        assert_eq!(source.bytes.as_ref(), &PNG_SIGNATURE);
    }

    #[test]
    fn data_url_without_mime_is_sniffed() {
        let encoded = general_purpose::STANDARD.encode(PNG_SIGNATURE);
        let data = format!("data:;base64,{encoded}");

        let source = SourceImage::from_data_url(&data, "blob", &ImageConfig::default())
            .expect("data url should parse");

        assert_eq!(source.mime_type, "image/png");
    }

    #[test]
    fn data_url_rejects_missing_marker() {
        let result = SourceImage::from_data_url("data:image/png,abcd", "x", &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::InvalidFormat(_))));
    }

    #[test]
    fn data_url_rejects_large_payload_before_decode() {
        let mut config = ImageConfig::default();
        config.max_file_size = 32;
        let data = format!("data:image/png;base64,{}", "A".repeat(1024 * 1024));

        let result = SourceImage::from_data_url(&data, "big.png", &config);
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
    }

    #[test]
    fn from_file_reports_missing_file() {
        let dir = unique_temp_dir("missing");
        let result = SourceImage::from_file(dir.join("nope.png"), &ImageConfig::default());
        assert!(matches!(result, Err(ImageError::FileSystem(_))));
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn from_file_uses_extension_then_signature() {
        let dir = unique_temp_dir("mime");
        let named = dir.join("Croissant.JPG");
        let unnamed = dir.join("upload");
        std::fs::write(&named, b"not really a jpeg").expect("write failed");
        std::fs::write(&unnamed, PNG_SIGNATURE).expect("write failed");

        let config = ImageConfig::default();
        let by_extension = SourceImage::from_file(&named, &config).expect("load failed");
        let by_signature = SourceImage::from_file(&unnamed, &config).expect("load failed");

        assert_eq!(by_extension.mime_type, "image/jpeg");
        assert_eq!(by_extension.name, "Croissant.JPG");
        assert_eq!(by_signature.mime_type, "image/png");

        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn from_file_rejects_oversized_file() {
        let dir = unique_temp_dir("size");
        let path = dir.join("huge.png");
        std::fs::write(&path, vec![0u8; 128]).expect("write failed");

        let mut config = ImageConfig::default();
        config.max_file_size = 64;

        let result = SourceImage::from_file(&path, &config);
        assert!(matches!(result, Err(ImageError::ResourceLimit(_))));
        let _ = std::fs::remove_dir_all(dir);
    }
}
