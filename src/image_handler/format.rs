//! 文件名合成与体积格式化。

use super::TargetFormat;

const SIZE_UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];

/// 将字节数格式化为人类可读字符串，保留至多两位小数。
///
/// 超过 GB 量级的值仍以 GB 表示。
///
/// # 示例
/// ```rust
/// use cafe_image_normalizer::image_handler::format_size;
///
/// assert_eq!(format_size(0), "0 Bytes");
/// assert_eq!(format_size(1536), "1.5 KB");
/// ```
pub fn format_size(bytes: u64) -> String {
    if bytes == 0 {
        return "0 Bytes".to_string();
    }

    let mut unit_index = 0usize;
    let mut divisor = 1u64;
    while unit_index + 1 < SIZE_UNITS.len() && bytes / divisor >= 1024 {
        divisor *= 1024;
        unit_index += 1;
    }

    let value = bytes as f64 / divisor as f64;
    let rounded = (value * 100.0).round() / 100.0;
    format!("{} {}", rounded, SIZE_UNITS[unit_index])
}

/// 合成输出文件名：`<原文件名去扩展名>_<时间戳>.<新扩展名>`。
///
/// 时间戳用于避免与原文件在同一存储命名空间内重名。
pub fn output_file_name(original: &str, format: TargetFormat, timestamp_ms: i64) -> String {
    let base = original.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(original);
    let stem = match base.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => base,
    };
    let stem = if stem.is_empty() { "image" } else { stem };

    format!("{}_{}.{}", stem, timestamp_ms, format.extension())
}
