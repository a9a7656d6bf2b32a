//! # 错误模型模块
//!
//! ## 设计思路
//!
//! 使用单一错误枚举承载压缩链路中的所有错误来源，避免字符串拼接式错误处理。
//! 通过 `thiserror` 保持人类可读错误，同时让调用侧可按分支匹配。
//!
//! 调用方只需要区分“成功 / 失败”即可走回退逻辑（上传原图），
//! `code()` 与 `stage()` 仅用于日志与诊断。

/// 图片压缩统一错误类型。
///
/// 该类型在应用层会被上转为 `AppError`；上传服务遇到它时回退为原图上传。
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("解码错误：{0}")]
    Decode(String),

    #[error("编码错误：{0}")]
    Encode(String),

    #[error("运行环境不支持：{0}")]
    UnsupportedEnvironment(String),

    #[error("格式错误：{0}")]
    InvalidFormat(String),

    #[error("文件错误：{0}")]
    FileSystem(String),

    #[error("资源限制：{0}")]
    ResourceLimit(String),
}

impl ImageError {
    /// 稳定的机器可读错误码。
    pub fn code(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode_failure",
            Self::Encode(_) => "encode_failure",
            Self::UnsupportedEnvironment(_) => "unsupported_environment",
            Self::InvalidFormat(_) => "invalid_format",
            Self::FileSystem(_) => "file_system",
            Self::ResourceLimit(_) => "resource_limit",
        }
    }

    /// 出错的流水线阶段。
    pub fn stage(&self) -> &'static str {
        match self {
            Self::FileSystem(_) => "load",
            Self::Decode(_) | Self::ResourceLimit(_) => "decode",
            Self::UnsupportedEnvironment(_) => "resize",
            Self::Encode(_) => "encode",
            Self::InvalidFormat(_) => "config",
        }
    }
}

impl From<ImageError> for String {
    /// 兼容部分仍使用字符串错误的调用点。
    fn from(error: ImageError) -> Self {
        error.to_string()
    }
}
