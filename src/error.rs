//! 统一错误类型模块
//!
//! # 设计思路
//!
//! 定义应用级统一的 `AppError` 枚举，上传服务、存储与设置加载统一返回 `Result<T, AppError>`。
//! 图片压缩内部错误（`ImageError`）在上传服务里会被回退策略吞掉，
//! 只有“不是图片”会作为可操作的提示返回给用户。
//!
//! # 实现思路
//!
//! - 使用 `thiserror` 派生可读错误消息。
//! - 为 `ImageError` / `std::io::Error` 提供 `From` 转换，无需手动 map。
//! - 实现 `Serialize` 将错误序列化为字符串，方便前端或日志直接展示。

use serde::Serialize;

use crate::image_handler::ImageError;

/// 应用级统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// 用户选择的文件不是图片（唯一直接面向用户的拒绝）
    #[error("请选择图片文件（当前类型：{0}）")]
    NotAnImage(String),

    /// 图片压缩流水线错误
    #[error("{0}")]
    Image(#[from] ImageError),

    /// 文件系统 I/O 错误
    #[error("文件系统错误: {0}")]
    Io(#[from] std::io::Error),

    /// 存储服务上传/删除失败
    #[error("存储服务错误: {0}")]
    Storage(String),

    /// 设置文件读取/解析失败
    #[error("设置错误: {0}")]
    Settings(String),
}

impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
