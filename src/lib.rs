//! # 咖啡馆图片压缩工具：库入口
//!
//! ## 架构总览
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │        调用方（新增饮品/甜点表单、店铺 Logo 上传、CLI）    │
//! │                                                          │
//! │   选择文件 ── is_image ── 压缩 ── 失败回退原图 ── 上传    │
//! └───────┬──────────────────────────────────────────────────┘
//!         ↕ Result<UploadReceipt, AppError>
//! ┌───────┼──────────────────────────────────────────────────┐
//! │       ↕            后端 (Rust)                           │
//! │                                                          │
//! │  ┌─ error ────── AppError (统一错误类型)                  │
//! │  │                                                       │
//! │  ├─ image_handler  加载·能力探测·解码·缩放·编码·上传服务   │
//! │  │   ├─ probe      WebP 能力一次性探测                    │
//! │  │   └─ pipeline   两段式尺寸约束 + 重采样 + 编码          │
//! │  │                                                       │
//! │  ├─ storage ──── ImageStore trait + 本地目录实现           │
//! │  └─ settings ─── JSON 设置（档位 / 默认请求 / 存储目录）   │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## 模块职责
//!
//! | 模块 | 职责 |
//! |------|------|
//! | [`error`] | 统一错误类型 `AppError` |
//! | [`image_handler`] | 图片压缩核心 `ImageNormalizer` 与上传服务 `ImageUploadService` |
//! | [`storage`] | 存储协作者接口与本地目录实现 |
//! | [`settings`] | 设置文件的读取、保存与默认值 |

pub mod error;
pub mod image_handler;
pub mod settings;
pub mod storage;
