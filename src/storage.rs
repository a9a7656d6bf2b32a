//! 图片存储模块
//!
//! # 设计思路
//!
//! 压缩核心不直接调用存储服务，只负责产出适合上传的文件。
//! 这里用 `ImageStore` trait 描述存储协作者的两个能力：
//! - `upload(file, namespace) -> { public_url, path }`
//! - `delete(namespace, path)`
//!
//! `LocalImageStore` 是基于本地目录的实现，用于命令行工具与测试。
//!
//! # 实现思路
//!
//! - 对象落在 `<root>/<namespace>/<文件名>`，目录不存在时自动创建。
//! - 拒绝路径穿越（`/`、`\`、`..`、空段）。
//! - 先写入同目录下的临时文件再重命名，同名对象被原子替换；
//!   写入失败时删除临时文件，不会留下半截对象。
//! - 删除不存在的对象视为成功。
//! - 所有可能失败的操作均返回 `Result`，不使用 `expect()` / `unwrap()`。

use serde::Serialize;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::image_handler::UploadFile;

/// 上传结果。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoredObject {
    pub public_url: String,
    pub path: String,
}

/// 存储服务协作者。
pub trait ImageStore: Send + Sync {
    fn upload(&self, file: &UploadFile, namespace: &str) -> Result<StoredObject, AppError>;

    fn delete(&self, namespace: &str, path: &str) -> Result<(), AppError>;
}

/// 基于本地目录的存储实现。
#[derive(Debug, Clone)]
pub struct LocalImageStore {
    root_dir: PathBuf,
    public_base_url: String,
}

impl LocalImageStore {
    pub fn new(root_dir: impl Into<PathBuf>, public_base_url: impl Into<String>) -> Self {
        Self {
            root_dir: root_dir.into(),
            public_base_url: public_base_url.into(),
        }
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn validate_segment(kind: &str, segment: &str) -> Result<(), AppError> {
        if segment.is_empty()
            || segment == "."
            || segment.contains("..")
            || segment.contains('/')
            || segment.contains('\\')
        {
            return Err(AppError::Storage(format!("非法的{}：'{}'", kind, segment)));
        }
        Ok(())
    }

    fn namespace_dir(&self, namespace: &str) -> Result<PathBuf, AppError> {
        Self::validate_segment("命名空间", namespace)?;
        Ok(self.root_dir.join(namespace))
    }

    /// 通过临时文件写入对象，成功后重命名到 `target`。
    ///
    /// 任一步骤失败都会清理临时文件，`target` 要么保持原样，要么是完整的新内容。
    fn write_object<F>(target: &Path, write: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut fs::File) -> std::io::Result<()>,
    {
        let file_name = target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp = target.with_file_name(format!(".{}.part", file_name));

        let result = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp)
            .and_then(|mut handle| write(&mut handle))
            .and_then(|_| fs::rename(&temp, target));

        result.map_err(|e| {
            if let Err(cleanup) = fs::remove_file(&temp) {
                if cleanup.kind() != ErrorKind::NotFound {
                    log::warn!("⚠️ 清理临时文件 '{}' 失败：{}", temp.display(), cleanup);
                }
            }
            AppError::Storage(format!("写入 '{}' 失败: {}", target.display(), e))
        })
    }

    fn public_url(&self, namespace: &str, path: &str) -> String {
        format!(
            "{}/{}/{}",
            self.public_base_url.trim_end_matches('/'),
            namespace,
            path
        )
    }
}

impl ImageStore for LocalImageStore {
    fn upload(&self, file: &UploadFile, namespace: &str) -> Result<StoredObject, AppError> {
        let dir = self.namespace_dir(namespace)?;
        Self::validate_segment("文件名", &file.name)?;

        if !dir.exists() {
            fs::create_dir_all(&dir).map_err(|e| {
                AppError::Storage(format!("创建目录 '{}' 失败: {}", dir.display(), e))
            })?;
        }

        let target = dir.join(&file.name);
        Self::write_object(&target, |handle| {
            handle.write_all(&file.bytes)?;
            handle.flush()
        })?;

        log::info!(
            "☁️ 已上传 {}/{}（{} 字节，{}）",
            namespace,
            file.name,
            file.len(),
            file.mime_type
        );

        Ok(StoredObject {
            public_url: self.public_url(namespace, &file.name),
            path: file.name.clone(),
        })
    }

    fn delete(&self, namespace: &str, path: &str) -> Result<(), AppError> {
        let dir = self.namespace_dir(namespace)?;
        Self::validate_segment("文件名", path)?;

        match fs::remove_file(dir.join(path)) {
            Ok(()) => {
                log::info!("🗑️ 已删除 {}/{}", namespace, path);
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                log::debug!("删除对象不存在，忽略：{}/{}", namespace, path);
                Ok(())
            }
            Err(e) => Err(AppError::Storage(format!("删除 {}/{} 失败: {}", namespace, path, e))),
        }
    }
}
