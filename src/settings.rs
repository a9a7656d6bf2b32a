//! 应用设置模块
//!
//! # 设计思路
//!
//! 设置以 JSON 文件保存，分为两节：
//! - `image`：性能档位、默认压缩请求与资源上限
//! - `storage`：本地存储根目录与对外访问地址
//!
//! # 实现思路
//!
//! - 所有字段都有默认值，文件里只写需要覆盖的部分即可。
//! - `load_or_default`：文件缺失或损坏时回退默认值（只记日志）。
//! - `load_from_path`：显式加载，解析失败返回 `AppError::Settings`。
//! - `to_image_config` 将设置转换为压缩器使用的 `ImageConfig`。

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::image_handler::{CompressionRequest, ImageConfig, ImagePerformanceProfile};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppSettings {
    pub image: ImageSettings,
    pub storage: StorageSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageSettings {
    /// `quality` / `balanced` / `speed`
    pub profile: String,
    pub request: CompressionRequest,
    pub max_file_size: u64,
    pub max_decoded_pixels: u64,
    pub max_decoded_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root_dir: PathBuf,
    pub public_base_url: String,
}

impl Default for ImageSettings {
    fn default() -> Self {
        let config = ImageConfig::default();
        Self {
            profile: config.infer_performance_profile().as_str().to_string(),
            request: config.default_request,
            max_file_size: config.max_file_size,
            max_decoded_pixels: config.max_decoded_pixels,
            max_decoded_bytes: config.max_decoded_bytes,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("media"),
            public_base_url: "http://localhost:8080/media".to_string(),
        }
    }
}

impl AppSettings {
    /// 显式加载设置文件。
    pub fn load_from_path(path: &Path) -> Result<Self, AppError> {
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| AppError::Settings(format!("解析设置文件失败: {}", e)))
    }

    /// 加载设置文件，缺失或损坏时使用默认值。
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }

        match Self::load_from_path(path) {
            Ok(settings) => settings,
            Err(err) => {
                log::warn!("⚠️ 设置文件不可用，使用默认设置 - {}：{}", path.display(), err);
                Self::default()
            }
        }
    }

    pub fn save_to_path(&self, path: &Path) -> Result<(), AppError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .map_err(|e| AppError::Settings(format!("创建设置目录失败: {}", e)))?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Settings(format!("序列化设置失败: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

impl ImageSettings {
    /// 转换为压缩器配置；档位名或默认请求无效时报错。
    pub fn to_image_config(&self) -> Result<ImageConfig, AppError> {
        let profile = ImagePerformanceProfile::from_str(&self.profile)?;
        self.request.validate()?;

        let mut config = ImageConfig {
            max_file_size: self.max_file_size,
            max_decoded_pixels: self.max_decoded_pixels,
            max_decoded_bytes: self.max_decoded_bytes,
            default_request: self.request,
            ..ImageConfig::default()
        };
        config.apply_performance_profile(profile);
        Ok(config)
    }
}
