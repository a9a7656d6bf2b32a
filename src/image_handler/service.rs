//! # 上传服务层
//!
//! ## 设计思路
//!
//! 把调用方的固定流程收拢成一个服务：
//! 1. MIME 校验（唯一会向用户报错的环节）
//! 2. 在阻塞线程池中压缩
//! 3. 压缩失败则沿用原图（名称、类型、字节都不变）
//! 4. 交给存储协作者上传
//!
//! ## 实现思路
//!
//! - 服务持有 `ImageNormalizer` 与 `Arc<S: ImageStore>`，可在多任务间共享。
//! - 存储调用是阻塞 I/O，同样放进 `spawn_blocking`。
//! - `replace` 先传新图再删旧图，删除失败只记日志，不影响本次结果。

use std::sync::Arc;

use serde::Serialize;

use super::{
    CompressionReport, CompressionRequest, ImageConfig, ImageNormalizer, ImagePerformanceProfile,
    NormalizeOutcome, SourceImage, UploadFile, format_size, is_image,
};
use crate::error::AppError;
use crate::storage::{ImageStore, StoredObject};

/// 单次上传的结果。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadReceipt {
    pub public_url: String,
    pub path: String,
    pub file_name: String,
    pub mime_type: String,
    pub original_size: u64,
    pub stored_size: u64,
    /// `false` 表示压缩失败后上传了原图。
    pub compressed: bool,
    /// 压缩报告；回退原图时为 `None`。
    pub report: Option<CompressionReport>,
}

/// 图片上传服务。
pub struct ImageUploadService<S: ImageStore> {
    normalizer: ImageNormalizer,
    store: Arc<S>,
}

impl<S: ImageStore> Clone for ImageUploadService<S> {
    fn clone(&self) -> Self {
        Self {
            normalizer: self.normalizer.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: ImageStore + 'static> ImageUploadService<S> {
    /// 使用默认压缩器（进程级 WebP 探测）创建服务。
    pub fn new(config: ImageConfig, store: S) -> Self {
        Self::with_normalizer(ImageNormalizer::new(config), store)
    }

    pub fn with_normalizer(normalizer: ImageNormalizer, store: S) -> Self {
        Self {
            normalizer,
            store: Arc::new(store),
        }
    }

    pub fn normalizer(&self) -> &ImageNormalizer {
        &self.normalizer
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// 切换性能档位（字符串形式，供设置文件与命令行使用）。
    pub fn set_performance_profile(&self, profile: &str) -> Result<(), AppError> {
        let profile = ImagePerformanceProfile::from_str(profile)?;
        self.normalizer.set_performance_profile(profile)?;
        Ok(())
    }

    pub fn get_performance_profile(&self) -> Result<String, AppError> {
        Ok(self.normalizer.get_performance_profile()?.as_str().to_string())
    }

    /// 校验、压缩（失败回退原图）并上传。
    ///
    /// 回退上传沿用原文件名；同名对象是否覆盖由存储协作者决定，
    /// `LocalImageStore` 会原子替换已有对象，重复上传同一张无法压缩的图片不会失败。
    ///
    /// # 示例
    /// ```rust,no_run
    /// use cafe_image_normalizer::image_handler::{
    ///     CompressionRequest, ImageConfig, ImageUploadService, SourceImage,
    /// };
    /// use cafe_image_normalizer::storage::LocalImageStore;
    ///
    /// # async fn demo() -> Result<(), cafe_image_normalizer::error::AppError> {
    /// let config = ImageConfig::default();
    /// let service = ImageUploadService::new(config.clone(), LocalImageStore::new("data", "http://localhost/media"));
    /// let source = SourceImage::from_file("menu/latte.jpg", &config)?;
    /// let receipt = service.upload(source, "items", &CompressionRequest::default()).await?;
    /// println!("{}", receipt.public_url);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn upload(
        &self,
        source: SourceImage,
        namespace: &str,
        request: &CompressionRequest,
    ) -> Result<UploadReceipt, AppError> {
        if !is_image(&source.mime_type) {
            log::info!("🚫 拒绝非图片文件 - {}（{}）", source.name, source.mime_type);
            return Err(AppError::NotAnImage(source.mime_type));
        }

        let original_size = source.len() as u64;
        let outcome = self.normalizer.normalize_or_original(source, request).await;
        let compressed = outcome.is_compressed();
        let report = match &outcome {
            NormalizeOutcome::Compressed(image) => Some(image.report.clone()),
            NormalizeOutcome::Original { .. } => None,
        };
        let file = outcome.into_upload();
        let stored_size = file.len() as u64;

        let stored = self.upload_file(file.clone(), namespace).await?;

        log::info!(
            "✅ 图片上传完成 - {} {} -> {}（{}）",
            file.name,
            format_size(original_size),
            format_size(stored_size),
            if compressed { "已压缩" } else { "原图" }
        );

        Ok(UploadReceipt {
            public_url: stored.public_url,
            path: stored.path,
            file_name: file.name,
            mime_type: file.mime_type,
            original_size,
            stored_size,
            compressed,
            report,
        })
    }

    /// 上传新图并删除旧图（例如替换店铺 Logo）。
    pub async fn replace(
        &self,
        source: SourceImage,
        namespace: &str,
        previous_path: Option<&str>,
        request: &CompressionRequest,
    ) -> Result<UploadReceipt, AppError> {
        let receipt = self.upload(source, namespace, request).await?;

        if let Some(previous) = previous_path.filter(|p| !p.is_empty() && *p != receipt.path) {
            if let Err(err) = self.delete(namespace, previous).await {
                log::warn!("⚠️ 删除旧图片失败 - {}/{}：{}", namespace, previous, err);
            }
        }

        Ok(receipt)
    }

    pub async fn delete(&self, namespace: &str, path: &str) -> Result<(), AppError> {
        let store = Arc::clone(&self.store);
        let namespace = namespace.to_string();
        let path = path.to_string();

        tokio::task::spawn_blocking(move || store.delete(&namespace, &path))
            .await
            .map_err(|e| AppError::Storage(format!("删除线程执行失败：{}", e)))?
    }

    async fn upload_file(&self, file: UploadFile, namespace: &str) -> Result<StoredObject, AppError> {
        let store = Arc::clone(&self.store);
        let namespace = namespace.to_string();

        tokio::task::spawn_blocking(move || store.upload(&file, &namespace))
            .await
            .map_err(|e| AppError::Storage(format!("上传线程执行失败：{}", e)))?
    }
}

impl<S: ImageStore> std::fmt::Debug for ImageUploadService<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageUploadService")
            .field("normalizer", &self.normalizer)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_handler::CapabilityProbe;
    use bytes::Bytes;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStore {
        objects: Mutex<HashMap<String, UploadFile>>,
        fail_delete: bool,
    }

    impl ImageStore for MemoryStore {
        fn upload(&self, file: &UploadFile, namespace: &str) -> Result<StoredObject, AppError> {
            let key = format!("{}/{}", namespace, file.name);
            let mut objects = self
                .objects
                .lock()
                .map_err(|_| AppError::Storage("lock poisoned".to_string()))?;
            objects.insert(key.clone(), file.clone());
            Ok(StoredObject {
                public_url: format!("mem://{}", key),
                path: file.name.clone(),
            })
        }

        fn delete(&self, namespace: &str, path: &str) -> Result<(), AppError> {
            if self.fail_delete {
                return Err(AppError::Storage("delete disabled".to_string()));
            }
            let mut objects = self
                .objects
                .lock()
                .map_err(|_| AppError::Storage("lock poisoned".to_string()))?;
            objects.remove(&format!("{}/{}", namespace, path));
            Ok(())
        }
    }

    fn supported() -> bool {
        true
    }

    fn service(store: MemoryStore) -> ImageUploadService<MemoryStore> {
        let normalizer = ImageNormalizer::with_probe(
            ImageConfig::default(),
            Arc::new(CapabilityProbe::new(supported)),
        );
        ImageUploadService::with_normalizer(normalizer, store)
    }

    fn png_source(name: &str, width: u32, height: u32) -> SourceImage {
        let img = image::RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x * 3 % 256) as u8, (y * 5 % 256) as u8, 90])
        });
        let mut cursor = std::io::Cursor::new(Vec::new());
        img.write_to(&mut cursor, image::ImageFormat::Png)
            .expect("encode test png failed");
        SourceImage::new(name, "image/png", cursor.into_inner())
    }

    #[tokio::test]
    async fn rejects_non_image_mime() {
        let service = service(MemoryStore::default());
        let source = SourceImage::new("menu.pdf", "application/pdf", b"%PDF-1.7".to_vec());

        let result = service.upload(source, "items", &CompressionRequest::default()).await;
        assert!(matches!(result, Err(AppError::NotAnImage(mime)) if mime == "application/pdf"));
        assert!(service.store().objects.lock().map(|o| o.is_empty()).unwrap_or(false));
    }

    #[tokio::test]
    async fn uploads_compressed_image() {
        let service = service(MemoryStore::default());
        let receipt = service
            .upload(png_source("cortado.png", 1000, 500), "items", &CompressionRequest::default())
            .await
            .expect("upload should succeed");

        assert!(receipt.compressed);
        assert_eq!(receipt.mime_type, "image/webp");
        assert!(receipt.file_name.starts_with("cortado_"));
        assert_eq!(receipt.public_url, format!("mem://items/{}", receipt.path));

        let objects = service.store().objects.lock().expect("lock failed");
        let stored = objects
            .get(&format!("items/{}", receipt.path))
            .expect("object should be stored");
        assert_eq!(receipt.stored_size, stored.len() as u64);
        let report = receipt.report.as_ref().expect("compressed upload carries a report");
        assert_eq!(report.compressed_size, receipt.stored_size);
        assert_eq!(report.original_size, receipt.original_size);
        assert_eq!((report.width, report.height), (800, 400));
    }

    #[tokio::test]
    async fn falls_back_to_original_on_decode_failure() {
        let service = service(MemoryStore::default());
        let bytes = Bytes::from_static(b"\x89PNG\r\n\x1a\n garbage");
        let source = SourceImage::new("broken.png", "image/png", bytes.clone());

        let receipt = service
            .upload(source, "items", &CompressionRequest::default())
            .await
            .expect("fallback upload should succeed");

        assert!(!receipt.compressed);
        assert!(receipt.report.is_none());
        assert_eq!(receipt.file_name, "broken.png");
        assert_eq!(receipt.mime_type, "image/png");
        assert_eq!(receipt.stored_size, bytes.len() as u64);
        assert_eq!(receipt.original_size, receipt.stored_size);
        let objects = service.store().objects.lock().expect("lock failed");
        assert_eq!(objects.get("items/broken.png").map(|f| f.bytes.clone()), Some(bytes));
    }

    #[tokio::test]
    async fn replace_deletes_previous_object() {
        let service = service(MemoryStore::default());
        let first = service
            .upload(png_source("logo.png", 64, 64), "logos", &CompressionRequest::default())
            .await
            .expect("first upload failed");

        let second = service
            .replace(
                png_source("logo2.png", 64, 64),
                "logos",
                Some(&first.path),
                &CompressionRequest::default(),
            )
            .await
            .expect("replace failed");

        let objects = service.store().objects.lock().expect("lock failed");
        assert!(!objects.contains_key(&format!("logos/{}", first.path)));
        assert!(objects.contains_key(&format!("logos/{}", second.path)));
    }

    #[tokio::test]
    async fn replace_survives_failed_delete() {
        let service = service(MemoryStore {
            fail_delete: true,
            ..Default::default()
        });

        let receipt = service
            .replace(
                png_source("logo.png", 32, 32),
                "logos",
                Some("old.webp"),
                &CompressionRequest::default(),
            )
            .await;

        assert!(receipt.is_ok());
    }

    #[tokio::test]
    async fn repeated_fallback_upload_to_local_store_succeeds() {
        use crate::storage::LocalImageStore;
        use std::time::{SystemTime, UNIX_EPOCH};

        let ts = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let root = std::env::temp_dir().join(format!("cafe_service_fallback_{ts}"));
        let normalizer = ImageNormalizer::with_probe(
            ImageConfig::default(),
            Arc::new(CapabilityProbe::new(supported)),
        );
        let service =
            ImageUploadService::with_normalizer(normalizer, LocalImageStore::new(&root, "http://localhost"));
        let broken = || SourceImage::new("broken.png", "image/png", b"\x89PNG\r\n\x1a\n garbage".to_vec());

        let first = service
            .upload(broken(), "items", &CompressionRequest::default())
            .await
            .expect("first fallback upload failed");
        let second = service
            .upload(broken(), "items", &CompressionRequest::default())
            .await
            .expect("second fallback upload failed");

        assert!(!first.compressed && !second.compressed);
        assert_eq!(first.path, second.path);
        let _ = std::fs::remove_dir_all(root);
    }

    #[test]
    fn profile_strings_round_trip() {
        let service = service(MemoryStore::default());
        service.set_performance_profile("speed").expect("set profile failed");
        assert_eq!(service.get_performance_profile().expect("get failed"), "speed");
        assert!(service.set_performance_profile("ludicrous").is_err());
    }
}
