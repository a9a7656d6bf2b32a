//! # 咖啡馆图片压缩工具：命令行入口
//!
//! 本文件仅负责参数解析、日志初始化与服务组装。
//! 业务逻辑分布在各子模块中，详见 `lib.rs` 架构文档。

use std::path::PathBuf;
use std::process::ExitCode;

use cafe_image_normalizer::image_handler::{
    CompressionRequest, ImageUploadService, SourceImage, TargetFormat, format_size,
};
use cafe_image_normalizer::settings::AppSettings;
use cafe_image_normalizer::storage::LocalImageStore;
use clap::Parser;

#[derive(Debug, Parser)]
#[command(name = "cafe-image-normalizer", version, about = "压缩并上传咖啡馆商品图片")]
struct Cli {
    /// 设置文件路径（JSON）
    #[arg(long, default_value = "settings.json")]
    settings: PathBuf,

    /// 存储命名空间，例如 items / logos
    #[arg(long, default_value = "items")]
    namespace: String,

    #[arg(long)]
    max_width: Option<u32>,

    #[arg(long)]
    max_height: Option<u32>,

    /// 压缩质量（0~1）
    #[arg(long)]
    quality: Option<f32>,

    /// 目标格式：webp / jpeg / png
    #[arg(long)]
    format: Option<String>,

    /// 性能档位：quality / balanced / speed
    #[arg(long)]
    profile: Option<String>,

    /// 待处理的图片文件
    #[arg(required = true)]
    files: Vec<PathBuf>,
}

fn build_request(cli: &Cli, defaults: CompressionRequest) -> Result<CompressionRequest, String> {
    let mut request = defaults;
    if let Some(max_width) = cli.max_width {
        request = request.with_max_width(max_width);
    }
    if let Some(max_height) = cli.max_height {
        request = request.with_max_height(max_height);
    }
    if let Some(quality) = cli.quality {
        request = request.with_quality(quality);
    }
    if let Some(format) = &cli.format {
        request = request.with_target_format(TargetFormat::parse(format)?);
    }
    request.validate()?;
    Ok(request)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let mut settings = AppSettings::load_or_default(&cli.settings);
    if let Some(profile) = &cli.profile {
        settings.image.profile = profile.clone();
    }

    let config = match settings.image.to_image_config() {
        Ok(config) => config,
        Err(err) => {
            log::error!("设置无效：{}", err);
            return ExitCode::FAILURE;
        }
    };

    let request = match build_request(&cli, config.default_request) {
        Ok(request) => request,
        Err(err) => {
            log::error!("参数无效：{}", err);
            return ExitCode::FAILURE;
        }
    };

    let store = LocalImageStore::new(
        settings.storage.root_dir.clone(),
        settings.storage.public_base_url.clone(),
    );
    let service = ImageUploadService::new(config.clone(), store);

    let mut failures = 0usize;
    for path in &cli.files {
        let source = match SourceImage::from_file(path, &config) {
            Ok(source) => source,
            Err(err) => {
                log::error!("读取 {} 失败：{}", path.display(), err);
                failures += 1;
                continue;
            }
        };

        match service.upload(source, &cli.namespace, &request).await {
            Ok(receipt) => println!(
                "{} -> {} ({} -> {}{})",
                path.display(),
                receipt.public_url,
                format_size(receipt.original_size),
                format_size(receipt.stored_size),
                if receipt.compressed { "" } else { ", original" }
            ),
            Err(err) => {
                log::error!("上传 {} 失败：{}", path.display(), err);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
