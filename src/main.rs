use std::path::PathBuf;

use bookcover_wallpaper::config::AppConfig;
use bookcover_wallpaper::services::WallpaperService;
use bookcover_wallpaper::sources;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenv::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 唯一的位置参数是配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = AppConfig::load(config_path).await?;

    let spec = config.canvas_spec()?;
    tracing::info!(
        "Generating {}x{} wallpaper ({} columns, up to {} covers)",
        spec.width(),
        spec.height(),
        spec.column_count(),
        config.limit
    );

    let source = sources::build_source(&config.source)?;
    let service = WallpaperService::new(&config).await?;

    let wallpaper = match service.generate(source.as_ref()).await {
        Ok(wallpaper) => wallpaper,
        Err(e) => {
            tracing::error!("Failed to generate wallpaper: {}", e);
            return Err(e.into());
        }
    };

    wallpaper.save(&config.output)?;
    tracing::info!(
        "✓ Wallpaper saved to {:?} ({} covers, {} from cache, {} failed)",
        config.output,
        wallpaper.loaded,
        wallpaper.from_cache,
        wallpaper.failures.len()
    );

    Ok(())
}
