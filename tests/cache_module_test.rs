// 端到端集成测试
//
// 本地封面目录 → 壁纸服务 → 壁纸文件，第二次运行全部从缓存读取

use bookcover_wallpaper::config::AppConfig;
use bookcover_wallpaper::services::{CacheStore, WallpaperService};
use bookcover_wallpaper::sources::{self, CoverSource, SourceConfig};
use image::{ImageBuffer, Rgba};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn create_test_png(path: &Path, width: u32, height: u32, color: [u8; 4]) {
    let img = ImageBuffer::from_pixel(width, height, Rgba(color));
    img.save(path).unwrap();
}

fn setup(temp_dir: &TempDir, covers: usize) -> AppConfig {
    let covers_dir = temp_dir.path().join("covers");
    std::fs::create_dir(&covers_dir).unwrap();
    for i in 0..covers {
        create_test_png(
            &covers_dir.join(format!("book_{:02}.png", i)),
            40,
            60 + i as u32 * 5,
            [200, i as u8 * 20, 50, 255],
        );
    }
    // 不是图片，应被忽略
    std::fs::write(covers_dir.join("notes.txt"), "not a cover").unwrap();

    AppConfig {
        canvas_width: 400,
        canvas_height: 300,
        column_count: Some(4),
        limit: 8,
        cache_dir: Some(temp_dir.path().join("cache")),
        output: temp_dir.path().join("wallpaper.png"),
        source: SourceConfig::Local {
            path: covers_dir,
            recursive: false,
        },
        ..AppConfig::default()
    }
}

#[tokio::test]
async fn test_local_directory_to_wallpaper() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir, 6);
    config.validate().unwrap();

    let source = sources::build_source(&config.source).unwrap();
    let service = WallpaperService::new(&config).await.unwrap();

    let wallpaper = service.generate(source.as_ref()).await.unwrap();
    assert_eq!(wallpaper.loaded, 6);
    assert_eq!(wallpaper.from_cache, 0);
    assert!(wallpaper.failures.is_empty());
    assert_eq!(wallpaper.placements.len(), 6);
    assert!(wallpaper.placements.iter().all(|p| p.width == 100));

    wallpaper.save(&config.output).unwrap();
    let saved = image::open(&config.output).unwrap();
    assert_eq!((saved.width(), saved.height()), (400, 300));

    // 每个封面一个缓存条目
    let store = CacheStore::open(config.cache_root()).await.unwrap();
    assert_eq!(store.stats().await.unwrap().entries, 6);
}

#[tokio::test]
async fn test_second_run_served_from_cache() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir, 5);
    let source = sources::build_source(&config.source).unwrap();

    let first = WallpaperService::new(&config)
        .await
        .unwrap()
        .generate(source.as_ref())
        .await
        .unwrap();

    // 新的服务实例（模拟新进程）共享同一缓存目录
    let second = WallpaperService::new(&config)
        .await
        .unwrap()
        .generate(source.as_ref())
        .await
        .unwrap();

    assert_eq!(second.from_cache, 5);
    assert_eq!(second.placements, first.placements);
    assert_eq!(second.canvas, first.canvas);
}

#[tokio::test]
async fn test_cache_served_after_source_removed() {
    let temp_dir = TempDir::new().unwrap();
    let config = setup(&temp_dir, 3);
    let source = sources::build_source(&config.source).unwrap();
    let service = WallpaperService::new(&config).await.unwrap();

    let requests = source.cover_requests(config.limit).await.unwrap();
    service.generate_from_requests(requests.clone()).await.unwrap();

    // 原图删掉后仍能从缓存生成
    for request in &requests {
        std::fs::remove_file(PathBuf::from(&request.source_id)).unwrap();
    }
    let wallpaper = service.generate_from_requests(requests).await.unwrap();
    assert_eq!(wallpaper.loaded, 3);
    assert_eq!(wallpaper.from_cache, 3);
}

#[tokio::test]
async fn test_size_bound_sweeps_on_startup() {
    let temp_dir = TempDir::new().unwrap();
    let mut config = setup(&temp_dir, 4);
    let source = sources::build_source(&config.source).unwrap();

    WallpaperService::new(&config)
        .await
        .unwrap()
        .generate(source.as_ref())
        .await
        .unwrap();

    config.cache_max_bytes = Some(1);
    WallpaperService::new(&config).await.unwrap();

    let store = CacheStore::open(config.cache_root()).await.unwrap();
    let stats = store.stats().await.unwrap();
    assert_eq!(stats.entries, 0);
}
