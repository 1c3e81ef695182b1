// 壁纸服务 - 组合各个组件生成一张壁纸
//
// 流程：
// 1. 从封面来源取请求（多取一些，补偿加载失败）
// 2. 按种子打乱顺序（可选）
// 3. 并发加载封面（优先读缓存）
// 4. 瀑布流布局 + 合成

use crate::config::AppConfig;
use crate::models::{CanvasSpec, CoverRequest, LayoutError, PlacementRect};
use crate::services::cache::{CacheError, CacheStore};
use crate::services::compositor::{Compositor, ExportError};
use crate::services::fetcher::{CoverFetcher, HttpFetcher, SourceFetcher};
use crate::services::image_loader::{ImageLoader, LoadFailure};
use crate::services::layout::MasonryLayout;
use crate::sources::{CoverSource, SourceError};
use image::RgbImage;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// 向来源多要的请求数，用于补偿加载失败的封面
const REQUEST_HEADROOM: usize = 6;

#[derive(Debug, Error)]
pub enum WallpaperError {
    #[error("缓存错误: {0}")]
    Cache(#[from] CacheError),

    #[error("封面来源错误: {0}")]
    Source(#[from] SourceError),

    #[error("画布配置错误: {0}")]
    Layout(#[from] LayoutError),

    #[error("没有可用的封面（请求 {requested} 个，全部失败）")]
    NoCovers { requested: usize },

    #[error("导出失败: {0}")]
    Export(#[from] ExportError),
}

/// 生成结果
pub struct Wallpaper {
    pub canvas: RgbImage,
    pub placements: Vec<PlacementRect>,
    pub failures: Vec<LoadFailure>,
    /// 成功加载的封面数
    pub loaded: usize,
    /// 其中来自缓存的封面数
    pub from_cache: usize,
}

impl Wallpaper {
    pub fn save(&self, path: &Path) -> Result<(), WallpaperError> {
        Compositor::export(&self.canvas, path)?;
        Ok(())
    }
}

/// 壁纸服务
pub struct WallpaperService {
    loader: ImageLoader,
    layout: MasonryLayout,
    compositor: Compositor,
    limit: usize,
    shuffle_seed: Option<u64>,
}

impl WallpaperService {
    /// 按配置创建服务
    ///
    /// 打开缓存目录，如果配置了清理上限则先清理一次
    pub async fn new(config: &AppConfig) -> Result<Self, WallpaperError> {
        let store = CacheStore::open(config.cache_root()).await?;

        let policy = config.sweep_policy();
        if !policy.is_unbounded() {
            let report = store.sweep(&policy).await?;
            info!(
                "缓存清理完成: 过期 {} 个, 超限淘汰 {} 个, 孤立文件 {} 个, 剩余 {} 字节",
                report.expired, report.evicted, report.orphans, report.remaining_bytes
            );
        }

        let http = HttpFetcher::new(config.fetch_attempts)
            .map_err(|e| WallpaperError::Source(SourceError::Http(e.to_string())))?;
        let fetcher: Arc<dyn CoverFetcher> = Arc::new(SourceFetcher::new(http));

        Ok(Self::from_parts(
            ImageLoader::new(store, fetcher, config.loader_config()),
            config.canvas_spec()?,
            Compositor::new(config.render_options()),
            config.limit,
            config.shuffle_seed,
        ))
    }

    pub fn from_parts(
        loader: ImageLoader,
        spec: CanvasSpec,
        compositor: Compositor,
        limit: usize,
        shuffle_seed: Option<u64>,
    ) -> Self {
        Self {
            loader,
            layout: MasonryLayout::new(spec),
            compositor,
            limit,
            shuffle_seed,
        }
    }

    pub fn loader(&self) -> &ImageLoader {
        &self.loader
    }

    pub fn spec(&self) -> &CanvasSpec {
        self.layout.spec()
    }

    /// 从封面来源生成壁纸
    pub async fn generate(&self, source: &dyn CoverSource) -> Result<Wallpaper, WallpaperError> {
        let requests = source
            .cover_requests(self.limit + REQUEST_HEADROOM)
            .await?;
        info!("来源 {} 提供了 {} 个封面请求", source.name(), requests.len());

        self.generate_from_requests(requests).await
    }

    /// 从封面请求生成壁纸
    pub async fn generate_from_requests(
        &self,
        mut requests: Vec<CoverRequest>,
    ) -> Result<Wallpaper, WallpaperError> {
        if let Some(seed) = self.shuffle_seed {
            let mut rng = StdRng::seed_from_u64(seed);
            requests.shuffle(&mut rng);
        }

        let requested = requests.len();
        let batch = self.loader.load_batch(requests).await;

        let mut images = batch.images;
        images.truncate(self.limit);
        if images.is_empty() {
            return Err(WallpaperError::NoCovers { requested });
        }

        let placements = self.layout.layout(&images);
        let canvas = self.compositor.render(&images, &placements, self.layout.spec());

        info!(
            "壁纸生成完成: {} 个封面（缓存命中 {}），放置 {} 个，失败 {} 个",
            images.len(),
            batch.from_cache,
            placements.len(),
            batch.failures.len()
        );

        Ok(Wallpaper {
            canvas,
            placements,
            failures: batch.failures,
            loaded: images.len(),
            from_cache: batch.from_cache,
        })
    }
}
