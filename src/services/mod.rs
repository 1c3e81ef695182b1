pub mod cache;
pub mod compositor;
pub mod fetcher;
pub mod image_loader;
pub mod layout;
pub mod wallpaper_service;

pub use cache::{CacheError, CachePath, CacheStats, CacheStore, SweepPolicy};
pub use compositor::{Compositor, ExportError, RenderOptions};
pub use fetcher::{CoverFetcher, FileFetcher, HttpFetcher, SourceFetcher};
pub use image_loader::{BatchResult, ImageLoader, LoadedCover, LoaderConfig};
pub use layout::MasonryLayout;
pub use wallpaper_service::{Wallpaper, WallpaperError, WallpaperService};
