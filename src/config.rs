// 应用配置 - JSON 配置文件 + 环境变量覆盖
//
// 加载顺序：
// - 默认值
// - 配置文件（参数指定，或 WALLPAPER_CONFIG 环境变量）
// - 环境变量覆盖（WALLPAPER_*）

use crate::models::{CanvasSpec, LayoutError};
use crate::services::cache::{CachePath, SweepPolicy};
use crate::services::compositor::RenderOptions;
use crate::services::image_loader::LoaderConfig;
use crate::sources::SourceConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置无效: {0}")]
    Invalid(String),

    #[error("画布配置无效: {0}")]
    Layout(#[from] LayoutError),
}

/// 应用配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// 画布宽度（像素）
    pub canvas_width: u32,

    /// 画布高度（像素）
    pub canvas_height: u32,

    /// 列数，未设置时按 tile_width 推算
    pub column_count: Option<u32>,

    /// 期望的封面宽度（像素）
    pub tile_width: u32,

    /// 最多使用的封面数
    pub limit: usize,

    /// 封面之间的间隙（像素）
    pub gap: u32,

    /// 背景色（RGB）
    pub background: [u8; 3],

    /// 缓存目录，未设置时使用用户缓存目录
    pub cache_dir: Option<PathBuf>,

    pub max_concurrent_fetches: usize,
    pub max_concurrent_decodes: usize,
    pub fetch_timeout_secs: u64,
    pub fetch_attempts: u32,

    /// 缓存最大保存天数
    pub cache_max_age_days: Option<u32>,

    /// 缓存总大小上限（字节）
    pub cache_max_bytes: Option<u64>,

    /// 封面顺序打乱的随机种子，未设置时保持来源顺序
    pub shuffle_seed: Option<u64>,

    /// 输出文件路径
    pub output: PathBuf,

    pub source: SourceConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1920,
            canvas_height: 1080,
            column_count: None,
            tile_width: 320,
            limit: 18,
            gap: 4,
            background: [30, 30, 30],
            cache_dir: None,
            max_concurrent_fetches: 5,
            max_concurrent_decodes: 3,
            fetch_timeout_secs: 30,
            fetch_attempts: 3,
            cache_max_age_days: None,
            cache_max_bytes: None,
            shuffle_seed: None,
            output: PathBuf::from("wallpaper.png"),
            source: SourceConfig::default(),
        }
    }
}

impl AppConfig {
    /// 加载配置
    ///
    /// # 参数
    /// - `config_path`: 配置文件路径，为 None 时读取 `WALLPAPER_CONFIG` 环境变量
    ///
    /// # 行为
    /// - 配置文件不存在时使用默认配置
    /// - 配置文件损坏时备份旧文件并使用默认配置
    /// - 最后应用 `WALLPAPER_*` 环境变量覆盖并校验
    pub async fn load(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let config_path = config_path.or_else(|| std::env::var("WALLPAPER_CONFIG").ok().map(PathBuf::from));

        let mut config = match config_path {
            Some(path) => Self::from_file(&path).await,
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// 从 JSON 文件读取配置
    pub async fn from_file(path: &Path) -> Self {
        if !path.exists() {
            tracing::info!("配置文件不存在，使用默认配置: {:?}", path);
            return Self::default();
        }

        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) => {
                tracing::warn!("读取配置文件失败，使用默认配置: {}", e);
                return Self::default();
            }
        };

        match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => {
                tracing::info!("成功加载配置: {:?}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件损坏，使用默认配置: {}", e);
                Self::backup_corrupted_config(path).await;
                Self::default()
            }
        }
    }

    /// 备份损坏的配置文件为 `{name}.json.backup`，备份失败只记录警告
    async fn backup_corrupted_config(path: &Path) {
        let backup_path = path.with_extension("json.backup");

        match fs::rename(path, &backup_path).await {
            Ok(_) => tracing::info!("已备份损坏的配置文件到: {:?}", backup_path),
            Err(e) => tracing::warn!("备份配置文件失败: {}", e),
        }
    }

    /// 应用环境变量覆盖
    ///
    /// `lookup` 按变量名返回值，正常运行时就是 `std::env::var`
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get("WALLPAPER_WIDTH") {
            self.canvas_width = parse_value("WALLPAPER_WIDTH", &v)?;
        }
        if let Some(v) = get("WALLPAPER_HEIGHT") {
            self.canvas_height = parse_value("WALLPAPER_HEIGHT", &v)?;
        }
        if let Some(v) = get("WALLPAPER_COLUMNS") {
            self.column_count = Some(parse_value("WALLPAPER_COLUMNS", &v)?);
        }
        if let Some(v) = get("WALLPAPER_TILE_WIDTH") {
            self.tile_width = parse_value("WALLPAPER_TILE_WIDTH", &v)?;
        }
        if let Some(v) = get("WALLPAPER_LIMIT") {
            self.limit = parse_value("WALLPAPER_LIMIT", &v)?;
        }
        if let Some(v) = get("WALLPAPER_GAP") {
            self.gap = parse_value("WALLPAPER_GAP", &v)?;
        }
        if let Some(v) = get("WALLPAPER_CACHE_DIR") {
            self.cache_dir = Some(PathBuf::from(v));
        }
        if let Some(v) = get("WALLPAPER_MAX_FETCHES") {
            self.max_concurrent_fetches = parse_value("WALLPAPER_MAX_FETCHES", &v)?;
        }
        if let Some(v) = get("WALLPAPER_FETCH_TIMEOUT") {
            self.fetch_timeout_secs = parse_value("WALLPAPER_FETCH_TIMEOUT", &v)?;
        }
        if let Some(v) = get("WALLPAPER_CACHE_MAX_AGE_DAYS") {
            self.cache_max_age_days = Some(parse_value("WALLPAPER_CACHE_MAX_AGE_DAYS", &v)?);
        }
        if let Some(v) = get("WALLPAPER_CACHE_MAX_BYTES") {
            self.cache_max_bytes = Some(parse_value("WALLPAPER_CACHE_MAX_BYTES", &v)?);
        }
        if let Some(v) = get("WALLPAPER_SEED") {
            self.shuffle_seed = Some(parse_value("WALLPAPER_SEED", &v)?);
        }
        if let Some(v) = get("WALLPAPER_OUTPUT") {
            self.output = PathBuf::from(v);
        }

        if let Some(kind) = get("WALLPAPER_SOURCE") {
            self.source = match kind.to_lowercase().as_str() {
                "local" => SourceConfig::Local {
                    path: PathBuf::from(get("WALLPAPER_PATH").unwrap_or_else(|| ".".to_string())),
                    recursive: get("WALLPAPER_RECURSIVE")
                        .map(|v| parse_value::<bool>("WALLPAPER_RECURSIVE", &v))
                        .transpose()?
                        .unwrap_or(false),
                },
                "goodreads" => SourceConfig::Goodreads {
                    input: get("WALLPAPER_GOODREADS").ok_or_else(|| {
                        ConfigError::Invalid("WALLPAPER_GOODREADS 未设置".to_string())
                    })?,
                    shelf: get("WALLPAPER_SHELF").unwrap_or_else(|| "read".to_string()),
                },
                "search" => SourceConfig::Search {
                    query: get("WALLPAPER_QUERY").ok_or_else(|| {
                        ConfigError::Invalid("WALLPAPER_QUERY 未设置".to_string())
                    })?,
                    genre: get("WALLPAPER_GENRE"),
                },
                other => {
                    return Err(ConfigError::Invalid(format!(
                        "未知的封面来源: {}",
                        other
                    )))
                }
            };
        }

        Ok(())
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limit == 0 {
            return Err(ConfigError::Invalid("limit 必须大于 0".to_string()));
        }
        if self.max_concurrent_fetches == 0 || self.max_concurrent_decodes == 0 {
            return Err(ConfigError::Invalid("并发数必须大于 0".to_string()));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(ConfigError::Invalid("fetch_timeout_secs 必须大于 0".to_string()));
        }
        if self.fetch_attempts == 0 {
            return Err(ConfigError::Invalid("fetch_attempts 必须大于 0".to_string()));
        }

        self.canvas_spec()?;
        Ok(())
    }

    /// 画布规格
    pub fn canvas_spec(&self) -> Result<CanvasSpec, LayoutError> {
        match self.column_count {
            Some(columns) => CanvasSpec::new(self.canvas_width, self.canvas_height, columns),
            None => CanvasSpec::with_tile_width(self.canvas_width, self.canvas_height, self.tile_width),
        }
    }

    /// 缓存根目录
    pub fn cache_root(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(CachePath::default_root)
    }

    pub fn sweep_policy(&self) -> SweepPolicy {
        SweepPolicy::new(self.cache_max_age_days, self.cache_max_bytes)
    }

    pub fn loader_config(&self) -> LoaderConfig {
        LoaderConfig {
            max_concurrent_fetches: self.max_concurrent_fetches,
            max_concurrent_decodes: self.max_concurrent_decodes,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
        }
    }

    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            background: self.background,
            gutter: self.gap,
        }
    }
}

fn parse_value<T>(key: &str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse::<T>()
        .map_err(|e| ConfigError::Invalid(format!("{}={}: {}", key, value, e)))
}
