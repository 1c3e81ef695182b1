// 封面来源
//
// 所有来源实现同一个 CoverSource 能力，按配置选择：
// - local: 本地目录中的图片
// - goodreads: Goodreads 导出的 CSV 或 RSS 订阅
// - search: Google Books + Open Library 搜索

pub mod goodreads;
pub mod local;
pub mod search;

use crate::external::{self, BookApiClient};
use crate::models::CoverRequest;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

pub use goodreads::{GoodreadsInput, GoodreadsSource};
pub use local::LocalSource;
pub use search::SearchSource;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        SourceError::Http(err.to_string())
    }
}

/// 封面来源能力
///
/// 返回的请求顺序即来源给出的顺序（例如 Goodreads 按阅读日期倒序）
#[async_trait]
pub trait CoverSource: Send + Sync {
    fn name(&self) -> &str;

    async fn cover_requests(&self, limit: usize) -> Result<Vec<CoverRequest>, SourceError>;
}

/// 来源配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceConfig {
    Local {
        path: PathBuf,
        #[serde(default)]
        recursive: bool,
    },
    Goodreads {
        /// CSV 路径、RSS 地址或用户 ID
        input: String,
        #[serde(default = "default_shelf")]
        shelf: String,
    },
    Search {
        query: String,
        #[serde(default)]
        genre: Option<String>,
    },
}

fn default_shelf() -> String {
    "read".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        SourceConfig::Local {
            path: PathBuf::from("."),
            recursive: false,
        }
    }
}

/// 按配置创建封面来源
pub fn build_source(config: &SourceConfig) -> Result<Box<dyn CoverSource>, SourceError> {
    match config {
        SourceConfig::Local { path, recursive } => {
            Ok(Box::new(LocalSource::new(path.clone(), *recursive)?))
        }
        SourceConfig::Goodreads { input, shelf } => {
            let client = external::http_client().map_err(|e| SourceError::Http(e.to_string()))?;
            let input = GoodreadsInput::detect(input, shelf);
            Ok(Box::new(GoodreadsSource::new(
                input,
                shelf.clone(),
                client.clone(),
                BookApiClient::new(client),
            )))
        }
        SourceConfig::Search { query, genre } => {
            if query.trim().is_empty() {
                return Err(SourceError::InvalidInput("search query is empty".to_string()));
            }
            let client = external::http_client().map_err(|e| SourceError::Http(e.to_string()))?;
            Ok(Box::new(SearchSource::new(
                query.clone(),
                genre.clone(),
                BookApiClient::new(client),
            )))
        }
    }
}
