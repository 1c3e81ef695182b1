// 封面获取器 - 按来源标识读取原始图片字节
//
// - HttpFetcher: reqwest 下载，瞬时错误自动重试
// - FileFetcher: 读取本地文件（普通路径或 file:// URL）
// - SourceFetcher: 按来源标识的协议分派到上面两者

use crate::models::CoverRequest;
use crate::services::cache::FetchError;
use async_trait::async_trait;
use reqwest::Client;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, error, warn};
use url::Url;

const USER_AGENT: &str = concat!("bookcover-wallpaper/", env!("CARGO_PKG_VERSION"));

/// 原始字节获取能力
///
/// 实现者只负责拿到字节，不做解码和缓存
#[async_trait]
pub trait CoverFetcher: Send + Sync {
    async fn fetch(&self, request: &CoverRequest) -> Result<Vec<u8>, FetchError>;
}

/// HTTP 获取器
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
}

impl HttpFetcher {
    /// 创建 HTTP 获取器
    ///
    /// # 参数
    /// - `max_attempts`: 最多尝试次数（包含第一次），至少为 1
    pub fn new(max_attempts: u32) -> Result<Self, FetchError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .pool_max_idle_per_host(10) // 每个主机最多保持 10 个空闲连接
            .pool_idle_timeout(Duration::from_secs(90))
            .build()
            .map_err(|e| FetchError::Network(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            max_attempts: max_attempts.max(1),
            retry_delay: Duration::from_secs(1),
        })
    }

    /// 设置重试间隔
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    async fn fetch_once(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl CoverFetcher for HttpFetcher {
    async fn fetch(&self, request: &CoverRequest) -> Result<Vec<u8>, FetchError> {
        let url = request.source_id.as_str();
        debug!("开始下载封面: {}", url);

        let mut attempt = 1;
        loop {
            match self.fetch_once(url).await {
                Ok(data) => {
                    debug!(
                        "封面下载成功: {} ({} 字节, 尝试 {}/{})",
                        url,
                        data.len(),
                        attempt,
                        self.max_attempts
                    );
                    return Ok(data);
                }
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    warn!(
                        "封面下载失败 (尝试 {}/{}): {} - 错误: {}",
                        attempt, self.max_attempts, url, e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!("封面下载失败，放弃: {} - 错误: {}", url, e);
                    return Err(e);
                }
            }
        }
    }
}

/// 本地文件获取器
#[derive(Debug, Clone, Copy, Default)]
pub struct FileFetcher;

impl FileFetcher {
    /// 把来源标识解析为本地路径
    pub fn resolve_path(source_id: &str) -> Result<PathBuf, FetchError> {
        let trimmed = source_id.trim();
        if trimmed.is_empty() {
            return Err(FetchError::InvalidSource("来源标识为空".to_string()));
        }

        if trimmed.starts_with("file://") {
            let url = Url::parse(trimmed)
                .map_err(|e| FetchError::InvalidSource(format!("{}: {}", trimmed, e)))?;
            return url
                .to_file_path()
                .map_err(|_| FetchError::InvalidSource(trimmed.to_string()));
        }

        Ok(PathBuf::from(trimmed))
    }
}

#[async_trait]
impl CoverFetcher for FileFetcher {
    async fn fetch(&self, request: &CoverRequest) -> Result<Vec<u8>, FetchError> {
        let path = Self::resolve_path(&request.source_id)?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!("读取本地封面: {} ({} 字节)", path.display(), data.len());
                Ok(data)
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(FetchError::NotFound(path)),
            Err(e) => Err(FetchError::Io(e)),
        }
    }
}

/// 按协议分派的获取器：http(s) 走网络，其他走本地文件
#[derive(Clone)]
pub struct SourceFetcher {
    http: HttpFetcher,
    file: FileFetcher,
}

impl SourceFetcher {
    pub fn new(http: HttpFetcher) -> Self {
        Self {
            http,
            file: FileFetcher,
        }
    }

    pub fn is_remote(source_id: &str) -> bool {
        let lower = source_id.trim_start().to_ascii_lowercase();
        lower.starts_with("http://") || lower.starts_with("https://")
    }
}

#[async_trait]
impl CoverFetcher for SourceFetcher {
    async fn fetch(&self, request: &CoverRequest) -> Result<Vec<u8>, FetchError> {
        if Self::is_remote(&request.source_id) {
            self.http.fetch(request).await
        } else {
            self.file.fetch(request).await
        }
    }
}
