// 封面缓存与加载的错误类型定义
//
// 定义了封面获取、解码、缓存读写中可能出现的各种错误类型：
// - FetchError: 单个封面的网络/文件获取失败
// - DecodeError: 图片数据无效
// - CacheIoError: 缓存目录不可读写（区别于普通的未命中）
// - CacheError: 缓存存储的统一错误类型
// - LoadError: 单个封面加载失败（批量加载时按条目上报）

use std::path::PathBuf;
use thiserror::Error;

/// 缓存存储的统一错误类型
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("缓存 IO 错误: {0}")]
    CacheIo(#[from] CacheIoError),

    #[error("缓存图片编解码错误: {0}")]
    Decode(#[from] DecodeError),

    #[error("缓存元数据错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("后台任务执行失败: {0}")]
    Task(String),

    #[error("缓存键与持有的锁不匹配: {0}")]
    KeyMismatch(String),
}

/// 获取相关错误
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("网络错误: {0}")]
    Network(String),

    #[error("获取超时")]
    Timeout,

    #[error("HTTP 错误: 状态码 {0}")]
    HttpStatus(u16),

    #[error("无效的来源标识: {0}")]
    InvalidSource(String),

    #[error("文件不存在: {0}")]
    NotFound(PathBuf),

    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl FetchError {
    /// 是否值得重试（网络抖动、超时、服务端错误、限流）
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Network(_) | FetchError::Timeout => true,
            FetchError::HttpStatus(code) => *code == 429 || *code >= 500,
            _ => false,
        }
    }
}

/// 图片解码/编码相关错误
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("不支持的图片格式: {0}")]
    UnsupportedFormat(String),

    #[error("图片解码失败: {0}")]
    DecodeFailed(String),

    #[error("图片尺寸为零")]
    EmptyImage,

    #[error("图片编码失败: {0}")]
    EncodeFailed(String),
}

/// 缓存目录读写错误
#[derive(Debug, Error)]
pub enum CacheIoError {
    #[error("创建缓存目录失败: {path}: {source}")]
    CreateRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("读取缓存失败: {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("写入缓存失败: {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("删除缓存失败: {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// 单个封面加载失败的原因
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("获取失败: {0}")]
    Fetch(#[from] FetchError),

    #[error("解码失败: {0}")]
    Decode(#[from] DecodeError),

    #[error("加载任务异常退出: {0}")]
    Aborted(String),
}

/// 加载失败的类别标签
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadErrorKind {
    Fetch,
    Decode,
    Aborted,
}

impl LoadError {
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::Fetch(_) => LoadErrorKind::Fetch,
            LoadError::Decode(_) => LoadErrorKind::Decode,
            LoadError::Aborted(_) => LoadErrorKind::Aborted,
        }
    }
}

// 实现从 reqwest::Error 到 FetchError 的转换
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_status() {
            if let Some(status) = err.status() {
                FetchError::HttpStatus(status.as_u16())
            } else {
                FetchError::Network(err.to_string())
            }
        } else {
            FetchError::Network(err.to_string())
        }
    }
}
