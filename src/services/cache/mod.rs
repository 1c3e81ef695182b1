// 缓存模块 - 封面持久化缓存
//
// 本模块提供封面图片的磁盘缓存功能，包括：
// - 缓存键与缓存文件路径
// - 按缓存键加锁（同一封面只获取一次）
// - 图片编解码（缓存格式为无损 WebP）
// - 原子写入、清空、按时间/大小清理、统计

pub mod cache_store;
pub mod config;
pub mod error;
pub mod key_lock;
pub mod path;
pub mod webp_converter;

pub use cache_store::{CacheEntry, CacheStats, CacheStore, SweepReport};
pub use config::SweepPolicy;
pub use error::{CacheError, CacheIoError, DecodeError, FetchError, LoadError, LoadErrorKind};
pub use key_lock::{KeyGuard, KeyLocks};
pub use path::CachePath;
pub use webp_converter::WebPConverter;
