// 缓存路径管理
//
// 提供统一的缓存键计算和缓存文件路径生成功能：
// - 来源标识规范化
// - SHA-256 缓存键
// - 图片文件 / 元数据文件 / 临时文件路径

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use url::Url;

/// 缓存路径生成器
///
/// 同一个来源标识在任何进程、任何一次运行中都映射到同一个文件路径
#[derive(Debug, Clone)]
pub struct CachePath {
    root: PathBuf,
}

impl CachePath {
    /// 默认缓存目录名
    const APP_DIR: &'static str = "bookcover-wallpaper";

    /// 图片文件扩展名（无损 WebP）
    const ARTIFACT_EXT: &'static str = "webp";

    /// 元数据文件扩展名
    const META_EXT: &'static str = "json";

    /// 临时文件扩展名
    const TEMP_EXT: &'static str = "tmp";

    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// 获取缓存根目录
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// 默认缓存根目录
    ///
    /// Linux 上为 `~/.cache/bookcover-wallpaper`
    pub fn default_root() -> PathBuf {
        dirs::cache_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".cache")))
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join(Self::APP_DIR)
    }

    /// 规范化来源标识
    ///
    /// - 去掉首尾空白
    /// - URL 重新序列化（协议/主机大小写、默认端口不影响结果）
    /// - 其他视为文件路径，统一使用 `/` 分隔
    pub fn normalize_source_id(source_id: &str) -> String {
        let trimmed = source_id.trim();

        if let Ok(url) = Url::parse(trimmed) {
            if matches!(url.scheme(), "http" | "https" | "file") {
                return url.to_string();
            }
        }

        trimmed.replace('\\', "/")
    }

    /// 计算缓存键（规范化来源标识的 SHA-256，64 位小写十六进制）
    ///
    /// # 示例
    /// ```
    /// use bookcover_wallpaper::services::cache::CachePath;
    ///
    /// let a = CachePath::cache_key("HTTPS://Example.com/cover.jpg");
    /// let b = CachePath::cache_key("https://example.com/cover.jpg");
    /// assert_eq!(a, b);
    /// assert_eq!(a.len(), 64);
    /// ```
    pub fn cache_key(source_id: &str) -> String {
        let normalized = Self::normalize_source_id(source_id);
        format!("{:x}", Sha256::digest(normalized.as_bytes()))
    }

    /// 图片文件路径：`{root}/{key}.webp`
    pub fn artifact_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, Self::ARTIFACT_EXT))
    }

    /// 元数据文件路径：`{root}/{key}.json`
    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.root.join(format!("{}.{}", key, Self::META_EXT))
    }

    /// 临时文件路径：`{root}/.{key}.{uuid}.tmp`
    ///
    /// 写入完成后再 rename 到正式路径
    pub fn temp_path(&self, key: &str) -> PathBuf {
        self.root.join(format!(
            ".{}.{}.{}",
            key,
            uuid::Uuid::new_v4().simple(),
            Self::TEMP_EXT
        ))
    }

    /// 从缓存目录中的文件名解析缓存键
    ///
    /// 只识别 `{key}.webp` / `{key}.json`，临时文件和其他文件返回 None
    pub fn key_from_path(path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        if ext != Self::ARTIFACT_EXT && ext != Self::META_EXT {
            return None;
        }

        let stem = path.file_stem()?.to_str()?;
        let is_key = stem.len() == 64
            && stem
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));

        is_key.then(|| stem.to_string())
    }

    /// 是否为（可能残留的）临时文件
    pub fn is_temp_file(path: &Path) -> bool {
        let is_hidden = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with('.'))
            .unwrap_or(false);
        let is_tmp = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e == Self::TEMP_EXT)
            .unwrap_or(false);
        is_hidden && is_tmp
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_is_deterministic() {
        let key1 = CachePath::cache_key("https://covers.openlibrary.org/b/id/1-L.jpg");
        let key2 = CachePath::cache_key("https://covers.openlibrary.org/b/id/1-L.jpg");
        assert_eq!(key1, key2);
        assert_eq!(key1.len(), 64);

        let key3 = CachePath::cache_key("https://covers.openlibrary.org/b/id/2-L.jpg");
        assert_ne!(key1, key3);
    }

    #[test]
    fn test_normalize_source_id() {
        assert_eq!(
            CachePath::normalize_source_id("  HTTPS://Example.COM:443/a.jpg "),
            "https://example.com/a.jpg"
        );
        assert_eq!(
            CachePath::normalize_source_id("covers\\dune.jpg"),
            "covers/dune.jpg"
        );
        assert_eq!(
            CachePath::cache_key("covers\\dune.jpg"),
            CachePath::cache_key("covers/dune.jpg")
        );
    }

    #[test]
    fn test_entry_paths() {
        let paths = CachePath::new("/tmp/covers");
        let key = CachePath::cache_key("a.jpg");

        let artifact = paths.artifact_path(&key);
        assert_eq!(artifact.extension().unwrap(), "webp");
        assert_eq!(artifact.parent().unwrap(), Path::new("/tmp/covers"));

        let meta = paths.meta_path(&key);
        assert_eq!(meta.extension().unwrap(), "json");

        assert_eq!(CachePath::key_from_path(&artifact), Some(key.clone()));
        assert_eq!(CachePath::key_from_path(&meta), Some(key.clone()));
    }

    #[test]
    fn test_temp_paths_are_unique() {
        let paths = CachePath::new("/tmp/covers");
        let key = CachePath::cache_key("a.jpg");

        let tmp1 = paths.temp_path(&key);
        let tmp2 = paths.temp_path(&key);
        assert_ne!(tmp1, tmp2);
        assert!(CachePath::is_temp_file(&tmp1));
        assert_eq!(CachePath::key_from_path(&tmp1), None);
    }

    #[test]
    fn test_key_from_foreign_file() {
        assert_eq!(CachePath::key_from_path(Path::new("/tmp/covers/readme.json")), None);
        assert_eq!(CachePath::key_from_path(Path::new("/tmp/covers/notes.txt")), None);
    }

    #[test]
    fn test_default_root() {
        let root = CachePath::default_root();
        assert!(root.ends_with("bookcover-wallpaper"));
    }
}
