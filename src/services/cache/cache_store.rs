// 封面缓存存储 - 磁盘上的持久化封面缓存
//
// 本模块负责：
// - 按来源标识读取缓存（损坏的缓存文件视为未命中）
// - 原子写入缓存（临时文件 + rename，读者不会看到写了一半的文件）
// - 元数据（尺寸、大小、校验和、创建时间）
// - 清空、按时间/大小清理、统计

use crate::models::CoverImage;
use crate::services::cache::{
    CacheError, CacheIoError, CachePath, KeyGuard, KeyLocks, SweepPolicy, WebPConverter,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::task;
use tracing::{debug, info, warn};

/// 缓存条目元数据（`{key}.json`）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    /// 缓存键
    pub key: String,

    /// 原始来源标识
    pub source_id: String,

    /// 缓存图片路径
    pub path: PathBuf,

    pub width: u32,
    pub height: u32,

    /// 缓存图片大小（字节）
    pub size_bytes: u64,

    /// 缓存图片的 SHA-256
    pub checksum: String,

    pub created_at: DateTime<Utc>,
}

/// 缓存统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// 缓存图片数
    pub entries: usize,

    /// 总缓存大小（字节，包含元数据文件）
    pub total_size: u64,
}

/// 一次清理的结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    /// 因超过保存时间删除的条目数
    pub expired: usize,

    /// 因超过大小上限删除的条目数
    pub evicted: usize,

    /// 删除的孤立文件数（缺少元数据或图片）
    pub orphans: usize,

    /// 清理后剩余的缓存图片大小（字节）
    pub remaining_bytes: u64,
}

/// 封面缓存存储
///
/// 可以在多个任务之间克隆共享，同一个缓存键的写入由 `KeyLocks` 串行化。
#[derive(Clone)]
pub struct CacheStore {
    paths: CachePath,
    locks: KeyLocks,
}

impl CacheStore {
    /// 打开（必要时创建）缓存目录
    ///
    /// # 返回
    /// - `Err(CacheError::CacheIo)`: 缓存目录无法创建，这是致命错误
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let paths = CachePath::new(root);

        fs::create_dir_all(paths.root())
            .await
            .map_err(|source| CacheIoError::CreateRoot {
                path: paths.root().to_path_buf(),
                source,
            })?;

        info!("缓存目录已就绪: {}", paths.root().display());

        Ok(Self {
            paths,
            locks: KeyLocks::new(),
        })
    }

    pub fn root(&self) -> &Path {
        self.paths.root()
    }

    /// 获取来源标识对应缓存键的锁
    ///
    /// 持有期间其他任务无法写入同一个缓存键，可用于"检查-获取-写入"整个流程
    pub async fn lock(&self, source_id: &str) -> KeyGuard {
        self.locks.lock(&CachePath::cache_key(source_id)).await
    }

    /// 读取缓存
    ///
    /// # 返回
    /// - `Ok(Some(image))`: 命中
    /// - `Ok(None)`: 未命中，或缓存文件损坏（按未命中处理，下次写入会覆盖）
    /// - `Err(CacheError::CacheIo)`: 缓存文件存在但无法读取
    pub async fn get(&self, source_id: &str) -> Result<Option<CoverImage>, CacheError> {
        let key = CachePath::cache_key(source_id);
        let path = self.paths.artifact_path(&key);

        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("缓存未命中: {}", source_id);
                return Ok(None);
            }
            Err(source) => return Err(CacheIoError::Read { path, source }.into()),
        };

        let pixels = match WebPConverter::decode_webp_async(data).await {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("缓存文件损坏，按未命中处理: {} ({})", path.display(), e);
                return Ok(None);
            }
        };

        match CoverImage::from_rgba(source_id, pixels) {
            Ok(image) => {
                debug!("缓存命中: {}", source_id);
                Ok(Some(image))
            }
            Err(e) => {
                warn!("缓存图片无效，按未命中处理: {} ({})", path.display(), e);
                Ok(None)
            }
        }
    }

    /// 读取缓存条目元数据（不解码图片）
    pub async fn entry(&self, source_id: &str) -> Result<Option<CacheEntry>, CacheError> {
        self.read_entry(&CachePath::cache_key(source_id)).await
    }

    /// 写入缓存
    ///
    /// 内部先获取缓存键的锁。如果调用方已经持有锁，使用 [`CacheStore::put_locked`]。
    pub async fn put(&self, source_id: &str, image: &CoverImage) -> Result<CacheEntry, CacheError> {
        let guard = self.lock(source_id).await;
        self.put_locked(&guard, source_id, image).await
    }

    /// 在已持有锁的情况下写入缓存
    ///
    /// 已存在且校验和一致的条目不会重写，直接返回现有元数据。
    pub async fn put_locked(
        &self,
        guard: &KeyGuard,
        source_id: &str,
        image: &CoverImage,
    ) -> Result<CacheEntry, CacheError> {
        let key = CachePath::cache_key(source_id);
        if guard.key() != key {
            return Err(CacheError::KeyMismatch(source_id.to_string()));
        }

        if let Some(existing) = self.valid_entry(&key).await? {
            debug!("缓存已存在，跳过写入: {}", source_id);
            return Ok(existing);
        }

        let to_encode = image.clone();
        let encoded = task::spawn_blocking(move || WebPConverter::encode_lossless(to_encode.pixels()))
            .await
            .map_err(|e| CacheError::Task(e.to_string()))??;

        let artifact_path = self.paths.artifact_path(&key);
        self.write_atomic(&key, &artifact_path, &encoded).await?;

        let entry = CacheEntry {
            key: key.clone(),
            source_id: source_id.to_string(),
            path: artifact_path,
            width: image.width(),
            height: image.height(),
            size_bytes: encoded.len() as u64,
            checksum: checksum(&encoded),
            created_at: Utc::now(),
        };

        let meta = serde_json::to_vec_pretty(&entry)?;
        self.write_atomic(&key, &self.paths.meta_path(&key), &meta)
            .await?;

        debug!(
            "缓存写入完成: {} ({}x{}, {} 字节)",
            source_id, entry.width, entry.height, entry.size_bytes
        );

        Ok(entry)
    }

    /// 清空缓存
    ///
    /// # 返回
    /// - `Ok(usize)`: 删除的缓存图片数
    pub async fn clear(&self) -> Result<usize, CacheError> {
        info!("开始清空缓存: {}", self.root().display());

        let mut removed = 0;
        for path in self.list_files().await? {
            if CachePath::key_from_path(&path).is_none() && !CachePath::is_temp_file(&path) {
                continue;
            }
            if remove_if_exists(&path).await? && is_artifact(&path) {
                removed += 1;
            }
        }

        info!("缓存清空完成: 删除图片数={}", removed);
        Ok(removed)
    }

    /// 按策略清理缓存
    ///
    /// 1. 删除孤立文件（只有图片没有元数据，或元数据指向不存在的图片）
    /// 2. 删除超过最大保存时间的条目
    /// 3. 总大小仍超过上限时，从最旧的条目开始删除
    pub async fn sweep(&self, policy: &SweepPolicy) -> Result<SweepReport, CacheError> {
        info!("开始清理缓存: {:?}", policy);

        let mut report = SweepReport::default();
        let (mut entries, orphans) = self.scan().await?;

        for key in orphans {
            let _guard = self.locks.lock(&key).await;
            // 拿到锁后再确认一次，避免删掉正在写入的条目
            if self.valid_entry(&key).await?.is_some() {
                continue;
            }
            self.remove_key(&key).await?;
            report.orphans += 1;
        }

        if let Some(max_age) = policy.max_age() {
            let cutoff = Utc::now() - max_age;
            let mut kept = Vec::with_capacity(entries.len());
            for entry in entries {
                if entry.created_at < cutoff {
                    let _guard = self.locks.lock(&entry.key).await;
                    self.remove_key(&entry.key).await?;
                    report.expired += 1;
                } else {
                    kept.push(entry);
                }
            }
            entries = kept;
        }

        let mut total: u64 = entries.iter().map(|e| e.size_bytes).sum();
        if let Some(max_bytes) = policy.max_bytes {
            entries.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            for entry in &entries {
                if total <= max_bytes {
                    break;
                }
                let _guard = self.locks.lock(&entry.key).await;
                self.remove_key(&entry.key).await?;
                total = total.saturating_sub(entry.size_bytes);
                report.evicted += 1;
            }
        }
        report.remaining_bytes = total;

        info!(
            "缓存清理完成: 过期={}, 超限={}, 孤立={}, 剩余={} 字节",
            report.expired, report.evicted, report.orphans, report.remaining_bytes
        );

        Ok(report)
    }

    /// 统计缓存
    pub async fn stats(&self) -> Result<CacheStats, CacheError> {
        let mut stats = CacheStats::default();

        for path in self.list_files().await? {
            if CachePath::key_from_path(&path).is_none() {
                continue;
            }
            let metadata = fs::metadata(&path)
                .await
                .map_err(|source| CacheIoError::Read {
                    path: path.clone(),
                    source,
                })?;
            stats.total_size += metadata.len();
            if is_artifact(&path) {
                stats.entries += 1;
            }
        }

        debug!(
            "缓存统计: 图片数={}, 总大小={} 字节",
            stats.entries, stats.total_size
        );
        Ok(stats)
    }

    /// 读取元数据，缺失或损坏时返回 None
    async fn read_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let path = self.paths.meta_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheIoError::Read { path, source }.into()),
        };

        match serde_json::from_slice::<CacheEntry>(&data) {
            Ok(entry) if entry.key == key => Ok(Some(entry)),
            Ok(_) => {
                warn!("缓存元数据与文件名不一致: {}", path.display());
                Ok(None)
            }
            Err(e) => {
                warn!("缓存元数据损坏: {} ({})", path.display(), e);
                Ok(None)
            }
        }
    }

    /// 元数据存在，且图片文件的校验和与元数据一致
    async fn valid_entry(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let Some(entry) = self.read_entry(key).await? else {
            return Ok(None);
        };

        let path = self.paths.artifact_path(key);
        let data = match fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(CacheIoError::Read { path, source }.into()),
        };

        if checksum(&data) != entry.checksum {
            warn!("缓存校验和不一致，将重新写入: {}", path.display());
            return Ok(None);
        }

        Ok(Some(entry))
    }

    /// 写入临时文件后 rename 到目标路径
    async fn write_atomic(&self, key: &str, dest: &Path, data: &[u8]) -> Result<(), CacheError> {
        let tmp = self.paths.temp_path(key);

        if let Err(source) = fs::write(&tmp, data).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheIoError::Write { path: tmp, source }.into());
        }

        if let Err(source) = fs::rename(&tmp, dest).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(CacheIoError::Write {
                path: dest.to_path_buf(),
                source,
            }
            .into());
        }

        Ok(())
    }

    /// 删除缓存键对应的图片和元数据（调用方需持有锁）
    async fn remove_key(&self, key: &str) -> Result<(), CacheError> {
        remove_if_exists(&self.paths.artifact_path(key)).await?;
        remove_if_exists(&self.paths.meta_path(key)).await?;
        debug!("删除缓存条目: {}", key);
        Ok(())
    }

    /// 扫描缓存目录，返回（有效条目, 孤立的缓存键）
    async fn scan(&self) -> Result<(Vec<CacheEntry>, Vec<String>), CacheError> {
        // key -> (有图片, 有元数据)
        let mut seen: HashMap<String, (bool, bool)> = HashMap::new();
        for path in self.list_files().await? {
            if let Some(key) = CachePath::key_from_path(&path) {
                let slot = seen.entry(key).or_default();
                if is_artifact(&path) {
                    slot.0 = true;
                } else {
                    slot.1 = true;
                }
            }
        }

        let mut entries = Vec::new();
        let mut orphans = Vec::new();
        for (key, (has_artifact, has_meta)) in seen {
            if !(has_artifact && has_meta) {
                orphans.push(key);
                continue;
            }
            match self.read_entry(&key).await? {
                Some(entry) => entries.push(entry),
                None => orphans.push(key),
            }
        }

        Ok((entries, orphans))
    }

    async fn list_files(&self) -> Result<Vec<PathBuf>, CacheError> {
        let root = self.root().to_path_buf();
        let mut dir = fs::read_dir(&root)
            .await
            .map_err(|source| CacheIoError::Read {
                path: root.clone(),
                source,
            })?;

        let mut files = Vec::new();
        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    let file_type = entry.file_type().await.map_err(|source| {
                        CacheIoError::Read {
                            path: entry.path(),
                            source,
                        }
                    })?;
                    if file_type.is_file() {
                        files.push(entry.path());
                    }
                }
                Ok(None) => break,
                Err(source) => {
                    return Err(CacheIoError::Read {
                        path: root.clone(),
                        source,
                    }
                    .into())
                }
            }
        }

        Ok(files)
    }
}

fn checksum(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}

fn is_artifact(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("webp")
}

/// 删除文件，文件不存在不算错误
///
/// # 返回
/// - `Ok(true)`: 已删除
/// - `Ok(false)`: 文件本来就不存在
async fn remove_if_exists(path: &Path) -> Result<bool, CacheError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(source) => Err(CacheIoError::Remove {
            path: path.to_path_buf(),
            source,
        }
        .into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn cover(source_id: &str, width: u32, height: u32) -> CoverImage {
        CoverImage::from_rgba(
            source_id,
            RgbaImage::from_pixel(width, height, Rgba([40, 80, 120, 255])),
        )
        .unwrap()
    }

    async fn count_with_ext(root: &Path, ext: &str) -> usize {
        let mut count = 0;
        let mut dir = fs::read_dir(root).await.unwrap();
        while let Some(entry) = dir.next_entry().await.unwrap() {
            if entry.path().extension().and_then(|e| e.to_str()) == Some(ext) {
                count += 1;
            }
        }
        count
    }

    /// 把某个条目的创建时间改到过去
    async fn backdate(store: &CacheStore, source_id: &str, days: i64) {
        let key = CachePath::cache_key(source_id);
        let meta_path = store.paths.meta_path(&key);
        let mut entry: CacheEntry =
            serde_json::from_slice(&fs::read(&meta_path).await.unwrap()).unwrap();
        entry.created_at = Utc::now() - chrono::Duration::days(days);
        fs::write(&meta_path, serde_json::to_vec(&entry).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        let entry = store.put("covers/a.png", &cover("covers/a.png", 6, 9)).await.unwrap();
        assert_eq!((entry.width, entry.height), (6, 9));
        assert_eq!(entry.source_id, "covers/a.png");
        assert!(entry.path.exists());

        let cached = store.get("covers/a.png").await.unwrap().unwrap();
        assert_eq!((cached.width(), cached.height()), (6, 9));
        assert_eq!(cached.pixels().get_pixel(3, 3), &Rgba([40, 80, 120, 255]));

        let meta = store.entry("covers/a.png").await.unwrap().unwrap();
        assert_eq!(meta, entry);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        assert!(store.get("nothing.png").await.unwrap().is_none());
        assert!(store.entry("nothing.png").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_twice_keeps_single_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();
        let image = cover("a.png", 4, 4);

        let first = store.put("a.png", &image).await.unwrap();
        let second = store.put("a.png", &image).await.unwrap();

        // 第二次写入直接复用已有条目
        assert_eq!(first.created_at, second.created_at);
        assert_eq!(count_with_ext(temp_dir.path(), "webp").await, 1);
        assert_eq!(count_with_ext(temp_dir.path(), "json").await, 1);
        assert_eq!(count_with_ext(temp_dir.path(), "tmp").await, 0);
    }

    #[tokio::test]
    async fn test_corrupted_artifact_is_miss_and_heals() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();
        let image = cover("a.png", 5, 7);

        let entry = store.put("a.png", &image).await.unwrap();
        fs::write(&entry.path, b"not a webp").await.unwrap();

        assert!(store.get("a.png").await.unwrap().is_none());

        // 校验和不一致，重新写入
        store.put("a.png", &image).await.unwrap();
        let healed = store.get("a.png").await.unwrap().unwrap();
        assert_eq!((healed.width(), healed.height()), (5, 7));
    }

    #[tokio::test]
    async fn test_put_with_wrong_guard() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        let guard = store.lock("a.png").await;
        let result = store.put_locked(&guard, "b.png", &cover("b.png", 2, 2)).await;
        assert!(matches!(result, Err(CacheError::KeyMismatch(_))));
    }

    #[tokio::test]
    async fn test_clear() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        store.put("a.png", &cover("a.png", 2, 3)).await.unwrap();
        store.put("b.png", &cover("b.png", 2, 3)).await.unwrap();
        // 不属于缓存的文件不受影响
        fs::write(temp_dir.path().join("notes.txt"), b"keep").await.unwrap();

        assert_eq!(store.clear().await.unwrap(), 2);
        assert!(store.get("a.png").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap(), CacheStats::default());
        assert!(temp_dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn test_stats() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        let a = store.put("a.png", &cover("a.png", 3, 3)).await.unwrap();
        let b = store.put("b.png", &cover("b.png", 8, 12)).await.unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.entries, 2);
        assert!(stats.total_size > a.size_bytes + b.size_bytes);
    }

    #[tokio::test]
    async fn test_sweep_by_age() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        store.put("old.png", &cover("old.png", 2, 2)).await.unwrap();
        store.put("new.png", &cover("new.png", 2, 2)).await.unwrap();
        backdate(&store, "old.png", 40).await;

        let report = store.sweep(&SweepPolicy::new(Some(30), None)).await.unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(report.evicted, 0);

        assert!(store.get("old.png").await.unwrap().is_none());
        assert!(store.get("new.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_by_size_removes_oldest() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        let first = store.put("1.png", &cover("1.png", 4, 4)).await.unwrap();
        let second = store.put("2.png", &cover("2.png", 4, 4)).await.unwrap();
        let third = store.put("3.png", &cover("3.png", 4, 4)).await.unwrap();
        backdate(&store, "1.png", 3).await;
        backdate(&store, "2.png", 2).await;

        // 只够保留最新的一个
        let report = store
            .sweep(&SweepPolicy::new(None, Some(third.size_bytes)))
            .await
            .unwrap();
        assert_eq!(report.evicted, 2);
        assert_eq!(report.remaining_bytes, third.size_bytes);
        assert!(first.size_bytes > 0 && second.size_bytes > 0);

        assert!(store.get("1.png").await.unwrap().is_none());
        assert!(store.get("2.png").await.unwrap().is_none());
        assert!(store.get("3.png").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_sweep_removes_orphans() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        let entry = store.put("a.png", &cover("a.png", 2, 2)).await.unwrap();
        let key = CachePath::cache_key("a.png");
        fs::remove_file(store.paths.meta_path(&key)).await.unwrap();

        let report = store.sweep(&SweepPolicy::default()).await.unwrap();
        assert_eq!(report.orphans, 1);
        assert!(!entry.path.exists());
    }

    #[tokio::test]
    async fn test_subdirectories_are_not_cache_files() {
        let temp_dir = TempDir::new().unwrap();
        let store = CacheStore::open(temp_dir.path()).await.unwrap();

        store.put("a.png", &cover("a.png", 2, 2)).await.unwrap();
        // 目录名和缓存图片同名也不算缓存条目
        let dir = store.paths.artifact_path(&CachePath::cache_key("ghost.png"));
        fs::create_dir(&dir).await.unwrap();

        assert_eq!(store.stats().await.unwrap().entries, 1);
        let report = store.sweep(&SweepPolicy::default()).await.unwrap();
        assert_eq!(report.orphans, 0);
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_open_fails_when_root_is_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("occupied");
        fs::write(&file, b"x").await.unwrap();

        let result = CacheStore::open(file.join("cache")).await;
        assert!(matches!(result, Err(CacheError::CacheIo(CacheIoError::CreateRoot { .. }))));
    }
}
