// 封面加载器 - 带缓存的封面获取与解码
//
// 本模块负责：
// - 单个封面加载：加锁 -> 查缓存 -> 获取（带超时）-> 解码 -> 写缓存
// - 批量加载：有界通道 + 固定数量的工作任务，结果按原始顺序汇总
// - 单个封面失败不影响整批，失败原因逐条上报

use crate::models::{CoverImage, CoverRequest};
use crate::services::cache::{
    CacheStore, DecodeError, FetchError, LoadError, WebPConverter,
};
use crate::services::fetcher::CoverFetcher;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// 加载器参数
#[derive(Debug, Clone, Copy)]
pub struct LoaderConfig {
    /// 同时进行的获取数（工作任务数）
    pub max_concurrent_fetches: usize,

    /// 同时进行的解码数
    pub max_concurrent_decodes: usize,

    /// 单个封面的获取超时
    pub fetch_timeout: Duration,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_concurrent_fetches: 5,
            max_concurrent_decodes: 3,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// 封面来自哪里
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoverOrigin {
    Cached,
    Fetched,
}

#[derive(Debug, Clone)]
pub struct LoadedCover {
    pub image: CoverImage,
    pub origin: CoverOrigin,
}

/// 单个封面的加载失败
#[derive(Debug)]
pub struct LoadFailure {
    /// 在请求列表中的位置
    pub index: usize,
    pub request: CoverRequest,
    pub error: LoadError,
}

/// 批量加载结果
#[derive(Debug, Default)]
pub struct BatchResult {
    /// 加载成功的封面（保持请求顺序）
    pub images: Vec<CoverImage>,

    pub failures: Vec<LoadFailure>,

    /// 其中命中缓存的数量
    pub from_cache: usize,
}

/// 封面加载器
#[derive(Clone)]
pub struct ImageLoader {
    store: CacheStore,
    fetcher: Arc<dyn CoverFetcher>,
    config: LoaderConfig,
    decode_semaphore: Arc<Semaphore>,
}

impl ImageLoader {
    pub fn new(store: CacheStore, fetcher: Arc<dyn CoverFetcher>, config: LoaderConfig) -> Self {
        Self {
            store,
            fetcher,
            decode_semaphore: Arc::new(Semaphore::new(config.max_concurrent_decodes.max(1))),
            config,
        }
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    /// 加载单个封面
    ///
    /// 整个流程持有缓存键的锁：同一个来源标识并发加载时只会获取一次，
    /// 后到的调用方等锁释放后直接命中缓存。
    ///
    /// # 返回
    /// - `Ok(LoadedCover)`: 封面及其来源（缓存/新获取）
    /// - `Err(LoadError::Fetch)`: 获取失败或超时
    /// - `Err(LoadError::Decode)`: 数据不是有效图片
    pub async fn load(&self, request: &CoverRequest) -> Result<LoadedCover, LoadError> {
        let source_id = request.source_id.as_str();
        let guard = self.store.lock(source_id).await;

        match self.store.get(source_id).await {
            Ok(Some(image)) => {
                return Ok(LoadedCover {
                    image,
                    origin: CoverOrigin::Cached,
                })
            }
            Ok(None) => {}
            Err(e) => warn!("读取缓存失败，按未命中处理: {} - {}", source_id, e),
        }

        let data = match timeout(self.config.fetch_timeout, self.fetcher.fetch(request)).await {
            Ok(result) => result?,
            Err(_) => {
                warn!("获取封面超时: {} ({:?})", source_id, self.config.fetch_timeout);
                return Err(FetchError::Timeout.into());
            }
        };

        let pixels = {
            let _permit = self.decode_semaphore.acquire().await.map_err(|e| {
                DecodeError::DecodeFailed(format!("获取解码许可失败: {}", e))
            })?;
            WebPConverter::decode_source_async(data).await?
        };
        let image = CoverImage::from_rgba(source_id, pixels)?;

        // 写缓存失败不影响本次结果
        if let Err(e) = self.store.put_locked(&guard, source_id, &image).await {
            warn!("写入缓存失败: {} - {}", source_id, e);
        }

        debug!(
            "封面加载完成: {} ({}x{})",
            source_id,
            image.width(),
            image.height()
        );

        Ok(LoadedCover {
            image,
            origin: CoverOrigin::Fetched,
        })
    }

    /// 批量加载封面
    ///
    /// 请求通过有界通道分发给 `max_concurrent_fetches` 个工作任务，
    /// 所有请求都有结果后才返回。
    pub async fn load_batch(&self, requests: Vec<CoverRequest>) -> BatchResult {
        let total = requests.len();
        if total == 0 {
            return BatchResult::default();
        }

        let workers = self.config.max_concurrent_fetches.max(1).min(total);
        info!("开始批量加载封面: 共 {} 个, 工作任务 {} 个", total, workers);

        let (job_tx, job_rx) = mpsc::channel::<(usize, CoverRequest)>(workers);
        let job_rx = Arc::new(Mutex::new(job_rx));
        let (result_tx, mut result_rx) =
            mpsc::channel::<(usize, Result<LoadedCover, LoadError>)>(total);

        let mut handles = Vec::with_capacity(workers);
        for _ in 0..workers {
            let loader = self.clone();
            let jobs = Arc::clone(&job_rx);
            let results = result_tx.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some((index, request)) = next else {
                        break;
                    };
                    let result = loader.load(&request).await;
                    if results.send((index, result)).await.is_err() {
                        break;
                    }
                }
            }));
        }
        drop(job_rx);
        drop(result_tx);

        for job in requests.iter().cloned().enumerate() {
            if job_tx.send(job).await.is_err() {
                // 所有工作任务都已退出
                break;
            }
        }
        drop(job_tx);

        let mut slots: Vec<Option<Result<LoadedCover, LoadError>>> =
            (0..total).map(|_| None).collect();
        while let Some((index, result)) = result_rx.recv().await {
            slots[index] = Some(result);
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!("加载任务执行失败: {}", e);
            }
        }

        let mut batch = BatchResult::default();
        for (index, (request, slot)) in requests.into_iter().zip(slots).enumerate() {
            let result = slot.unwrap_or_else(|| {
                Err(LoadError::Aborted(format!(
                    "没有返回结果: {}",
                    request.source_id
                )))
            });

            match result {
                Ok(loaded) => {
                    if loaded.origin == CoverOrigin::Cached {
                        batch.from_cache += 1;
                    }
                    batch.images.push(loaded.image);
                }
                Err(error) => {
                    warn!("封面加载失败: {} - {}", request.source_id, error);
                    batch.failures.push(LoadFailure {
                        index,
                        request,
                        error,
                    });
                }
            }
        }

        info!(
            "批量加载完成: 成功 {} (缓存 {}), 失败 {}",
            batch.images.len(),
            batch.from_cache,
            batch.failures.len()
        );

        batch
    }
}
